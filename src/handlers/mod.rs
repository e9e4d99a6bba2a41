pub mod common;
pub mod orders;
pub mod products;
pub mod stock;

use crate::config::StockAdjustmentMode;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::repositories::{OrderRepository, ProductRepository, StockRepository};
use crate::services::{
    orders::{OrderService, StockAdjustmentDispatch},
    products::ProductService,
    stock::{StockAdjuster, StockService},
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub stock: Arc<StockService>,
    pub products: Arc<ProductService>,
    /// Shared with the background event processor in deferred mode.
    pub stock_adjuster: StockAdjuster,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        stock_mode: StockAdjustmentMode,
    ) -> Self {
        let order_store = Arc::new(OrderRepository::new(db_pool.clone()));
        let stock_store = Arc::new(StockRepository::new(db_pool.clone()));
        let stock_adjuster = StockAdjuster::new(stock_store.clone());

        let dispatch = match stock_mode {
            StockAdjustmentMode::Inline => StockAdjustmentDispatch::Inline(stock_adjuster.clone()),
            StockAdjustmentMode::Deferred => StockAdjustmentDispatch::Deferred,
        };

        Self {
            orders: Arc::new(OrderService::new(order_store, dispatch, event_sender)),
            stock: Arc::new(StockService::new(stock_store)),
            products: Arc::new(ProductService::new(ProductRepository::new(db_pool))),
            stock_adjuster,
        }
    }
}
