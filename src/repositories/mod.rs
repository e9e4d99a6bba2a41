use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;

use crate::entities::{order, order_detail, stock};

pub mod order_repository;
pub mod product_repository;
pub mod stock_repository;

pub use order_repository::OrderRepository;
pub use product_repository::{NewProduct, ProductRepository};
pub use stock_repository::StockRepository;

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Order header values computed before the first write.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub item_count: i32,
    pub total_excl_tax: Decimal,
    pub total_incl_tax: Decimal,
    pub order_date: DateTime<Utc>,
}

/// One line to be written under an existing order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderDetail {
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price_excl_tax: Decimal,
    pub unit_price_incl_tax: Decimal,
    pub subtotal_excl_tax: Decimal,
    pub subtotal_incl_tax: Decimal,
}

/// Store primitives used by order placement and order queries.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: NewOrder) -> Result<order::Model, DbErr>;

    /// Writes every line in one statement; either all rows land or none do.
    async fn insert_order_details(&self, details: Vec<NewOrderDetail>) -> Result<(), DbErr>;

    /// Deletes an order by id and returns the number of rows removed.
    async fn delete_order(&self, order_id: i64) -> Result<u64, DbErr>;

    async fn find_order(&self, order_id: i64) -> Result<Option<order::Model>, DbErr>;

    async fn find_order_details(&self, order_id: i64) -> Result<Vec<order_detail::Model>, DbErr>;

    /// Newest first. `page` is 1-based.
    async fn list_orders(&self, page: u64, limit: u64)
        -> Result<(Vec<order::Model>, u64), DbErr>;
}

/// Store primitives for on-hand quantities.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn find_stock(&self, product_id: i64) -> Result<Option<stock::Model>, DbErr>;

    /// Applies `quantity = quantity - n` in the database and returns the
    /// number of rows touched.
    async fn decrement_stock(&self, product_id: i64, quantity: i32) -> Result<u64, DbErr>;

    /// Sets an absolute quantity, creating the row when it does not exist.
    async fn restock(&self, product_id: i64, quantity: i32) -> Result<stock::Model, DbErr>;

    async fn list_stock(&self) -> Result<Vec<stock::Model>, DbErr>;
}
