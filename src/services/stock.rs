use crate::{
    entities::stock::Model as StockModel,
    errors::ServiceError,
    repositories::StockStore,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A product and the quantity an order took from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: i64,
    pub quantity: i32,
}

/// What happened to a single line during a stock adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockOutcome {
    Applied,
    /// No stock row exists for the product; nothing was written.
    Skipped,
    Failed(String),
}

impl StockOutcome {
    fn label(&self) -> &'static str {
        match self {
            StockOutcome::Applied => "applied",
            StockOutcome::Skipped => "skipped",
            StockOutcome::Failed(_) => "failed",
        }
    }
}

/// Per-line result of one adjustment run. Never surfaced to API clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockAdjustmentReport {
    pub order_id: i64,
    pub outcomes: Vec<(i64, StockOutcome)>,
}

impl StockAdjustmentReport {
    fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.label() == label)
            .count()
    }

    pub fn applied(&self) -> usize {
        self.count("applied")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }
}

/// Decrements stock for each line of a placed order.
///
/// Lines are processed one at a time. A failing line is logged and counted,
/// and the remaining lines are still processed. Running the same lines twice
/// decrements twice.
#[derive(Clone)]
pub struct StockAdjuster {
    stock: Arc<dyn StockStore>,
}

impl StockAdjuster {
    pub fn new(stock: Arc<dyn StockStore>) -> Self {
        Self { stock }
    }

    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn apply(&self, order_id: i64, lines: &[StockLine]) -> StockAdjustmentReport {
        let mut report = StockAdjustmentReport {
            order_id,
            outcomes: Vec::with_capacity(lines.len()),
        };

        for line in lines {
            let outcome = self.adjust_line(line).await;
            if let StockOutcome::Failed(reason) = &outcome {
                warn!(
                    order_id,
                    product_id = line.product_id,
                    quantity = line.quantity,
                    error = %reason,
                    "Stock adjustment failed for line"
                );
            }
            counter!("stock_adjustments_total", 1, "outcome" => outcome.label());
            report.outcomes.push((line.product_id, outcome));
        }

        info!(
            order_id,
            applied = report.applied(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Stock adjustment finished"
        );
        report
    }

    async fn adjust_line(&self, line: &StockLine) -> StockOutcome {
        match self.stock.find_stock(line.product_id).await {
            Ok(None) => StockOutcome::Skipped,
            Err(e) => StockOutcome::Failed(e.to_string()),
            Ok(Some(_)) => match self
                .stock
                .decrement_stock(line.product_id, line.quantity)
                .await
            {
                // Row removed between the lookup and the update
                Ok(0) => StockOutcome::Skipped,
                Ok(_) => StockOutcome::Applied,
                Err(e) => StockOutcome::Failed(e.to_string()),
            },
        }
    }
}

/// Read and restock operations on stock rows.
#[derive(Clone)]
pub struct StockService {
    stock: Arc<dyn StockStore>,
}

impl StockService {
    pub fn new(stock: Arc<dyn StockStore>) -> Self {
        Self { stock }
    }

    pub async fn get(&self, product_id: i64) -> Result<StockModel, ServiceError> {
        self.stock
            .find_stock(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock for product {} not found", product_id)))
    }

    pub async fn list(&self) -> Result<Vec<StockModel>, ServiceError> {
        Ok(self.stock.list_stock().await?)
    }

    /// Sets the absolute on-hand quantity and stamps the restock date.
    #[instrument(skip(self))]
    pub async fn restock(&self, product_id: i64, quantity: i32) -> Result<StockModel, ServiceError> {
        let mut details = Vec::new();
        if product_id < 1 {
            details.push("productId must be a positive integer".to_string());
        }
        if quantity < 0 {
            details.push("quantity must not be negative".to_string());
        }
        if !details.is_empty() {
            return Err(ServiceError::validation("Stock validation failed", details));
        }

        let row = self
            .stock
            .restock(product_id, quantity)
            .await
            .map_err(|e| ServiceError::write_failed("update stock", e))?;
        info!(product_id, quantity, "Stock restocked");
        Ok(row)
    }
}
