use crate::{
    entities::{
        order::Model as OrderModel,
        order_detail::{self, Model as OrderDetailModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{NewOrder, NewOrderDetail, OrderStore},
    services::stock::{StockAdjuster, StockLine},
    tracing::timed,
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Maximum number of line items accepted in one order
pub const MAX_LINE_ITEMS: usize = 100;
/// Maximum quantity on a single line
pub const MAX_LINE_QUANTITY: i32 = 10_000;
/// Maximum unit price, inclusive
pub const MAX_UNIT_PRICE: Decimal = dec!(10000000);

const VALIDATION_SUMMARY: &str = "Order validation failed";

fn validate_product_id(value: i64) -> Result<(), ValidationError> {
    if value >= 1 {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("must be a positive integer".into());
        Err(err)
    }
}

pub(crate) fn validate_unit_price(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO && *value <= MAX_UNIT_PRICE {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("must be between 0 and 10000000".into());
        Err(err)
    }
}

/// One cart line as submitted by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineItem {
    #[validate(custom = "validate_product_id")]
    #[schema(example = 1)]
    pub product_id: i64,
    #[validate(range(min = 1, max = 10000, message = "must be between 1 and 10000"))]
    #[schema(example = 2)]
    pub quantity: i32,
    #[validate(custom = "validate_unit_price")]
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 100.0)]
    pub unit_price_excl_tax: Decimal,
    #[validate(custom = "validate_unit_price")]
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 110.0)]
    pub unit_price_incl_tax: Decimal,
}

impl OrderLineItem {
    fn stock_line(&self) -> StockLine {
        StockLine {
            product_id: self.product_id,
            quantity: self.quantity,
        }
    }

    fn detail_for(&self, order_id: i64) -> NewOrderDetail {
        NewOrderDetail {
            order_id,
            product_id: self.product_id,
            quantity: self.quantity,
            unit_price_excl_tax: self.unit_price_excl_tax,
            unit_price_incl_tax: self.unit_price_incl_tax,
            subtotal_excl_tax: order_detail::subtotal(self.quantity, self.unit_price_excl_tax),
            subtotal_incl_tax: order_detail::subtotal(self.quantity, self.unit_price_incl_tax),
        }
    }
}

// Client-facing names, in the order messages are reported
const LINE_FIELDS: [(&str, &str); 4] = [
    ("product_id", "productId"),
    ("quantity", "quantity"),
    ("unit_price_excl_tax", "unitPriceExclTax"),
    ("unit_price_incl_tax", "unitPriceInclTax"),
];

/// Checks list bounds and every line, reporting all problems at once.
pub fn validate_line_items(items: &[OrderLineItem]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::validation(
            VALIDATION_SUMMARY,
            vec!["items must contain at least one line item".to_string()],
        ));
    }
    if items.len() > MAX_LINE_ITEMS {
        return Err(ServiceError::validation(
            VALIDATION_SUMMARY,
            vec![format!(
                "items must not contain more than {} line items (got {})",
                MAX_LINE_ITEMS,
                items.len()
            )],
        ));
    }

    let mut details = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let Err(errors) = item.validate() else {
            continue;
        };
        let field_errors = errors.field_errors();
        for (field, api_name) in LINE_FIELDS {
            if let Some(errs) = field_errors.get(field) {
                for e in errs.iter() {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "is invalid".to_string());
                    details.push(format!("Line {}: {} {}", index + 1, api_name, message));
                }
            }
        }
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::validation(VALIDATION_SUMMARY, details))
    }
}

/// Aggregates written on the order header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub total_quantity: i32,
    pub total_excl_tax: Decimal,
    pub total_incl_tax: Decimal,
}

impl OrderTotals {
    pub fn compute(items: &[OrderLineItem]) -> Self {
        items.iter().fold(
            OrderTotals {
                total_quantity: 0,
                total_excl_tax: Decimal::ZERO,
                total_incl_tax: Decimal::ZERO,
            },
            |acc, item| OrderTotals {
                total_quantity: acc.total_quantity + item.quantity,
                total_excl_tax: acc.total_excl_tax
                    + order_detail::subtotal(item.quantity, item.unit_price_excl_tax),
                total_incl_tax: acc.total_incl_tax
                    + order_detail::subtotal(item.quantity, item.unit_price_incl_tax),
            },
        )
    }
}

/// Result of a successful placement
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPlacement {
    pub order: OrderModel,
    pub totals: OrderTotals,
    pub line_count: usize,
}

/// How the post-placement stock decrement is run.
#[derive(Clone)]
pub enum StockAdjustmentDispatch {
    /// Awaited within the request once the order is durable.
    Inline(StockAdjuster),
    /// Handed to the background event processor.
    Deferred,
}

/// Places orders and serves order queries.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    stock_dispatch: StockAdjustmentDispatch,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        stock_dispatch: StockAdjustmentDispatch,
        event_sender: EventSender,
    ) -> Self {
        Self {
            orders,
            stock_dispatch,
            event_sender,
        }
    }

    /// Validates the lines, writes the order and its details, then runs the
    /// stock decrement.
    ///
    /// The order and its details are two separate writes. If the details
    /// fail, the order row is deleted again; if that delete also fails the
    /// order is left behind without details and the failure is logged.
    /// Stock adjustment problems never change the result.
    #[instrument(skip(self, items), fields(line_count = items.len()))]
    pub async fn create_order(
        &self,
        items: Vec<OrderLineItem>,
    ) -> Result<OrderPlacement, ServiceError> {
        validate_line_items(&items)?;
        let totals = OrderTotals::compute(&items);

        let order = timed(
            "insert_order",
            self.orders.insert_order(NewOrder {
                item_count: totals.total_quantity,
                total_excl_tax: totals.total_excl_tax,
                total_incl_tax: totals.total_incl_tax,
                order_date: Utc::now(),
            }),
        )
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert order");
            ServiceError::write_failed("create order", e)
        })?;

        let details = items.iter().map(|item| item.detail_for(order.id)).collect();
        let inserted = timed(
            "insert_order_details",
            self.orders.insert_order_details(details),
        )
        .await;
        if let Err(e) = inserted {
            error!(order_id = order.id, error = %e, "Failed to insert order details");
            self.compensate(order.id).await;
            return Err(ServiceError::write_failed("create order", e));
        }

        counter!("orders_created_total", 1);
        info!(
            order_id = order.id,
            total_quantity = totals.total_quantity,
            total_excl_tax = %totals.total_excl_tax,
            total_incl_tax = %totals.total_incl_tax,
            "Order created"
        );

        if let Err(e) = self.event_sender.try_send(Event::OrderCreated {
            order_id: order.id,
            total_quantity: totals.total_quantity,
            line_count: items.len(),
        }) {
            warn!(order_id = order.id, error = %e, "Failed to publish order created event");
        }

        let lines: Vec<StockLine> = items.iter().map(OrderLineItem::stock_line).collect();
        self.dispatch_stock_adjustment(order.id, lines).await;

        Ok(OrderPlacement {
            order,
            totals,
            line_count: items.len(),
        })
    }

    async fn compensate(&self, order_id: i64) {
        counter!("order_compensations_total", 1);
        match self.orders.delete_order(order_id).await {
            Ok(_) => warn!(order_id, "Order deleted after detail insert failure"),
            Err(e) => error!(
                order_id,
                error = %e,
                "Compensating delete failed, order left without details"
            ),
        }
    }

    async fn dispatch_stock_adjustment(&self, order_id: i64, lines: Vec<StockLine>) {
        match &self.stock_dispatch {
            StockAdjustmentDispatch::Inline(adjuster) => {
                adjuster.apply(order_id, &lines).await;
            }
            StockAdjustmentDispatch::Deferred => {
                if let Err(e) = self
                    .event_sender
                    .send_detached(Event::StockAdjustmentRequested { order_id, lines })
                {
                    error!(order_id, error = %e, "Failed to hand off stock adjustment");
                }
            }
        }
    }

    /// Returns an order together with its lines.
    pub async fn get_order(
        &self,
        order_id: i64,
    ) -> Result<(OrderModel, Vec<OrderDetailModel>), ServiceError> {
        let order = self
            .orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let details = self.orders.find_order_details(order_id).await?;
        Ok((order, details))
    }

    /// Lists orders, newest first.
    pub async fn list_orders(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        Ok(self.orders.list_orders(page, limit).await?)
    }
}
