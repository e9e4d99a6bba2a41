use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, Query, State},
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::entities::{order, order_detail};
use crate::handlers::common::{json_body, path_id};
use crate::services::orders::{OrderLineItem, OrderPlacement};
use crate::{auth::AuthUser, errors::ServiceError, ApiResponse, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Missing `items` is treated as an empty list and rejected by validation
    #[serde(default)]
    pub items: Vec<OrderLineItem>,
}

/// Returned once the order and its lines are stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedResponse {
    pub order_id: i64,
    pub total_quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 350.0)]
    pub total_excl_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 385.0)]
    pub total_incl_tax: Decimal,
    /// Number of line items submitted
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<OrderPlacement> for OrderCreatedResponse {
    fn from(placement: OrderPlacement) -> Self {
        Self {
            order_id: placement.order.id,
            total_quantity: placement.totals.total_quantity,
            total_excl_tax: placement.totals.total_excl_tax,
            total_incl_tax: placement.totals.total_incl_tax,
            item_count: placement.line_count,
            created_at: placement.order.order_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: i64,
    /// Total ordered quantity across all lines
    pub item_count: i32,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_excl_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_incl_tax: Decimal,
    pub order_date: DateTime<Utc>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            item_count: model.item_count,
            total_excl_tax: model.total_excl_tax,
            total_incl_tax: model.total_incl_tax,
            order_date: model.order_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetailResponse {
    pub id: i64,
    pub product_id: i64,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub unit_price_excl_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub unit_price_incl_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub subtotal_excl_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub subtotal_incl_tax: Decimal,
}

impl From<order_detail::Model> for OrderDetailResponse {
    fn from(model: order_detail::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            quantity: model.quantity,
            unit_price_excl_tax: model.unit_price_excl_tax,
            unit_price_incl_tax: model.unit_price_incl_tax,
            subtotal_excl_tax: model.subtotal_excl_tax,
            subtotal_incl_tax: model.subtotal_incl_tax,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithDetailsResponse {
    pub order: OrderResponse,
    pub details: Vec<OrderDetailResponse>,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    description = "Validate the submitted lines, store the order with its lines and decrement stock for each product",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order created successfully", body = ApiResponse<OrderCreatedResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<OrderCreatedResponse>>, ServiceError> {
    let request = json_body(payload)?;
    let placement = state.services.orders.create_order(request.items).await?;

    info!(
        order_id = placement.order.id,
        user_id = %auth_user.user_id,
        "Order placed"
    );
    Ok(Json(ApiResponse::success(placement.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Get a paginated list of orders, newest first",
    params(ListQuery),
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<PaginatedResponse<OrderResponse>>,
            headers(
                ("X-Request-Id" = String, description = "Unique request id"),
                ("X-RateLimit-Limit" = String, description = "Requests allowed in current window"),
                ("X-RateLimit-Remaining" = String, description = "Remaining requests in window"),
                ("X-RateLimit-Reset" = String, description = "Seconds until reset"),
            )
        ),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let (orders, total) = state.services.orders.list_orders(page, limit).await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        orders.into_iter().map(OrderResponse::from).collect(),
        total,
        page,
        limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    description = "Get an order and its lines by ID",
    params(("id" = i64, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<OrderWithDetailsResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiResponse<OrderWithDetailsResponse>>, ServiceError> {
    let id = path_id(path, "order id")?;
    let (order, details) = state.services.orders.get_order(id).await?;

    Ok(Json(ApiResponse::success(OrderWithDetailsResponse {
        order: order.into(),
        details: details.into_iter().map(OrderDetailResponse::from).collect(),
    })))
}
