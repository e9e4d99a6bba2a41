use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::stock;
use crate::handlers::common::{json_body, path_id};
use crate::{errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockResponse {
    pub id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub last_stocked_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<stock::Model> for StockResponse {
    fn from(model: stock::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            quantity: model.quantity,
            last_stocked_date: model.last_stocked_date,
            updated_at: model.updated_at,
        }
    }
}

/// Sets the on-hand quantity to an absolute value.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestockRequest {
    #[schema(example = 40)]
    pub quantity: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/stock",
    summary = "List stock",
    responses(
        (status = 200, description = "Stock levels", body = ApiResponse<Vec<StockResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Stock"
)]
pub async fn list_stock(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<StockResponse>>>, ServiceError> {
    let rows = state.services.stock.list().await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter().map(StockResponse::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/stock/{product_id}",
    summary = "Get stock for a product",
    params(("product_id" = i64, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Stock level", body = ApiResponse<StockResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No stock row for the product", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Stock"
)]
pub async fn get_stock(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiResponse<StockResponse>>, ServiceError> {
    let product_id = path_id(path, "product id")?;
    let row = state.services.stock.get(product_id).await?;
    Ok(Json(ApiResponse::success(row.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/stock/{product_id}",
    summary = "Restock a product",
    description = "Set the absolute quantity on hand, creating the stock row if needed",
    params(("product_id" = i64, Path, description = "Product ID")),
    request_body = RestockRequest,
    responses(
        (status = 200, description = "Stock updated", body = ApiResponse<StockResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Stock"
)]
pub async fn restock(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<RestockRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<StockResponse>>, ServiceError> {
    let product_id = path_id(path, "product id")?;
    let request = json_body(payload)?;
    let row = state
        .services
        .stock
        .restock(product_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::success(row.into())))
}
