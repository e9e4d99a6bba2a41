use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::product;
use crate::handlers::common::{json_body, path_id};
use crate::services::products::CreateProductRequest;
use crate::{errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub unit_price_excl_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub unit_price_incl_tax: Decimal,
    /// Quantity on hand, present when the stock row was created with the product
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            unit_price_excl_tax: model.unit_price_excl_tax,
            unit_price_incl_tax: model.unit_price_incl_tax,
            stock_quantity: None,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    summary = "Create product",
    description = "Add a product to the catalog, optionally with its initial stock",
    request_body = CreateProductRequest,
    responses(
        (status = 200, description = "Product created", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let request = json_body(payload)?;
    let (product, stock) = state.services.products.create_product(request).await?;

    let mut response = ProductResponse::from(product);
    response.stock_quantity = stock.map(|row| row.quantity);
    Ok(Json(ApiResponse::success(response)))
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    summary = "List products",
    responses(
        (status = 200, description = "Products", body = ApiResponse<Vec<ProductResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProductResponse>>>, ServiceError> {
    let products = state.services.products.list_products().await?;
    Ok(Json(ApiResponse::success(
        products.into_iter().map(ProductResponse::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    summary = "Get product",
    params(("id" = i64, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<ProductResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let id = path_id(path, "product id")?;
    let product = state.services.products.get_product(id).await?;
    Ok(Json(ApiResponse::success(product.into())))
}
