use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockbook API",
        version = "0.1.0",
        description = r#"
# Stockbook API

Inventory and order management for small businesses.

## Features

- **Order Placement**: Validate a cart, store the order with its lines and decrement stock
- **Stock Management**: Inspect and restock on-hand quantities
- **Product Catalog**: Create and browse products

## Authentication

All `/api/v1` endpoints require a JWT bearer token:

```
Authorization: Bearer <your-jwt-token>
```

## Rate Limiting

Requests are limited per user (or per client IP before authentication). Check the response headers:
- `X-RateLimit-Limit`: Maximum requests per window
- `X-RateLimit-Remaining`: Remaining requests in current window
- `X-RateLimit-Reset`: Seconds until the window resets

## Error Handling

Errors share one JSON shape:

```json
{
  "success": false,
  "error": "Order validation failed",
  "details": ["Line 1: quantity must be between 1 and 10000"],
  "request_id": "5f0c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order placement and lookup"),
        (name = "Stock", description = "Stock levels"),
        (name = "Products", description = "Product catalog"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,

        // Stock
        crate::handlers::stock::list_stock,
        crate::handlers::stock::get_stock,
        crate::handlers::stock::restock,

        // Products
        crate::handlers::products::create_product,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,

        // Health
        crate::health::health_check,
        crate::health::status,
    ),
    components(
        schemas(
            crate::ListQuery,

            // Order types
            crate::handlers::orders::CreateOrderRequest,
            crate::handlers::orders::OrderCreatedResponse,
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::OrderDetailResponse,
            crate::handlers::orders::OrderWithDetailsResponse,
            crate::services::orders::OrderLineItem,

            // Stock types
            crate::handlers::stock::StockResponse,
            crate::handlers::stock::RestockRequest,

            // Product types
            crate::handlers::products::ProductResponse,
            crate::services::products::CreateProductRequest,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
