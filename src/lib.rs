//! Stockbook API Library
//!
//! Order placement, stock levels and the product catalog for small
//! businesses, served over HTTP.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod rate_limiter;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use chrono::Utc;
use http::HeaderValue;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{AuthConfig, AuthRouterExt, AuthService};
use crate::rate_limiter::{rate_limit_middleware, RateLimiter};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wires repositories, services, auth and the rate limiter from configuration.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services = handlers::AppServices::new(
            db.clone(),
            event_sender.clone(),
            config.stock_adjustment(),
        );
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));
        let rate_limiter = Arc::new(RateLimiter::from_app_config(&config));

        Self {
            db,
            config,
            event_sender,
            services,
            auth,
            rate_limiter,
        }
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Page number (default: 1)
    #[serde(default = "default_page")]
    pub page: u64,
    /// Items per page (default: 20, max: 100)
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<axum::Json<ApiResponse<T>>, errors::ServiceError>;

/// Authenticated and rate limited `/api/v1` routes.
pub fn api_v1_routes(state: &AppState) -> Router<AppState> {
    let orders = Router::new()
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route("/orders/:id", get(handlers::orders::get_order));

    let stock = Router::new()
        .route("/stock", get(handlers::stock::list_stock))
        .route(
            "/stock/:product_id",
            get(handlers::stock::get_stock).put(handlers::stock::restock),
        );

    let products = Router::new()
        .route(
            "/products",
            post(handlers::products::create_product).get(handlers::products::list_products),
        )
        .route("/products/:id", get(handlers::products::get_product));

    // Auth runs before the limiter so authenticated callers are keyed by subject
    Router::new()
        .merge(orders)
        .merge(stock)
        .merge(products)
        .layer(axum::middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .with_auth()
        .layer(Extension(state.auth.clone()))
}

/// CORS policy from configuration: explicit origins first, then the
/// permissive fallback for development or an explicit opt-in.
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

/// Full application router: health checks, the v1 API and Swagger UI,
/// wrapped in request id, error disclosure, tracing, CORS and compression.
pub fn build_router(state: AppState) -> Router {
    let disclosure = state.config.error_disclosure();
    let cors = cors_layer(&state.config);

    Router::new()
        .merge(health::health_routes())
        .nest("/api/v1", api_v1_routes(&state))
        .merge(openapi::swagger_ui())
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(cors)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn_with_state(
            disclosure,
            middleware_helpers::error_disclosure_middleware,
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}
