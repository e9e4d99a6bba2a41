/*!
 * # Health Check Module
 *
 * Unauthenticated endpoints:
 *
 * - `/health` - database connectivity, 503 when the database is unreachable
 * - `/status` - build and environment information
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::{ApiResponse, AppState};

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct StatusInfo {
    pub service: String,
    pub version: String,
    pub environment: String,
    pub stock_adjustment_mode: String,
    pub timestamp: DateTime<Utc>,
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = ApiResponse<HealthInfo>),
        (status = 503, description = "Database unreachable", body = ApiResponse<HealthInfo>),
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match crate::db::check_connection(&state.db).await {
        Ok(()) => HealthStatus::Up,
        Err(e) => {
            error!(error = %e, "Database health check failed");
            HealthStatus::Down
        }
    };

    let code = if database == HealthStatus::Up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let info = HealthInfo {
        status: database.clone(),
        database,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    };
    (code, Json(ApiResponse::success(info)))
}

#[utoipa::path(
    get,
    path = "/status",
    responses((status = 200, description = "Service status", body = ApiResponse<StatusInfo>)),
    tag = "Health"
)]
pub async fn status(State(state): State<AppState>) -> Json<ApiResponse<StatusInfo>> {
    Json(ApiResponse::success(StatusInfo {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        stock_adjustment_mode: state.config.stock_adjustment_mode.clone(),
        timestamp: Utc::now(),
    }))
}
