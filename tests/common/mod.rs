#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use sea_orm::{ConnectionTrait, DatabaseBackend as DbBackend, Statement};
use serde_json::Value;
use stockbook_api::{config::AppConfig, db, events, AppState};
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str =
    "integration_test_secret_value_that_is_comfortably_longer_than_sixty_four_chars";

/// Application harness backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller adjust the configuration.
    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        // One connection keeps the in-memory database alive and shared
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.rate_limit_requests_per_window = 1_000;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = events::EventSender::channel(cfg.event_channel_capacity);
        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let event_task = tokio::spawn(events::process_events(
            event_rx,
            state.services.stock_adjuster.clone(),
        ));

        let token = state
            .auth
            .issue_token("test-user", Some("test@example.com"))
            .expect("issue test token");

        Self {
            router: stockbook_api::build_router(state.clone()),
            state,
            token,
            _event_task: event_task,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Runs raw SQL against the test database.
    pub async fn execute_sql(&self, sql: &str) {
        self.state
            .db
            .execute(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
            .await
            .expect("execute sql");
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Body>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                body
            }
            None => Body::empty(),
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Authenticated JSON request.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let body = body.map(|json| {
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        });
        self.request(method, uri, body, Some(&self.token)).await
    }

    /// Authenticated request returning status and parsed JSON body.
    pub async fn json(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let response = self.request_authenticated(method, uri, body).await;
        read_json(response).await
    }

    /// Creates a product and returns its id.
    pub async fn create_product(&self, name: &str, initial_stock: Option<i32>) -> i64 {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/v1/products",
                Some(serde_json::json!({
                    "name": name,
                    "unitPriceExclTax": 10.0,
                    "unitPriceInclTax": 12.0,
                    "initialStock": initial_stock,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create product failed: {body}");
        body["data"]["id"].as_i64().expect("product id")
    }

    /// Current stock quantity for a product, `None` when there is no row.
    pub async fn stock_quantity(&self, product_id: i64) -> Option<i64> {
        let (status, body) = self
            .json(Method::GET, &format!("/api/v1/stock/{product_id}"), None)
            .await;
        match status {
            StatusCode::OK => body["data"]["quantity"].as_i64(),
            StatusCode::NOT_FOUND => None,
            other => panic!("unexpected status {other}: {body}"),
        }
    }

    /// Number of stored orders.
    pub async fn order_count(&self) -> u64 {
        let (status, body) = self.json(Method::GET, "/api/v1/orders", None).await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["total"].as_u64().expect("total")
    }
}

pub async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse response body")
    };
    (status, value)
}

pub fn line(product_id: i64, quantity: i32, excl: f64, incl: f64) -> Value {
    serde_json::json!({
        "productId": product_id,
        "quantity": quantity,
        "unitPriceExclTax": excl,
        "unitPriceInclTax": incl,
    })
}
