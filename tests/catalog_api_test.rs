mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn product_with_initial_stock_creates_stock_row() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "name": "  Teapot ",
                "description": "Cast iron",
                "unitPriceExclTax": 25.5,
                "unitPriceInclTax": 30.6,
                "initialStock": 12
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let data = &body["data"];
    assert_eq!(data["name"], "Teapot");
    assert_eq!(data["stockQuantity"], 12);
    assert_eq!(data["unitPriceExclTax"].as_f64(), Some(25.5));

    let id = data["id"].as_i64().unwrap();
    assert_eq!(app.stock_quantity(id).await, Some(12));

    let (status, fetched) = app
        .json(Method::GET, &format!("/api/v1/products/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["description"], "Cast iron");
    assert!(fetched["data"].get("stockQuantity").is_none());
}

#[tokio::test]
async fn invalid_product_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "name": "",
                "unitPriceExclTax": -1.0,
                "unitPriceInclTax": 1.0,
                "initialStock": -3
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(body["details"].as_array().unwrap().len(), 3);

    let (_, listed) = app.json(Method::GET, "/api/v1/products", None).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let app = TestApp::new().await;

    let (status, _) = app.json(Method::GET, "/api/v1/products/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn restock_sets_absolute_quantity_and_date() {
    let app = TestApp::new().await;
    let product = app.create_product("Bowl", Some(3)).await;

    let (status, body) = app
        .json(
            Method::PUT,
            &format!("/api/v1/stock/{product}"),
            Some(json!({ "quantity": 40 })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["quantity"], 40);
    assert!(body["data"]["lastStockedDate"].is_string());
    assert_eq!(app.stock_quantity(product).await, Some(40));
}

#[tokio::test]
async fn restock_creates_missing_row() {
    let app = TestApp::new().await;
    let product = app.create_product("Spoon", None).await;
    assert_eq!(app.stock_quantity(product).await, None);

    let (status, _) = app
        .json(
            Method::PUT,
            &format!("/api/v1/stock/{product}"),
            Some(json!({ "quantity": 7 })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stock_quantity(product).await, Some(7));

    let (_, listed) = app.json(Method::GET, "/api/v1/stock", None).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn negative_restock_is_rejected() {
    let app = TestApp::new().await;
    let product = app.create_product("Fork", Some(2)).await;

    let (status, body) = app
        .json(
            Method::PUT,
            &format!("/api/v1/stock/{product}"),
            Some(json!({ "quantity": -1 })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Stock validation failed");
    assert_eq!(app.stock_quantity(product).await, Some(2));
}

#[tokio::test]
async fn health_and_status_do_not_require_auth() {
    let app = TestApp::new().await;

    let health = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert!(health.headers().contains_key("x-request-id"));

    let (status, body) = common::read_json(app.request(Method::GET, "/status", None, None).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["environment"], "development");
    assert_eq!(body["data"]["stock_adjustment_mode"], "inline");
}

#[tokio::test]
async fn inbound_request_id_is_echoed() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/health", None, None)
        .await;
    let generated = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(!generated.is_empty());

    let router_response = {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;
        stockbook_api::build_router(app.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "client-supplied-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    };
    assert_eq!(router_response.headers()["x-request-id"], "client-supplied-42");
}
