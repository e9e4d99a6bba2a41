mod common;

use axum::{
    body::Body,
    http::{Method, StatusCode},
};
use serde_json::{json, Value};
use std::time::Duration;

use common::{line, read_json, TestApp};

#[tokio::test]
async fn create_order_returns_totals_and_line_count() {
    let app = TestApp::new().await;
    let a = app.create_product("Mug", Some(10)).await;
    let b = app.create_product("Plate", Some(10)).await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [line(a, 2, 100.0, 110.0), line(b, 3, 50.0, 55.0)] })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["totalQuantity"], 5);
    assert_eq!(data["totalExclTax"].as_f64(), Some(350.0));
    assert_eq!(data["totalInclTax"].as_f64(), Some(385.0));
    assert_eq!(data["itemCount"], 2);
    assert!(data["orderId"].as_i64().unwrap() > 0);
    assert!(data["createdAt"].is_string());
    assert!(body["meta"]["request_id"].is_string());

    let order_id = data["orderId"].as_i64().unwrap();
    let (status, stored) = app
        .json(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["data"]["order"]["itemCount"], 5);

    let details = stored["data"]["details"].as_array().unwrap();
    assert_eq!(details.len(), 2);
    let subtotals: Vec<(f64, f64)> = details
        .iter()
        .map(|d| {
            (
                d["subtotalExclTax"].as_f64().unwrap(),
                d["subtotalInclTax"].as_f64().unwrap(),
            )
        })
        .collect();
    assert!(subtotals.contains(&(200.0, 220.0)));
    assert!(subtotals.contains(&(150.0, 165.0)));
}

#[tokio::test]
async fn placing_an_order_decrements_stock() {
    let app = TestApp::new().await;
    let product = app.create_product("Kettle", Some(10)).await;

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [line(product, 4, 20.0, 24.0)] })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stock_quantity(product).await, Some(6));
}

#[tokio::test]
async fn product_without_stock_row_is_skipped() {
    let app = TestApp::new().await;
    let tracked = app.create_product("Tracked", Some(5)).await;
    let untracked = app.create_product("Untracked", None).await;

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [line(untracked, 2, 1.0, 1.2), line(tracked, 1, 1.0, 1.2)] })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stock_quantity(untracked).await, None);
    assert_eq!(app.stock_quantity(tracked).await, Some(4));
}

#[tokio::test]
async fn failing_stock_update_does_not_affect_other_lines() {
    let app = TestApp::new().await;
    let a = app.create_product("Locked", Some(10)).await;
    let b = app.create_product("Free", Some(10)).await;
    app.execute_sql(&format!(
        "CREATE TRIGGER lock_stock BEFORE UPDATE ON stock WHEN OLD.product_id = {a} \
         BEGIN SELECT RAISE(ABORT, 'stock row locked'); END;"
    ))
    .await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [line(a, 2, 5.0, 6.0), line(b, 3, 5.0, 6.0)] })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let order_id = body["data"]["orderId"].as_i64().unwrap();
    let (_, stored) = app
        .json(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    assert_eq!(stored["data"]["details"].as_array().unwrap().len(), 2);

    assert_eq!(app.stock_quantity(a).await, Some(10));
    assert_eq!(app.stock_quantity(b).await, Some(7));
}

#[tokio::test]
async fn stock_may_go_negative() {
    let app = TestApp::new().await;
    let product = app.create_product("Scarce", Some(1)).await;

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [line(product, 3, 1.0, 1.0)] })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stock_quantity(product).await, Some(-2));
}

#[tokio::test]
async fn deferred_mode_adjusts_stock_in_the_background() {
    let app = TestApp::with_config(|cfg| cfg.stock_adjustment_mode = "deferred".into()).await;
    let product = app.create_product("Lamp", Some(10)).await;

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [line(product, 4, 1.0, 1.0)] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let mut quantity = None;
    for _ in 0..50 {
        quantity = app.stock_quantity(product).await;
        if quantity == Some(6) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(quantity, Some(6));
}

#[tokio::test]
async fn exactly_one_hundred_lines_are_accepted() {
    let app = TestApp::new().await;
    let items: Vec<Value> = (1..=100).map(|i| line(i, 1, 1.0, 1.0)).collect();

    let (status, body) = app
        .json(Method::POST, "/api/v1/orders", Some(json!({ "items": items })))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["itemCount"], 100);
}

#[tokio::test]
async fn more_than_one_hundred_lines_are_rejected_without_writes() {
    let app = TestApp::new().await;
    let items: Vec<Value> = (1..=101).map(|i| line(i, 1, 1.0, 1.0)).collect();

    let (status, body) = app
        .json(Method::POST, "/api/v1/orders", Some(json!({ "items": items })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Order validation failed");
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn invalid_lines_report_per_line_details() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [line(1, 1, 1.0, 1.0), line(2, 0, -5.0, 1.0)] })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Order validation failed");
    let details: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d.as_str().unwrap())
        .collect();
    assert_eq!(details.len(), 2);
    assert!(details.iter().all(|d| d.starts_with("Line 2: ")));
    assert!(details[0].contains("quantity"));
    assert!(details[1].contains("unitPriceExclTax"));
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn empty_or_missing_items_are_rejected() {
    let app = TestApp::new().await;

    for payload in [json!({ "items": [] }), json!({})] {
        let (status, body) = app
            .json(Method::POST, "/api/v1/orders", Some(payload))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["details"][0],
            "items must contain at least one line item"
        );
    }
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(Body::from("{\"items\": [")),
            Some(app.token()),
        )
        .await;
    let (status, body) = read_json(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid request body");
    assert_eq!(body["details"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn requests_without_a_valid_token_are_unauthorized() {
    let app = TestApp::new().await;
    let payload = Body::from(json!({ "items": [line(1, 1, 1.0, 1.0)] }).to_string());

    let missing = app
        .request(Method::POST, "/api/v1/orders", Some(payload), None)
        .await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let invalid = app
        .request(Method::GET, "/api/v1/orders", None, Some("not-a-token"))
        .await;
    let (status, body) = read_json(invalid).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn detail_failure_removes_the_order() {
    let app = TestApp::new().await;
    app.execute_sql("DROP TABLE order_details").await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [line(1, 1, 1.0, 1.0)] })),
        )
        .await;
    let (status, body) = read_json(response).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn development_errors_include_raw_text_and_debug() {
    let app = TestApp::new().await;
    app.execute_sql("DROP TABLE order_details").await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [line(1, 1, 1.0, 1.0)] })),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Failed to create order: "), "{error}");
    assert!(error.contains("order_details"), "{error}");
    assert!(body["debug"].is_string());
}

#[tokio::test]
async fn production_errors_are_redacted() {
    let app = TestApp::with_config(|cfg| {
        cfg.environment = "production".into();
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
    })
    .await;
    app.execute_sql("DROP TABLE order_details").await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [line(1, 1, 1.0, 1.0)] })),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to create order");
    assert!(body.get("debug").is_none());
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let app = TestApp::with_config(|cfg| cfg.rate_limit_requests_per_window = 2).await;

    for _ in 0..2 {
        let response = app
            .request_authenticated(Method::GET, "/api/v1/orders", None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .request_authenticated(Method::GET, "/api/v1/orders", None)
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
}

#[tokio::test]
async fn orders_are_listed_newest_first() {
    let app = TestApp::new().await;
    let mut ids = Vec::new();
    for quantity in 1..=3 {
        let (_, body) = app
            .json(
                Method::POST,
                "/api/v1/orders",
                Some(json!({ "items": [line(1, quantity, 1.0, 1.0)] })),
            )
            .await;
        ids.push(body["data"]["orderId"].as_i64().unwrap());
    }

    let (status, body) = app
        .json(Method::GET, "/api/v1/orders?page=1&limit=2", None)
        .await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["total"], 3);
    assert_eq!(data["total_pages"], 2);
    let listed: Vec<i64> = data["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_i64().unwrap())
        .collect();
    assert_eq!(listed, vec![ids[2], ids[1]]);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;

    let (status, body) = app.json(Method::GET, "/api/v1/orders/999", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found: Order 999 not found");
}
