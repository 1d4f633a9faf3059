//! Router tests against the in-memory backend.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use stockroom_testing::InMemoryInventory;
use stockroom_web::{API_KEY_HEADER, ApiKeys, AppState, router};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    inventory: InMemoryInventory,
}

impl TestApp {
    fn new() -> Self {
        Self::with_keys(ApiKeys::default())
    }

    fn with_keys(keys: ApiKeys) -> Self {
        let inventory = InMemoryInventory::new();
        let state = AppState::from_backend(Arc::new(inventory.clone())).with_api_keys(keys);
        Self {
            router: router(state, Duration::from_secs(5)),
            inventory,
        }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn product(&self, sku: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/products",
                Some(json!({ "sku": sku, "name": "Widget", "category": "tools", "price": 4.5 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn stock(&self, product: &str, store: &str, quantity: i64) {
        let (status, _) = self
            .send(
                Method::POST,
                "/stock",
                Some(json!({ "product_id": product, "store_id": store, "initial_quantity": quantity })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn reserve_and_confirm_over_http() {
    let app = TestApp::new();
    let product = app.product("SKU-1").await;
    app.stock(&product, "s1", 100).await;

    let (status, reservation) = app
        .send(
            Method::POST,
            "/reservations",
            Some(json!({
                "product_id": product,
                "store_id": "s1",
                "customer_id": "c-42",
                "quantity": 10,
                "ttl_minutes": 15
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reservation["status"], "PENDING");
    let id = reservation["id"].as_str().unwrap();

    let (_, stock) = app
        .send(Method::GET, &format!("/stock/{product}/s1"), None)
        .await;
    assert_eq!((stock["quantity"].as_i64(), stock["reserved"].as_i64()), (Some(100), Some(10)));

    let (status, confirmed) = app
        .send(Method::POST, &format!("/reservations/{id}/confirm"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "CONFIRMED");

    let (status, again) = app
        .send(Method::POST, &format!("/reservations/{id}/confirm"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["code"], "INVALID_STATE");

    let (_, stats) = app.send(Method::GET, "/reservations/stats", None).await;
    assert_eq!(stats["confirmed"], 1);
    assert_eq!(stats["total"], 1);
}

#[tokio::test]
async fn insufficient_stock_is_409_with_counts() {
    let app = TestApp::new();
    let product = app.product("SKU-1").await;
    app.stock(&product, "s1", 2).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/reservations",
            Some(json!({ "product_id": product, "store_id": "s1", "customer_id": "c", "quantity": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INSUFFICIENT_STOCK");
    assert_eq!(body["details"], json!({ "available": 2, "requested": 3 }));
}

#[tokio::test]
async fn malformed_input_is_400() {
    let app = TestApp::new();
    let product = app.product("SKU-1").await;
    app.stock(&product, "s1", 5).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/reservations",
            Some(json!({ "product_id": product, "store_id": "s1", "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .send(Method::GET, "/stock/not-a-uuid/s1", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/stock/{product}/s1/adjust"),
            Some(json!({ "adjustment": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::POST, "/stock", Some(json!({ "product_id": 7 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ttl_beyond_the_calendar_is_400_and_service_stays_up() {
    let app = TestApp::new();
    let product = app.product("SKU-1").await;
    app.stock(&product, "s1", 5).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/reservations",
            Some(json!({
                "product_id": product,
                "store_id": "s1",
                "customer_id": "c-1",
                "quantity": 1,
                "ttl_minutes": 1_000_000_000_000_i64,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .send(Method::GET, &format!("/stock/{product}/s1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reserved"], 0);
}

#[tokio::test]
async fn unknown_rows_are_404() {
    let app = TestApp::new();
    let product = app.product("SKU-1").await;

    let (status, body) = app
        .send(Method::GET, &format!("/stock/{product}/nowhere"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = app
        .send(
            Method::GET,
            "/reservations/00000000-0000-4000-8000-000000000000",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn transfer_and_listing_endpoints() {
    let app = TestApp::new();
    let product = app.product("SKU-1").await;
    app.stock(&product, "a", 100).await;
    app.stock(&product, "b", 50).await;

    let (status, transfer) = app
        .send(
            Method::POST,
            "/stock/transfer",
            Some(json!({
                "product_id": product,
                "from_store_id": "a",
                "to_store_id": "b",
                "quantity": 20
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transfer["source"]["quantity"], 80);
    assert_eq!(transfer["destination"]["quantity"], 70);

    let (_, rows) = app
        .send(Method::GET, &format!("/stock/product/{product}"), None)
        .await;
    assert_eq!(rows.as_array().unwrap().len(), 2);

    let (_, rows) = app.send(Method::GET, "/stock/store/b", None).await;
    assert_eq!(rows[0]["quantity"], 70);

    let (_, low) = app
        .send(Method::GET, "/stock/low-stock?threshold=75", None)
        .await;
    assert_eq!(low.as_array().unwrap().len(), 1);
    assert_eq!(low[0]["store_id"], "b");

    let (_, check) = app
        .send(
            Method::GET,
            &format!("/stock/{product}/a/availability?quantity=80"),
            None,
        )
        .await;
    assert_eq!(check["available"], true);

    let source_id = transfer["source"]["id"].as_str().unwrap();
    let (_, events) = app
        .send(Method::GET, &format!("/events/aggregate/{source_id}"), None)
        .await;
    let types: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(types, ["stock.created", "stock.transferred"]);

    let (_, pending) = app.send(Method::GET, "/events/pending-count", None).await;
    assert_eq!(pending["pending"], 3);
    let unsynced = app
        .inventory
        .events()
        .unwrap()
        .iter()
        .filter(|e| !e.synced)
        .count();
    assert_eq!(unsynced, 3);
}

#[tokio::test]
async fn product_lifecycle() {
    let app = TestApp::new();
    let id = app.product("SKU-9").await;

    let (status, updated) = app
        .send(
            Method::PUT,
            &format!("/products/{id}"),
            Some(json!({ "price": 7.25 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], 7.25);

    let (status, _) = app.send(Method::POST, "/products", Some(json!({
        "sku": "SKU-9", "name": "Dup", "price": 1.0
    }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, listed) = app
        .send(Method::GET, "/products?category=tools", None)
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, body) = app
        .send(Method::DELETE, &format!("/products/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = app.send(Method::GET, &format!("/products/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_keys_guard_everything_but_health() {
    let app = TestApp::with_keys(ApiKeys::new([("k1".to_string(), "pos".to_string())]));

    let (status, _) = app.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(Method::GET, "/products", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let request = Request::builder()
        .uri("/products")
        .header(API_KEY_HEADER, "k1")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
