//! HTTP layer driven through the router without a socket

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use common::Harness;
use elidune_circulation::{api, config::AppConfig, AppState};

fn app(h: &Harness) -> Router {
    api::router(AppState {
        config: Arc::new(AppConfig::default()),
        services: Arc::new(h.services.clone()),
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(format!("/api/v1{}", uri))
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_check() {
    let h = Harness::new();
    let app = app(&h);

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_loan_round_trip() {
    let h = Harness::new();
    let app = app(&h);
    let patron = Uuid::new_v4();

    let (status, item) = send(&app, "POST", "/items", Some(json!({ "total_copies": 1 }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(item["available_copies"], 1);
    let item_id = item["id"].as_str().unwrap().to_string();

    let (status, loan) = send(
        &app,
        "POST",
        "/loans",
        Some(json!({ "item_id": item_id, "patron_id": patron })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["status"], "ISSUED");
    let loan_id = loan["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        "/loans",
        Some(json!({ "item_id": item_id, "patron_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NO_COPIES_AVAILABLE");

    let (status, receipt) = send(&app, "POST", &format!("/loans/{}/return", loan_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["record"]["status"], "RETURNED");
    assert!(receipt["fulfillment"].is_null());

    let (status, body) = send(
        &app,
        "POST",
        &format!("/loans/{}/return", loan_id),
        Some(json!({ "condition": "GOOD" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "INVALID_TRANSITION");

    let (status, loans) = send(&app, "GET", &format!("/patrons/{}/loans", patron), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loans.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_validation_and_missing_resources() {
    let h = Harness::new();
    let app = app(&h);

    let (status, body) = send(&app, "POST", "/items", Some(json!({ "total_copies": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_VALUE");

    let (status, body) = send(&app, "GET", &format!("/items/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    let (status, _) = send(&app, "GET", &format!("/reservations/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_periods_are_bad_requests() {
    let h = Harness::new();
    let app = app(&h);
    let item = h.services.registry.register_item(1).await.unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/loans",
        Some(json!({
            "item_id": item.id,
            "patron_id": Uuid::new_v4(),
            "loan_period_days": 1_000_000_000i64,
        })),
    )
    .await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_VALUE");

    let (status, _) = send(
        &app,
        "POST",
        "/reservations",
        Some(json!({
            "item_id": item.id,
            "patron_id": Uuid::new_v4(),
            "hold_period_days": i64::MAX,
        })),
    )
    .await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The item is untouched and still lendable
    let (status, _) = send(
        &app,
        "POST",
        "/loans",
        Some(json!({ "item_id": item.id, "patron_id": Uuid::new_v4() })),
    )
    .await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_reservation_flow_and_policy_status() {
    let h = Harness::new();
    let app = app(&h);
    let patron = Uuid::new_v4();
    h.patrons.set_max_loans(patron, 0);

    let item = h.services.registry.register_item(1).await.unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/loans",
        Some(json!({ "item_id": item.id, "patron_id": patron })),
    )
    .await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "LOAN_LIMIT_EXCEEDED");

    let (status, body) = send(
        &app,
        "POST",
        "/reservations",
        Some(json!({ "item_id": item.id, "patron_id": Uuid::new_v4() })),
    )
    .await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "COPIES_AVAILABLE");

    h.services.ledger.issue(item.id, Uuid::new_v4(), 14).await.unwrap();
    h.assert_balanced(item.id).await;
    let waiting = Uuid::new_v4();
    let (status, hold) = send(
        &app,
        "POST",
        "/reservations",
        Some(json!({ "item_id": item.id, "patron_id": waiting })),
    )
    .await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(hold["status"], "ACTIVE");
    assert_eq!(hold["priority"], 1);

    let (status, queue) = send(&app, "GET", &format!("/items/{}/queue", item.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue.as_array().unwrap().len(), 1);

    let (status, availability) = send(
        &app,
        "GET",
        &format!("/items/{}/availability?patron_id={}", item.id, waiting),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability["issue"]["reason"], "NO_COPIES_AVAILABLE");
    assert_eq!(availability["reserve"]["reason"], "DUPLICATE_RESERVATION");

    let hold_id = hold["id"].as_str().unwrap();
    let (status, cancelled) =
        send(&app, "POST", &format!("/reservations/{}/cancel", hold_id), None).await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");

    let (status, report) = send(&app, "POST", "/sweeps", None).await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::OK);
    assert!(report["expired"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_staff_transactions() {
    let h = Harness::new();
    let app = app(&h);
    let item = h.services.registry.register_item(2).await.unwrap();

    let (status, stock) = send(
        &app,
        "POST",
        &format!("/items/{}/transactions", item.id),
        Some(json!({ "kind": "SHELF_DAMAGE" })),
    )
    .await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock["damaged_copies"], 1);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/items/{}/transactions", item.id),
        Some(json!({ "kind": "ISSUE" })),
    )
    .await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_VALUE");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/items/{}/transfers", item.id),
        Some(json!({ "from": "LOST", "to": "AVAILABLE" })),
    )
    .await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "EMPTY_BUCKET");

    let (status, stock) = send(
        &app,
        "PUT",
        &format!("/items/{}/status", item.id),
        Some(json!({ "status": "INACTIVE" })),
    )
    .await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock["status"], "INACTIVE");

    let (status, stock) = send(&app, "POST", &format!("/items/{}/retire", item.id), None).await;
    h.assert_balanced(item.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock["status"], "RETIRED");
}
