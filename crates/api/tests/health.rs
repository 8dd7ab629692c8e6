//! Integration tests for the root-level endpoints and general HTTP behaviour.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{body_json, get, FakePipeline};

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with expected JSON fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let t = common::build_test_app(Arc::new(FakePipeline::default())).await;
    let response = get(t.app.clone(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["db_healthy"], true);
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let t = common::build_test_app(Arc::new(FakePipeline::default())).await;
    let response = get(t.app.clone(), "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let t = common::build_test_app(Arc::new(FakePipeline::default())).await;
    let response = get(t.app.clone(), "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().expect("ascii").len(), 36);
}

// ---------------------------------------------------------------------------
// Test: GET /metrics on a fresh server
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metrics_start_at_zero() {
    let t = common::build_test_app(Arc::new(FakePipeline::default())).await;
    let response = get(t.app.clone(), "/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["jobs"]["processing"], 0);
    assert_eq!(json["cache"]["entries"], 0);
    assert_eq!(json["cache"]["size_bytes"], 0);
    assert_eq!(json["batches"]["queued"], 0);
    assert_eq!(json["batches"]["active"], 0);
    assert_eq!(json["batches"]["max_concurrent"], 2);
    assert_eq!(json["connections"], 0);
}
