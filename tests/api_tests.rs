//! Router integration tests.
//!
//! Exercises the HTTP surface against an unconstructed session: health
//! reporting, the 503 not-ready surface, and resilience to malformed
//! bodies. Readiness paths that need a real model are covered in
//! `session_tests.rs`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use rehydra_infer::{server, InferenceSession};

fn app() -> axum::Router {
    let session = Arc::new(InferenceSession::new(
        "/nonexistent/model.onnx",
        "/nonexistent/trt_cache",
    ));
    server::router(session)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn root_reports_service_info() {
    let response = app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["service"], server::SERVICE_NAME);
    assert_eq!(json["health"], "/health");
}

#[tokio::test]
async fn health_reports_not_ready_before_construction() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "not_ready");
    assert_eq!(json["model_loaded"], false);
    assert_eq!(json["provider"], "");
}

#[tokio::test]
async fn infer_before_ready_returns_service_unavailable() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/infer")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"input_ids":[1,2,3],"attention_mask":[1,1,0]}"#,
        ))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(
        json["detail"],
        "Model not loaded. Service is starting up."
    );
}

#[tokio::test]
async fn malformed_body_is_a_client_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/infer")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"input_ids": "not a list"}"#))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/v2/infer")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
