//! End-to-end tests for the StackGuard HTTP service.
//!
//! Each test builds the router in-process around the deterministic fixture
//! classifier from `stackguard_model::testing` and drives it with
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use stackguard_core::GuardrailConfig;
use stackguard_model::{testing, Classifier};
use stackguard_server::{build_router, serve_until_shutdown, AppState, ShutdownCoordinator};
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn app_with(classifier: Classifier) -> Router {
    let state = Arc::new(AppState::new(classifier, ShutdownCoordinator::new(5)));
    build_router(state)
}

fn fixture_app() -> Router {
    app_with(testing::fixture_classifier())
}

fn predict_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn predict_text(app: Router, text: &str) -> (StatusCode, Value) {
    let body = serde_json::to_vec(&json!({ "text": text })).unwrap();
    send(app, predict_request(body)).await
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_predict_xss() {
    let (status, json) = predict_text(fixture_app(), "<script>alert(1)</script>").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"prediction": "XSS (malicious)"}));
}

#[tokio::test]
async fn test_predict_sqli_with_signature() {
    let (status, json) = predict_text(fixture_app(), "' OR 1=1 --").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prediction"], "SQLi (malicious)");
}

#[tokio::test]
async fn test_predict_benign() {
    let (status, json) = predict_text(fixture_app(), "hello world").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prediction"], "Benign (normal)");
}

#[tokio::test]
async fn test_guardrail_downgrades_sqli_without_signature() {
    // The ensemble sees "select" and votes SQLi; no SQL signature is present.
    let (status, json) = predict_text(fixture_app(), "select your favourite colour").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prediction"], "Benign (normal)");
}

#[tokio::test]
async fn test_raw_sqli_on_script_tag_is_returned_as_benign() {
    let app = app_with(testing::always_sqli_classifier());
    let (_, json) = predict_text(app.clone(), "<script>alert(1)</script>").await;
    assert_eq!(json["prediction"], "Benign (normal)");

    let (_, json) = predict_text(app, "' OR 1=1 --").await;
    assert_eq!(json["prediction"], "SQLi (malicious)");
}

#[tokio::test]
async fn test_predictions_are_deterministic() {
    let app = fixture_app();
    let mut seen = Vec::new();
    for _ in 0..3 {
        let (_, json) = predict_text(app.clone(), "<img src=x onerror=alert(document.cookie)>").await;
        seen.push(json["prediction"].clone());
    }
    assert!(seen.iter().all(|p| *p == seen[0]));
}

#[tokio::test]
async fn test_unicode_text_is_accepted() {
    let (status, json) = predict_text(fixture_app(), "héllo wörld ✓").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prediction"], "Benign (normal)");
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_body() {
    let (status, json) = send(fixture_app(), predict_request(Body::empty())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "Invalid input: \"text\" field is missing"}));
}

#[tokio::test]
async fn test_invalid_json() {
    let (status, json) = send(fixture_app(), predict_request("{\"text\": ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid input: \"text\" field is missing");
}

#[tokio::test]
async fn test_missing_text_field() {
    let (status, json) = send(fixture_app(), predict_request(r#"{"input": "x"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid input: \"text\" field is missing");
}

#[tokio::test]
async fn test_non_string_text() {
    let (status, json) = send(fixture_app(), predict_request(r#"{"text": 123}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid input: \"text\" must be a string");
}

#[tokio::test]
async fn test_empty_text() {
    let (status, json) = send(fixture_app(), predict_request(r#"{"text": ""}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid input: \"text\" field is empty");
}

#[tokio::test]
async fn test_get_predict_not_allowed() {
    let req = Request::builder()
        .uri("/predict")
        .body(Body::empty())
        .unwrap();
    let response = fixture_app().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ---------------------------------------------------------------------------
// Health and startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_endpoint() {
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(fixture_app(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["vocabulary_size"], 42);
    assert_eq!(json["base_estimators"], json!(["lr", "nn", "rf", "et", "gb"]));
}

#[tokio::test]
async fn test_service_from_artifacts_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let model = testing::write_fixture_artifacts(dir.path()).unwrap();
    let classifier = Classifier::load(&model, &GuardrailConfig::default()).unwrap();

    let (status, json) = predict_text(app_with(classifier), "1; drop table users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prediction"], "SQLi (malicious)");
}

#[tokio::test]
async fn test_startup_fails_on_corrupt_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let model = testing::write_fixture_artifacts(dir.path()).unwrap();
    std::fs::write(&model.ensemble_path, "{\"format_version\": 1}").unwrap();

    let err = Classifier::load(&model, &GuardrailConfig::default()).unwrap_err();
    assert_eq!(err.kind(), "artifact_load");
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

async fn spawn_server(
    shutdown: &ShutdownCoordinator,
) -> (std::net::SocketAddr, tokio::task::JoinHandle<std::io::Result<()>>) {
    let state = Arc::new(AppState::new(
        testing::fixture_classifier(),
        shutdown.clone(),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_until_shutdown(
        listener,
        build_router(state),
        shutdown.clone(),
    ));
    (addr, server)
}

#[tokio::test]
async fn test_graceful_shutdown_stops_server() {
    let shutdown = ShutdownCoordinator::new(5);
    let (_, server) = spawn_server(&shutdown).await;

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), server).await;
    assert!(result.is_ok(), "server did not stop after shutdown was triggered");
    assert!(result.unwrap().unwrap().is_ok());
    assert_eq!(shutdown.in_flight_count(), 0);
}

#[tokio::test]
async fn test_shutdown_drain_is_bounded_by_timeout() {
    let shutdown = ShutdownCoordinator::new(1);
    let (addr, server) = spawn_server(&shutdown).await;

    // A client that sends headers and half a body, then stalls.
    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    client
        .write_all(
            b"POST /predict HTTP/1.1\r\nhost: localhost\r\n\
              content-type: application/json\r\ncontent-length: 100\r\n\r\n{\"text\": ",
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), server).await;
    assert!(result.is_ok(), "drain was not bounded by the shutdown timeout");
    assert!(result.unwrap().unwrap().is_ok());
    assert!(started.elapsed() >= Duration::from_millis(900));
    drop(client);
}
