//! HTTP boundary.
//!
//! | Method | Path       | Description                          |
//! |--------|------------|--------------------------------------|
//! | POST   | `/predict` | Classify `{"text": "..."}`           |
//! | GET    | `/health`  | Liveness and loaded-model summary    |
//!
//! Input validation happens here; the classifier only ever sees non-empty
//! strings. Inference runs on the blocking pool so a slow or panicking
//! prediction never stalls the async runtime.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use stackguard_core::StackGuardError;
use stackguard_model::estimators::EstimatorKind;
use stackguard_model::Classifier;
use tracing::{debug, error, warn};

use crate::shutdown::ShutdownCoordinator;

/// Shared state for every handler.
pub struct AppState {
    pub classifier: Arc<Classifier>,
    pub shutdown: ShutdownCoordinator,
}

impl AppState {
    pub fn new(classifier: Classifier, shutdown: ShutdownCoordinator) -> Self {
        Self {
            classifier: Arc::new(classifier),
            shutdown,
        }
    }
}

/// Build the axum [`Router`] with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PredictResponse {
    prediction: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    vocabulary_size: usize,
    base_estimators: Vec<&'static str>,
}

const MISSING_TEXT: &str = "Invalid input: \"text\" field is missing";
const NON_STRING_TEXT: &str = "Invalid input: \"text\" must be a string";
const EMPTY_TEXT: &str = "Invalid input: \"text\" field is empty";

fn bad_request(message: &str) -> Response {
    let body = ErrorBody {
        error: message.to_string(),
        kind: None,
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn internal_error(err: &StackGuardError) -> Response {
    let body = ErrorBody {
        error: err.to_string(),
        kind: Some(err.kind()),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

fn unexpected_error() -> Response {
    let body = ErrorBody {
        error: "Internal server error".to_string(),
        kind: Some("internal"),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Pull a non-empty `text` string out of a raw request body.
fn extract_text(body: &[u8]) -> Result<String, &'static str> {
    let value: Value = serde_json::from_slice(body).map_err(|_| MISSING_TEXT)?;
    match value.get("text") {
        None | Some(Value::Null) => Err(MISSING_TEXT),
        Some(Value::String(text)) if text.is_empty() => Err(EMPTY_TEXT),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(NON_STRING_TEXT),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /predict`: classify one text.
pub async fn predict_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let text = match extract_text(&body) {
        Ok(text) => text,
        Err(message) => {
            debug!(reason = message, "Rejected prediction request");
            return bad_request(message);
        }
    };

    // The guard moves into the blocking task so abandoned work still counts.
    let guard = state.shutdown.track_task();
    let classifier = Arc::clone(&state.classifier);
    let result = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        classifier.classify(&text)
    })
    .await;

    match result {
        Ok(Ok(verdict)) => {
            if verdict.overridden {
                debug!(raw = %verdict.raw, label = %verdict.label, "Guardrail overrode prediction");
            }
            Json(PredictResponse {
                prediction: verdict.label.as_str(),
            })
            .into_response()
        }
        Ok(Err(err)) => {
            error!(kind = err.kind(), error = %err, "Prediction failed");
            internal_error(&err)
        }
        Err(join_err) => {
            warn!(error = %join_err, "Prediction task aborted");
            unexpected_error()
        }
    }
}

/// `GET /health`: report liveness and the loaded model shape.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let body = HealthResponse {
        status: "healthy",
        vocabulary_size: state.classifier.encoder().dimension(),
        base_estimators: state
            .classifier
            .ensemble()
            .base_order()
            .into_iter()
            .map(EstimatorKind::short_name)
            .collect(),
    };
    Json(body).into_response()
}
