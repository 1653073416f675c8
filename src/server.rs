//! HTTP surface for the inference session.
//!
//! Thin plumbing around [`InferenceSession`]: request/response schema,
//! routing, CORS, and the mapping from session errors to response statuses.
//! Inference runs on the blocking thread pool so a slow model call never
//! starves the async executor.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::{Error, InferenceSession};

/// Service name reported by the root endpoint.
pub const SERVICE_NAME: &str = "Rehydra NER Inference";

/// Request payload for `POST /v1/infer`. Input is pre-tokenized upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferRequest {
    /// Token IDs.
    pub input_ids: Vec<i64>,
    /// Attention mask (1 for real tokens, 0 for padding); same length as
    /// `input_ids`.
    pub attention_mask: Vec<i64>,
}

/// Response payload from `POST /v1/infer`: raw logits for downstream
/// decoding, batch dimension already stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferResponse {
    /// Logits, one row of `num_labels` scores per input token.
    pub logits: Vec<Vec<f32>>,
    /// Logits shape: `[seq_len, num_labels]`.
    pub shape: Vec<usize>,
}

/// Response payload from `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"healthy"` once the session is ready, `"not_ready"` before.
    pub status: String,
    /// Whether the model finished loading and warm-up.
    pub model_loaded: bool,
    /// Active execution backend, empty until construction completes.
    pub provider: String,
}

/// Error envelope returned to clients.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotReady => ApiError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                detail: err.to_string(),
            },
            Error::Inference(_) => ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: err.to_string(),
            },
            other => ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: format!("Inference failed: {other}"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "detail": self.detail }));
        (self.status, body).into_response()
    }
}

/// Build the service router around a shared session.
///
/// CORS is permissive so browser-side SDKs can call the service directly.
pub fn router(session: Arc<InferenceSession>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/infer", post(infer))
        .layer(CorsLayer::permissive())
        .with_state(session)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
        "infer": "/v1/infer",
    }))
}

async fn health(State(session): State<Arc<InferenceSession>>) -> Json<HealthResponse> {
    let ready = session.is_ready();
    Json(HealthResponse {
        status: if ready { "healthy" } else { "not_ready" }.to_string(),
        model_loaded: ready,
        provider: session
            .active_backend()
            .map(|backend| backend.as_str().to_string())
            .unwrap_or_default(),
    })
}

async fn infer(
    State(session): State<Arc<InferenceSession>>,
    Json(request): Json<InferRequest>,
) -> Result<Json<InferResponse>, ApiError> {
    let result = tokio::task::spawn_blocking(move || {
        session.infer(&request.input_ids, &request.attention_mask)
    })
    .await
    .map_err(|e| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: format!("Inference failed: task join error: {e}"),
    })?;

    let logits = match result {
        Ok(logits) => logits,
        Err(err) => {
            if !matches!(err, Error::NotReady) {
                log::error!("Inference error: {err}");
            }
            return Err(err.into());
        }
    };

    let shape = vec![logits.nrows(), logits.ncols()];
    let rows = logits.outer_iter().map(|row| row.to_vec()).collect();
    Ok(Json(InferResponse {
        logits: rows,
        shape,
    }))
}
