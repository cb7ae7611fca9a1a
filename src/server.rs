//! HTTP surface: `POST /image` classification and `GET /health`

use crate::error::ClassifierError;
use crate::labels::LabelSet;
use crate::metrics::ServiceMetrics;
use crate::models::inference::InferenceGateway;
use crate::models::ranking::select_top_k;
use crate::types::{ClassifyForm, RankedPrediction};
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::prelude::{Engine, BASE64_STANDARD};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{debug, error, warn, Level};

/// Shared state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn InferenceGateway>,
    pub labels: Arc<LabelSet>,
    pub metrics: Arc<ServiceMetrics>,
    pub top_k: usize,
    pub request_timeout: Duration,
    /// Bounds inferences that are running or waiting for the session,
    /// including ones whose request already timed out
    pub inference_permits: Arc<Semaphore>,
}

/// Build the service router
pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/image", post(classify_image))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO)))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

async fn classify_image(
    State(state): State<AppState>,
    query: Result<Query<ClassifyForm>, QueryRejection>,
    form: Result<Form<ClassifyForm>, FormRejection>,
) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let start = Instant::now();

    let form = match request_form(query, form) {
        Ok(form) => form,
        Err(e) => return failure(&state, request_id, e),
    };

    match classify(&state, form).await {
        Ok((predictions, top_confidence)) => {
            let latency = start.elapsed();
            state.metrics.record_success(latency, top_confidence);
            debug!(
                request_id = %request_id,
                top = ?predictions.first(),
                latency_us = latency.as_micros(),
                "Image classified"
            );
            match serde_json::to_vec(&predictions) {
                Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
                Err(e) => failure(&state, request_id, ClassifierError::from(e)),
            }
        }
        Err(e) => failure(&state, request_id, e),
    }
}

/// Merge body and query parameters, body first.
///
/// An unusable body (wrong content type, malformed encoding) only fails the
/// request when the query string does not carry `img` either.
fn request_form(
    query: Result<Query<ClassifyForm>, QueryRejection>,
    body: Result<Form<ClassifyForm>, FormRejection>,
) -> Result<ClassifyForm, ClassifierError> {
    let from_query = query
        .ok()
        .and_then(|Query(form)| form.img)
        .filter(|img| !img.is_empty());

    match body {
        Ok(Form(form)) if form.img.as_deref().is_some_and(|img| !img.is_empty()) => Ok(form),
        Ok(_) => Ok(ClassifyForm { img: from_query }),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(ClassifierError::PayloadTooLarge(rejection.body_text()))
        }
        Err(rejection) => match from_query {
            Some(img) => Ok(ClassifyForm { img: Some(img) }),
            None => Err(ClassifierError::InvalidRequest(rejection.body_text())),
        },
    }
}

/// Decode, infer and rank. Returns the ranking and the top-1 probability.
async fn classify(
    state: &AppState,
    form: ClassifyForm,
) -> Result<(Vec<RankedPrediction>, f32), ClassifierError> {
    let encoded = form
        .img
        .filter(|img| !img.is_empty())
        .ok_or_else(|| ClassifierError::InvalidRequest("missing form field `img`".to_string()))?;

    let image_bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| ClassifierError::InvalidRequest(format!("invalid base64 image: {e}")))?;

    // The permit travels with the blocking task, so an abandoned inference
    // keeps its slot until it actually finishes.
    let permit = state.inference_permits.clone().try_acquire_owned().map_err(|_| {
        ClassifierError::Overloaded("too many inferences in flight".to_string())
    })?;

    let gateway = state.gateway.clone();
    let inference = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        gateway.infer(&image_bytes)
    });

    let probabilities = tokio::time::timeout(state.request_timeout, inference)
        .await
        .map_err(|_| {
            ClassifierError::InferenceFailure(format!(
                "timed out after {} ms",
                state.request_timeout.as_millis()
            ))
        })?
        .map_err(|e| ClassifierError::inference(format!("inference task failed: {e}")))??;

    let predictions = select_top_k(&probabilities, &state.labels, state.top_k)?;
    let top_confidence = probabilities
        .iter()
        .copied()
        .filter(|p| !p.is_nan())
        .fold(0.0, f32::max);

    Ok((predictions, top_confidence))
}

fn failure(state: &AppState, request_id: uuid::Uuid, err: ClassifierError) -> Response {
    state.metrics.record_failure(err.kind());
    match err {
        ClassifierError::InvalidRequest(_)
        | ClassifierError::PayloadTooLarge(_)
        | ClassifierError::Overloaded(_) => {
            warn!(request_id = %request_id, error = %err, "Rejected classification request")
        }
        _ => error!(request_id = %request_id, kind = err.kind(), error = %err, "Classification failed"),
    }
    err.into_response()
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "labels": state.labels.len(),
        "model": state.gateway.model_name(),
    }))
}
