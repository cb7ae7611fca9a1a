//! Error taxonomy for the classification service

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading resources or serving a classification request.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// A label or model file could not be opened
    #[error("resource unavailable: {}: {source}", .path.display())]
    ResourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the label file stopped before end of input
    #[error("failed to read {}: {source}", .path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model produced a vector that does not line up with the label set
    #[error("probability vector has {probabilities} entries but {labels} labels are loaded")]
    DimensionMismatch { probabilities: usize, labels: usize },

    /// The inference gateway could not produce a probability vector
    #[error("inference failed: {0}")]
    InferenceFailure(String),

    /// The ranked result could not be encoded
    #[error("failed to serialize response: {0}")]
    SerializationFailure(#[from] serde_json::Error),

    /// The request payload was missing or malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request body exceeded the configured limit
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Too many inferences are already queued or running
    #[error("server overloaded: {0}")]
    Overloaded(String),
}

impl ClassifierError {
    /// Short, stable name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifierError::ResourceUnavailable { .. } => "resource_unavailable",
            ClassifierError::ReadFailure { .. } => "read_failure",
            ClassifierError::DimensionMismatch { .. } => "dimension_mismatch",
            ClassifierError::InferenceFailure(_) => "inference_failure",
            ClassifierError::SerializationFailure(_) => "serialization_failure",
            ClassifierError::InvalidRequest(_) => "invalid_request",
            ClassifierError::PayloadTooLarge(_) => "payload_too_large",
            ClassifierError::Overloaded(_) => "overloaded",
        }
    }

    /// HTTP status this error is surfaced with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClassifierError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ClassifierError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ClassifierError::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn inference(err: impl std::fmt::Display) -> Self {
        ClassifierError::InferenceFailure(err.to_string())
    }
}

impl IntoResponse for ClassifierError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let bad = ClassifierError::InvalidRequest("missing img".to_string());
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);

        let mismatch = ClassifierError::DimensionMismatch {
            probabilities: 4,
            labels: 3,
        };
        assert_eq!(mismatch.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(mismatch.kind(), "dimension_mismatch");
        assert_eq!(
            mismatch.to_string(),
            "probability vector has 4 entries but 3 labels are loaded"
        );
    }

    #[test]
    fn test_inference_helper() {
        let err = ClassifierError::inference("bad jpeg");
        assert_eq!(err.kind(), "inference_failure");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_serialization_failure_mapping() {
        let source = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err = ClassifierError::from(source);

        assert!(matches!(err, ClassifierError::SerializationFailure(_)));
        assert_eq!(err.kind(), "serialization_failure");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("failed to serialize response"));
    }

    #[test]
    fn test_load_shedding_statuses() {
        let too_large = ClassifierError::PayloadTooLarge("length limit exceeded".to_string());
        assert_eq!(too_large.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(too_large.kind(), "payload_too_large");

        let busy = ClassifierError::Overloaded("4 inferences pending".to_string());
        assert_eq!(busy.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(busy.kind(), "overloaded");
    }
}
