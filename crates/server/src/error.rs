// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use taskcast_core::MessageError;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid task id: {0}")]
    InvalidTaskId(#[from] MessageError),

    #[error("Metrics not initialized")]
    MetricsUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::InvalidTaskId(err) => {
                tracing::warn!(error = %err, "Invalid task id");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Invalid task id", err.to_string()),
                )
            }
            ApiError::MetricsUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("Metrics not initialized"),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
