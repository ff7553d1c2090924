//! HTTP error envelope.
//!
//! Every 4xx/5xx response is `{"detail": "..."}` with an explicit status,
//! matching the error taxonomy: input errors are 4xx, everything the
//! pipeline can absorb never reaches this layer.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use session_store::StoreError;

/// Convenient alias for handler results.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown task / job / domain.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate task, retry on a non-failed job, missing primary document.
    #[error("{0}")]
    BadRequest(String),

    /// A second active flow already exists for the task.
    #[error("{0}")]
    Conflict(String),

    /// Store or engine failure the handler cannot absorb.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::InvalidTransition { .. } => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
