//! Error types for the persistence layer.

use thiserror::Error;

/// Convenient alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the session and upload-job stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Illegal lifecycle transition (e.g. retrying a non-failed job).
    #[error("invalid transition for {kind} '{id}': {reason}")]
    InvalidTransition {
        kind: &'static str,
        id: String,
        reason: String,
    },

    /// PostgREST transport failure.
    #[error("store http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
