//! Error types for the contract model crate.

use thiserror::Error;

/// Convenient alias for model-level results.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while building or querying document structures.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A clause or chapter pattern in a parser config failed to compile.
    #[error("invalid parser pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Serialization of a model value failed.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
