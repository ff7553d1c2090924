//! Error types for skill registration and execution.

use thiserror::Error;

/// Convenient alias for dispatcher-level results.
pub type SkillResult<T> = Result<T, SkillError>;

/// Errors raised while registering or executing skills.
#[derive(Debug, Error)]
pub enum SkillError {
    /// The requested skill id is not in the registry.
    #[error("skill '{0}' is not registered")]
    NotRegistered(String),

    /// Registration payload is inconsistent (e.g. remote skill without a
    /// workflow id or without a configured workflow client).
    #[error("invalid registration for '{skill_id}': {reason}")]
    InvalidRegistration { skill_id: String, reason: String },

    /// The handler input failed to deserialize.
    #[error("invalid input for '{skill_id}': {reason}")]
    InvalidInput { skill_id: String, reason: String },

    /// Handler execution failed.
    #[error("skill '{skill_id}' failed: {reason}")]
    Execution { skill_id: String, reason: String },

    /// Remote workflow transport failure.
    #[error("workflow error: {0}")]
    Workflow(String),

    /// Remote workflow did not finish within the polling budget.
    #[error("workflow run '{0}' timed out while polling")]
    WorkflowTimeout(String),

    /// Serialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<reqwest::Error> for SkillError {
    fn from(e: reqwest::Error) -> Self {
        SkillError::Workflow(e.to_string())
    }
}
