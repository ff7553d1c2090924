//! Error types for the review graph.

use thiserror::Error;

/// Convenient alias for engine-level results.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors surfaced by the graph engine itself. Node-internal LLM and skill
/// failures are absorbed by the nodes (they degrade deterministically) and
/// never appear here.
#[derive(Debug, Error)]
pub enum GraphError {
    /// `resume` was called without a paused or initialized run.
    #[error("graph for task '{0}' has no run to resume")]
    NothingToResume(String),

    /// Checkpoint persistence failed in a way the engine cannot absorb.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Serialization of graph state failed.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
