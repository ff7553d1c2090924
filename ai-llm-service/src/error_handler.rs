//! Error types for `ai-llm-service`.
//!
//! One root [`LlmError`] for all client operations, with provider-aware
//! mapping of transport failures (401 → Unauthorized, 429 → RateLimited,
//! 5xx → Server, …) and a focused [`ConfigError`] for environment-driven
//! setup.

use thiserror::Error;

/// Root error for LLM client calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Unauthorized (HTTP 401) — bad or missing API key.
    #[error("llm unauthorized")]
    Unauthorized,

    /// Rate limited (HTTP 429).
    #[error("llm rate limited")]
    RateLimited,

    /// Server-side failure (HTTP 5xx).
    #[error("llm server error: status {0}")]
    Server(u16),

    /// Other unexpected HTTP status.
    #[error("llm http status error: {0}")]
    HttpStatus(u16),

    /// Transport-level timeout.
    #[error("llm request timeout")]
    Timeout,

    /// Network failure without a status (DNS/connect/reset).
    #[error("llm network error: {0}")]
    Network(String),

    /// Provider returned a payload the client cannot interpret.
    #[error("llm invalid response: {0}")]
    InvalidResponse(String),

    /// JSON (de)serialization failure.
    #[error("llm serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration problem surfaced at call time.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Environment/config-driven setup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A numeric variable failed to parse.
    #[error("invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },

    /// Unsupported provider in `LLM_PROVIDER`.
    #[error("unsupported llm provider: {0}")]
    UnsupportedProvider(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return LlmError::Timeout;
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            return match code {
                401 => LlmError::Unauthorized,
                429 => LlmError::RateLimited,
                500..=599 => LlmError::Server(code),
                _ => LlmError::HttpStatus(code),
            };
        }
        LlmError::Network(e.to_string())
    }
}

/// Reads a mandatory environment variable, rejecting empty values.
pub fn must_env(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

/// Reads an optional float environment variable.
pub fn env_opt_f32(var: &'static str) -> Result<Option<f32>, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<f32>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                var,
                reason: "expected f32",
            }),
        _ => Ok(None),
    }
}

/// Reads an optional unsigned environment variable.
pub fn env_opt_u64(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                var,
                reason: "expected u64",
            }),
        _ => Ok(None),
    }
}
