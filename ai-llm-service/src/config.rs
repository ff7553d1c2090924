//! LLM configuration loaded strictly from environment variables.
//!
//! # Environment variables
//!
//! - `LLM_PROVIDER` = `deepseek` (default) | `ollama` | `disabled`
//! - `LLM_API_KEY`  = API key (mandatory for `deepseek`)
//! - `LLM_BASE_URL` = endpoint base (defaults per provider)
//! - `LLM_MODEL`    = model identifier (defaults per provider)
//! - `LLM_TEMPERATURE`, `LLM_TOP_P`, `LLM_MAX_OUTPUT_TOKENS`,
//!   `LLM_REQUEST_TIMEOUT_SECS` = optional tuning knobs
//!
//! `LLM_PROVIDER=disabled` — or a missing key for a keyed provider — yields
//! no client at all; the review graph then runs in deterministic mode.

use crate::error_handler::{ConfigError, env_opt_f32, env_opt_u64, must_env};

/// Supported chat backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI-compatible hosted endpoint (DeepSeek-style).
    OpenAiCompat,
    /// Local Ollama server.
    Ollama,
}

/// Configuration for one chat backend.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// Endpoint base, e.g. `https://api.deepseek.com` or
    /// `http://127.0.0.1:11434`.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u64>,
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Resolves the configuration from the environment.
    ///
    /// Returns `Ok(None)` when the provider is `disabled`, so callers can
    /// treat "no LLM" as a supported mode rather than an error.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let provider_raw = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "deepseek".to_string());
        let provider = match provider_raw.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" | "" => return Ok(None),
            "deepseek" | "openai" | "openai-compat" => LlmProvider::OpenAiCompat,
            "ollama" => LlmProvider::Ollama,
            other => return Err(ConfigError::UnsupportedProvider(other.to_string())),
        };

        let (default_endpoint, default_model) = match provider {
            LlmProvider::OpenAiCompat => ("https://api.deepseek.com", "deepseek-chat"),
            LlmProvider::Ollama => ("http://127.0.0.1:11434", "qwen2.5:14b-instruct"),
        };

        let api_key = match provider {
            LlmProvider::OpenAiCompat => Some(must_env("LLM_API_KEY")?),
            LlmProvider::Ollama => None,
        };

        Ok(Some(Self {
            provider,
            model: std::env::var("LLM_MODEL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default_model.to_string()),
            endpoint: std::env::var("LLM_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default_endpoint.to_string()),
            api_key,
            temperature: env_opt_f32("LLM_TEMPERATURE")?.unwrap_or(0.1),
            top_p: env_opt_f32("LLM_TOP_P")?,
            max_output_tokens: env_opt_u64("LLM_MAX_OUTPUT_TOKENS")?,
            timeout_secs: env_opt_u64("LLM_REQUEST_TIMEOUT_SECS")?.unwrap_or(120),
        }))
    }
}
