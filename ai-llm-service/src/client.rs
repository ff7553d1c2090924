//! Enum-dispatched LLM client.

use tracing::debug;

use crate::config::{LlmConfig, LlmProvider};
use crate::error_handler::LlmError;
use std::sync::Arc;

use crate::services::{
    ollama_service::OllamaService, openai_compat::OpenAiCompatService, scripted::ScriptedService,
};
use crate::types::{ChatMessage, ChatOutcome, ToolDefinition};

/// Thin enum client; no `async-trait`, no heap objects.
#[derive(Debug, Clone)]
pub enum LlmClient {
    OpenAiCompat(OpenAiCompatService),
    Ollama(OllamaService),
    /// Deterministic scripted backend for tests and offline demos.
    Scripted(Arc<ScriptedService>),
}

impl LlmClient {
    /// Constructs a client for the given config.
    pub fn from_config(cfg: LlmConfig) -> Result<Self, LlmError> {
        debug!(provider = ?cfg.provider, model = %cfg.model, endpoint = %cfg.endpoint, "building llm client");
        match cfg.provider {
            LlmProvider::OpenAiCompat => Ok(Self::OpenAiCompat(OpenAiCompatService::new(cfg)?)),
            LlmProvider::Ollama => Ok(Self::Ollama(OllamaService::new(cfg)?)),
        }
    }

    /// Constructs a client from the environment; `Ok(None)` when disabled.
    pub fn from_env() -> Result<Option<Self>, LlmError> {
        match LlmConfig::from_env()? {
            Some(cfg) => Ok(Some(Self::from_config(cfg)?)),
            None => Ok(None),
        }
    }

    /// Plain chat completion returning the assistant text.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
    ) -> Result<String, LlmError> {
        let outcome = self.round(messages, &[], temperature).await?;
        Ok(outcome.content)
    }

    /// One tool-augmented round: the model either answers or requests tools.
    pub async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        temperature: Option<f32>,
    ) -> Result<ChatOutcome, LlmError> {
        self.round(messages, tools, temperature).await
    }

    async fn round(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        temperature: Option<f32>,
    ) -> Result<ChatOutcome, LlmError> {
        match self {
            Self::OpenAiCompat(c) => c.chat(messages, tools, temperature).await,
            Self::Ollama(c) => c.chat(messages, tools, temperature).await,
            Self::Scripted(c) => c.chat(messages, tools, temperature).await,
        }
    }
}
