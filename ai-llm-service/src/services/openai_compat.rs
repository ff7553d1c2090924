//! OpenAI-compatible chat backend (`POST {base}/chat/completions`).
//!
//! Covers DeepSeek and other hosted providers that speak the OpenAI chat
//! schema, including function calling.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error_handler::LlmError;
use crate::types::{ChatMessage, ChatOutcome, ToolCall, ToolDefinition};

/// Concrete client for one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatService {
    cfg: LlmConfig,
    http: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

impl OpenAiCompatService {
    pub fn new(cfg: LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self { cfg, http })
    }

    /// One chat round; `tools` may be empty for plain completion.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        temperature: Option<f32>,
    ) -> Result<ChatOutcome, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.cfg.endpoint.trim_end_matches('/')
        );
        let req = ChatRequest {
            model: &self.cfg.model,
            messages,
            temperature: temperature.unwrap_or(self.cfg.temperature),
            stream: false,
            top_p: self.cfg.top_p,
            max_tokens: self.cfg.max_output_tokens,
            tools: if tools.is_empty() { None } else { Some(tools) },
        };

        let mut builder = self.http.post(&url).json(&req);
        if let Some(key) = &self.cfg.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await?.error_for_status()?;
        let body: ChatResponse = resp.json().await?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".to_string()))?;

        let outcome = ChatOutcome {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        };
        debug!(
            model = %self.cfg.model,
            content_len = outcome.content.len(),
            tool_calls = outcome.tool_calls.len(),
            "openai-compat chat round done"
        );
        Ok(outcome)
    }
}
