//! Ollama chat backend (`POST {base}/api/chat`).
//!
//! Ollama returns tool-call arguments as a JSON object and does not assign
//! call ids; this client re-serializes arguments to the common raw-string
//! shape and generates ids so the ReAct loop can address results uniformly.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::error_handler::LlmError;
use crate::types::{ChatMessage, ChatOutcome, ToolCall, ToolCallFunction, ToolDefinition};

/// Concrete client for one Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaService {
    cfg: LlmConfig,
    http: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl OllamaService {
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
        let url = format!("{}/api/chat", self.cfg.endpoint.trim_end_matches('/'));
        let req = ChatRequest {
            model: &self.cfg.model,
            messages,
            stream: false,
            tools: if tools.is_empty() { None } else { Some(tools) },
            options: Options {
                temperature: temperature.unwrap_or(self.cfg.temperature),
            },
        };

        let resp = self.http.post(&url).json(&req).send().await?.error_for_status()?;
        let body: ChatResponse = resp.json().await?;

        let tool_calls = body
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: format!("call_{}", Uuid::new_v4().simple()),
                call_type: "function".to_string(),
                function: ToolCallFunction {
                    name: call.function.name,
                    arguments: call.function.arguments.to_string(),
                },
            })
            .collect::<Vec<_>>();

        debug!(
            model = %self.cfg.model,
            content_len = body.message.content.len(),
            tool_calls = tool_calls.len(),
            "ollama chat round done"
        );
        Ok(ChatOutcome {
            content: body.message.content,
            tool_calls,
        })
    }
}
