//! Shared LLM service for the contract review pipeline.
//!
//! Provides a thin, enum-dispatched client over two chat backends:
//!
//! - **OpenAI-compatible** endpoints (`/chat/completions`) — used for
//!   DeepSeek-style hosted models,
//! - **Ollama** (`/api/chat`) — used for local models.
//!
//! Both support plain `chat` and `chat_with_tools` (function calling). The
//! crate avoids `async-trait` and heap trait objects; dispatch is a plain
//! enum match, and configuration comes strictly from environment variables.

pub mod client;
pub mod config;
pub mod error_handler;
pub mod json_utils;
pub mod services;
pub mod types;

pub use client::LlmClient;
pub use config::{LlmConfig, LlmProvider};
pub use error_handler::{ConfigError, LlmError};
pub use services::scripted::ScriptedService;
pub use types::{ChatMessage, ChatOutcome, ToolCall, ToolDefinition, ToolFunction};
