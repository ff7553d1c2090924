//! Scripted chat backend: a deterministic stand-in for tests and offline
//! demos.
//!
//! Pops pre-queued outcomes in order, optionally sleeping before each reply
//! to emulate latency. Counts calls so tests can assert how many rounds a
//! component actually issued.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error_handler::LlmError;
use crate::types::{ChatMessage, ChatOutcome, ToolDefinition};

#[derive(Debug, Default)]
pub struct ScriptedService {
    responses: Mutex<VecDeque<ChatOutcome>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedService {
    pub fn new(responses: Vec<ChatOutcome>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Plain-text responses, no tool calls.
    pub fn texts(responses: &[&str]) -> Self {
        Self::new(
            responses
                .iter()
                .map(|text| ChatOutcome {
                    content: text.to_string(),
                    tool_calls: Vec::new(),
                })
                .collect(),
        )
    }

    /// Sleeps this long before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many chat rounds were issued against this service.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
        _temperature: Option<f32>,
    ) -> Result<ChatOutcome, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().expect("script mutex poisoned").pop_front();
        next.ok_or_else(|| LlmError::InvalidResponse("scripted responses exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_responses_in_order_and_counts_calls() {
        let service = ScriptedService::texts(&["first", "second"]);
        assert_eq!(service.chat(&[], &[], None).await.unwrap().content, "first");
        assert_eq!(service.chat(&[], &[], None).await.unwrap().content, "second");
        assert!(service.chat(&[], &[], None).await.is_err());
        assert_eq!(service.call_count(), 3);
    }
}
