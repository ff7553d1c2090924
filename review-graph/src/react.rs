//! ReAct loop: iterative tool use for one clause.

use std::collections::BTreeMap;
use std::time::Instant;

use futures::future::join_all;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use ai_llm_service::json_utils::parse_json_array;
use ai_llm_service::{ChatMessage, LlmClient};
use contract_model::DocumentStructure;
use skill_dispatch::{ParsedToolCall, SkillDispatcher, parse_tool_calls};

/// Tool results are truncated to this many characters before they re-enter
/// the transcript.
const MAX_TOOL_RESULT_CHARS: usize = 3000;

/// What the loop produced for the clause.
#[derive(Debug, Default)]
pub struct ReactOutcome {
    /// Risk rows parsed from the final assistant message (raw LLM shape;
    /// normalization happens in the analyze node).
    pub raw_risks: Vec<Map<String, Value>>,
    /// Successful tool outputs keyed by skill id.
    pub skill_context: BTreeMap<String, Value>,
    /// Full transcript including tool-role messages.
    pub messages: Vec<ChatMessage>,
}

fn truncate_result(text: String) -> String {
    let total = text.chars().count();
    if total <= MAX_TOOL_RESULT_CHARS {
        return text;
    }
    let head: String = text.chars().take(MAX_TOOL_RESULT_CHARS).collect();
    format!("{head}\n... (truncated, {total} chars total)")
}

fn serialize_tool_result(data: &Value) -> String {
    match data {
        Value::Null => "{}".to_string(),
        Value::String(s) => truncate_result(s.clone()),
        other => truncate_result(
            serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        ),
    }
}

/// Runs up to `max_iterations` rounds of `chat_with_tools` → execute tools →
/// feed results back. All tool calls of one round run concurrently; a
/// failing call becomes a `{"error": …}` tool message and does not disturb
/// its siblings. Exhausting the budget returns an empty risk list with
/// whatever context was gathered.
#[allow(clippy::too_many_arguments)]
pub async fn react_agent_loop(
    llm: &LlmClient,
    dispatcher: &SkillDispatcher,
    messages: Vec<ChatMessage>,
    clause_id: &str,
    primary_structure: &DocumentStructure,
    state_snapshot: &Value,
    domain_id: Option<&str>,
    max_iterations: u32,
    temperature: f32,
) -> ReactOutcome {
    let tools = dispatcher.tool_definitions(domain_id);
    if tools.is_empty() {
        warn!(clause_id, "no tool definitions available, skipping ReAct loop");
        return ReactOutcome {
            messages,
            ..Default::default()
        };
    }

    let mut current_messages = messages;
    let mut skill_context: BTreeMap<String, Value> = BTreeMap::new();

    for iteration in 1..=max_iterations.max(1) {
        let started = Instant::now();
        let outcome = match llm
            .chat_with_tools(&current_messages, &tools, Some(temperature))
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(clause_id, iteration, %err, "ReAct LLM call failed");
                break;
            }
        };

        if outcome.tool_calls.is_empty() {
            current_messages.push(ChatMessage::assistant(outcome.content.clone()));
            debug!(
                clause_id,
                iteration,
                tools_called = 0,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "ReAct final answer"
            );
            return ReactOutcome {
                raw_risks: parse_json_array(&outcome.content),
                skill_context,
                messages: current_messages,
            };
        }

        let content = if outcome.content.is_empty() {
            None
        } else {
            Some(outcome.content.clone())
        };
        current_messages.push(ChatMessage::assistant_tool_calls(
            content,
            outcome.tool_calls.clone(),
        ));

        let parsed_calls = parse_tool_calls(&outcome.tool_calls);
        let tools_called = parsed_calls.len();
        let executions = parsed_calls.into_iter().map(|call| {
            execute_tool_call(call, dispatcher, clause_id, primary_structure, state_snapshot)
        });
        for (call_id, skill_id, data, content) in join_all(executions).await {
            if let Some(data) = data {
                skill_context.insert(skill_id, data);
            }
            current_messages.push(ChatMessage::tool(call_id, content));
        }

        debug!(
            clause_id,
            iteration,
            tools_called,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ReAct iteration done"
        );
    }

    warn!(
        clause_id,
        max_iterations, "ReAct loop exhausted its iteration budget, forcing end"
    );
    ReactOutcome {
        raw_risks: Vec::new(),
        skill_context,
        messages: current_messages,
    }
}

/// Runs one tool call; returns `(call_id, skill_id, data-on-success,
/// tool-message content)`.
async fn execute_tool_call(
    call: ParsedToolCall,
    dispatcher: &SkillDispatcher,
    clause_id: &str,
    primary_structure: &DocumentStructure,
    state_snapshot: &Value,
) -> (String, String, Option<Value>, String) {
    let target_clause_id = call
        .arguments
        .get("clause_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(clause_id)
        .to_string();

    match dispatcher
        .prepare_and_call(
            &call.skill_id,
            &target_clause_id,
            primary_structure,
            state_snapshot,
            Some(&call.arguments),
        )
        .await
    {
        Ok(result) if result.success => {
            let data = result.data.unwrap_or(Value::Null);
            let content = serialize_tool_result(&data);
            (call.id, call.skill_id, Some(data), content)
        }
        Ok(result) => {
            let content = json!({
                "error": result.error.unwrap_or_else(|| "execution failed".to_string())
            })
            .to_string();
            (call.id, call.skill_id, None, content)
        }
        Err(err) => {
            warn!(skill_id = %call.skill_id, %err, "tool execution raised");
            (
                call.id,
                call.skill_id,
                None,
                json!({"error": err.to_string()}).to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_truncates_long_results() {
        let long = Value::String("x".repeat(5000));
        let rendered = serialize_tool_result(&long);
        assert!(rendered.contains("truncated"));
        assert!(rendered.chars().count() < 3100);
    }

    #[test]
    fn null_result_serializes_as_empty_object() {
        assert_eq!(serialize_tool_result(&Value::Null), "{}");
    }
}
