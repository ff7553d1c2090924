//! Adapter between the registry and the LLM tool-calling surface.

use serde_json::{Map, Value};
use tracing::warn;

use ai_llm_service::{ToolCall, ToolDefinition};

use crate::schema::{SkillRegistration, SkillStatus};

/// Projects registrations into tool definitions.
///
/// Skips non-active skills; with a domain filter, keeps generic (`*`) skills
/// plus those matching the domain.
pub fn skills_to_tool_definitions(
    skills: &[SkillRegistration],
    domain_filter: Option<&str>,
) -> Vec<ToolDefinition> {
    skills
        .iter()
        .filter(|s| s.status == SkillStatus::Active)
        .filter(|s| match domain_filter {
            Some(domain) => s.domain == "*" || s.domain == domain,
            None => true,
        })
        .map(SkillRegistration::to_tool_definition)
        .collect()
}

/// One tool call with its arguments parsed into an object.
#[derive(Debug, Clone)]
pub struct ParsedToolCall {
    pub id: String,
    pub skill_id: String,
    pub arguments: Map<String, Value>,
}

/// Parses provider tool calls tolerantly: arguments that are not a JSON
/// object (malformed string, array, null) become an empty object.
pub fn parse_tool_calls(tool_calls: &[ToolCall]) -> Vec<ParsedToolCall> {
    tool_calls
        .iter()
        .map(|call| {
            let raw = call.function.arguments.trim();
            let arguments = if raw.is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(raw) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) | Err(_) => {
                        warn!(skill_id = %call.function.name, "tool call arguments are not a JSON object");
                        Map::new()
                    }
                }
            };
            ParsedToolCall {
                id: call.id.clone(),
                skill_id: call.function.name.clone(),
                arguments,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_llm_service::types::ToolCallFunction;

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: ToolCallFunction {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    #[test]
    fn parses_object_arguments() {
        let parsed = parse_tool_calls(&[call("get_clause_context", r#"{"clause_id":"14.2"}"#)]);
        assert_eq!(parsed[0].skill_id, "get_clause_context");
        assert_eq!(parsed[0].arguments["clause_id"], "14.2");
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        let parsed = parse_tool_calls(&[call("x", "{not json"), call("y", "[1,2]"), call("z", "")]);
        for p in parsed {
            assert!(p.arguments.is_empty());
        }
    }
}
