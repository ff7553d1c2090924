//! Skill registration schema and tool-definition projection.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use ai_llm_service::ToolDefinition;

use crate::local::SkillHandler;

/// Fields filled in by the orchestrator, never exposed to the LLM.
pub const INTERNAL_FIELDS: [&str; 4] = [
    "document_structure",
    "state_snapshot",
    "criteria_data",
    "criteria_file_path",
];

/// Execution backend of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillBackend {
    Local,
    Remote,
}

/// Lifecycle status; only `active` skills are projected as tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    Active,
    Preview,
    Disabled,
}

impl Default for SkillStatus {
    fn default() -> Self {
        SkillStatus::Active
    }
}

/// One registered skill.
#[derive(Debug, Clone)]
pub struct SkillRegistration {
    pub skill_id: String,
    pub name: String,
    pub description: String,
    pub backend: SkillBackend,
    pub handler: SkillHandler,
    /// `*` for generic skills, otherwise a domain id.
    pub domain: String,
    pub category: String,
    pub status: SkillStatus,
    /// LLM-facing JSON schema: the input schema with internal fields removed.
    pub parameters_schema: Value,
}

impl SkillRegistration {
    /// OpenAI-style tool definition for this skill.
    pub fn to_tool_definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.skill_id.clone(),
            self.description.clone(),
            self.parameters_schema.clone(),
        )
    }
}

/// Unified execution result returned by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillResult {
    pub skill_id: String,
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

/// Removes the internal orchestrator fields from a JSON schema's
/// `properties` and `required` lists. Pure: the input value is not mutated.
pub fn strip_internal_fields(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return json!({"type": "object", "properties": {}, "required": []});
    };
    let mut out = obj.clone();

    if let Some(props) = out.get_mut("properties").and_then(Value::as_object_mut) {
        for field in INTERNAL_FIELDS {
            props.remove(field);
        }
    }
    if let Some(required) = out.get_mut("required").and_then(Value::as_array_mut) {
        required.retain(|v| {
            v.as_str()
                .map(|s| !INTERNAL_FIELDS.contains(&s))
                .unwrap_or(true)
        });
    }
    // Schema metadata is noise in a tool definition.
    out.remove("$schema");
    out.remove("title");
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_internal_properties_and_required() {
        let schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": "ClauseContextInput",
            "type": "object",
            "properties": {
                "clause_id": {"type": "string"},
                "document_structure": {"type": "object"},
                "state_snapshot": {"type": "object"},
            },
            "required": ["clause_id", "document_structure"],
        });
        let projected = strip_internal_fields(&schema);
        let props = projected["properties"].as_object().unwrap();
        assert!(props.contains_key("clause_id"));
        for field in INTERNAL_FIELDS {
            assert!(!props.contains_key(field));
        }
        assert_eq!(projected["required"], json!(["clause_id"]));
        assert!(projected.get("$schema").is_none());
        // Input untouched.
        assert!(schema["properties"].as_object().unwrap().contains_key("document_structure"));
    }

    #[test]
    fn non_object_schema_becomes_empty_object_schema() {
        let projected = strip_internal_fields(&json!(null));
        assert_eq!(projected["type"], "object");
    }
}
