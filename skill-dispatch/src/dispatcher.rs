//! Unified skill calling entry.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use ai_llm_service::{LlmClient, ToolDefinition};
use contract_model::DocumentStructure;

use crate::errors::SkillError;
use crate::local::SkillHandler;
use crate::remote::WorkflowClient;
use crate::schema::{INTERNAL_FIELDS, SkillBackend, SkillRegistration, SkillResult};
use crate::tool_adapter::skills_to_tool_definitions;

/// Shared collaborators handed to handlers at execution time.
#[derive(Clone, Default)]
pub struct SkillDeps {
    pub llm: Option<Arc<LlmClient>>,
    pub workflow: Option<Arc<WorkflowClient>>,
}

/// Registry plus executor for all skills of one process.
///
/// Registration is expected at startup; execution is read-only afterwards, so
/// the dispatcher can be shared behind an `Arc` without locking.
pub struct SkillDispatcher {
    deps: SkillDeps,
    registrations: Vec<SkillRegistration>,
}

impl SkillDispatcher {
    pub fn new(deps: SkillDeps) -> Self {
        Self {
            deps,
            registrations: Vec::new(),
        }
    }

    /// Registers a skill. Re-registration overwrites with a warning; remote
    /// skills require a configured workflow client.
    pub fn register(&mut self, skill: SkillRegistration) -> Result<(), SkillError> {
        if skill.backend == SkillBackend::Remote {
            let has_workflow_id = matches!(&skill.handler, SkillHandler::Remote { workflow_id } if !workflow_id.is_empty());
            if !has_workflow_id {
                return Err(SkillError::InvalidRegistration {
                    skill_id: skill.skill_id.clone(),
                    reason: "remote skill without workflow id".to_string(),
                });
            }
            if self.deps.workflow.is_none() {
                return Err(SkillError::InvalidRegistration {
                    skill_id: skill.skill_id.clone(),
                    reason: "remote skill registered without a workflow client".to_string(),
                });
            }
        }

        if let Some(existing) = self
            .registrations
            .iter_mut()
            .find(|r| r.skill_id == skill.skill_id)
        {
            warn!(skill_id = %skill.skill_id, "skill re-registered, overwriting");
            *existing = skill;
            return Ok(());
        }
        info!(skill_id = %skill.skill_id, backend = ?skill.backend, "skill registered");
        self.registrations.push(skill);
        Ok(())
    }

    pub fn register_batch(&mut self, skills: Vec<SkillRegistration>) -> Result<(), SkillError> {
        for skill in skills {
            self.register(skill)?;
        }
        Ok(())
    }

    pub fn contains(&self, skill_id: &str) -> bool {
        self.registrations.iter().any(|r| r.skill_id == skill_id)
    }

    pub fn skill_ids(&self) -> Vec<String> {
        self.registrations.iter().map(|r| r.skill_id.clone()).collect()
    }

    pub fn get_registration(&self, skill_id: &str) -> Option<&SkillRegistration> {
        self.registrations.iter().find(|r| r.skill_id == skill_id)
    }

    /// LLM-facing tool definitions for a domain (generic `*` skills always
    /// included, non-active skills excluded).
    pub fn tool_definitions(&self, domain_filter: Option<&str>) -> Vec<ToolDefinition> {
        skills_to_tool_definitions(&self.registrations, domain_filter)
    }

    /// Executes a skill on an already-built input. Handler failures are
    /// captured in the result, not propagated; only an unknown skill id is a
    /// hard error.
    pub async fn call(&self, skill_id: &str, input: Value) -> Result<SkillResult, SkillError> {
        let registration = self
            .get_registration(skill_id)
            .ok_or_else(|| SkillError::NotRegistered(skill_id.to_string()))?;

        let started = Instant::now();
        match registration.handler.execute(skill_id, input, &self.deps).await {
            Ok(data) => Ok(SkillResult {
                skill_id: skill_id.to_string(),
                success: true,
                data: Some(data),
                error: None,
                execution_time_ms: started.elapsed().as_millis() as u64,
            }),
            Err(err) => {
                let elapsed = started.elapsed().as_millis() as u64;
                error!(skill_id, elapsed_ms = elapsed, %err, "skill execution failed");
                Ok(SkillResult {
                    skill_id: skill_id.to_string(),
                    success: false,
                    data: None,
                    error: Some(err.to_string()),
                    execution_time_ms: elapsed,
                })
            }
        }
    }

    /// Builds the default input from orchestrator state, merges the LLM's
    /// arguments over the non-internal fields, then executes.
    ///
    /// Internal fields (`document_structure`, `state_snapshot`,
    /// `criteria_data`, `criteria_file_path`) always come from the
    /// orchestrator and cannot be overridden by the model.
    pub async fn prepare_and_call(
        &self,
        skill_id: &str,
        clause_id: &str,
        primary_structure: &DocumentStructure,
        state_snapshot: &Value,
        llm_arguments: Option<&Map<String, Value>>,
    ) -> Result<SkillResult, SkillError> {
        let registration = self
            .get_registration(skill_id)
            .ok_or_else(|| SkillError::NotRegistered(skill_id.to_string()))?;

        let mut input =
            registration
                .handler
                .prepare_input(clause_id, primary_structure, state_snapshot)?;

        if let (Some(args), Some(target)) = (llm_arguments, input.as_object_mut()) {
            for (key, value) in args {
                if INTERNAL_FIELDS.contains(&key.as_str()) {
                    continue;
                }
                target.insert(key.clone(), value.clone());
            }
        }

        self.call(skill_id, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::generic_skills;
    use contract_model::StructureParser;
    use serde_json::json;

    fn dispatcher() -> SkillDispatcher {
        let mut d = SkillDispatcher::new(SkillDeps::default());
        d.register_batch(generic_skills()).unwrap();
        d
    }

    fn doc() -> DocumentStructure {
        StructureParser::generic().parse("1 Scope, see Clause 2 and Clause 99.\n2 Term\n", "d")
    }

    #[tokio::test]
    async fn prepare_and_call_runs_local_skill() {
        let d = dispatcher();
        let result = d
            .prepare_and_call("cross_reference_check", "1", &doc(), &json!({}), None)
            .await
            .unwrap();
        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["total_references"], 2);
        assert_eq!(data["total_invalid"], 1);
    }

    #[tokio::test]
    async fn llm_arguments_cannot_override_internal_fields() {
        let d = dispatcher();
        let mut args = Map::new();
        args.insert("clause_id".to_string(), json!("2"));
        args.insert("document_structure".to_string(), json!({"clauses": []}));
        let result = d
            .prepare_and_call("get_clause_context", "1", &doc(), &json!({}), Some(&args))
            .await
            .unwrap();
        assert!(result.success);
        let data = result.data.unwrap();
        // clause_id was overridden, the structure was not.
        assert_eq!(data["clause_id"], "2");
        assert_eq!(data["found"], true);
    }

    #[tokio::test]
    async fn unknown_skill_is_a_hard_error() {
        let d = dispatcher();
        let err = d.call("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, SkillError::NotRegistered(_)));
    }

    #[test]
    fn tool_definitions_strip_internal_fields() {
        let d = dispatcher();
        for tool in d.tool_definitions(Some("any-domain")) {
            let params = &tool.function.parameters;
            let props = params["properties"].as_object().unwrap();
            for field in INTERNAL_FIELDS {
                assert!(!props.contains_key(field), "{} leaked {}", tool.function.name, field);
            }
            if let Some(required) = params.get("required").and_then(|r| r.as_array()) {
                for field in required {
                    assert!(!INTERNAL_FIELDS.contains(&field.as_str().unwrap()));
                }
            }
        }
    }

    #[test]
    fn remote_registration_requires_workflow_client() {
        let mut d = SkillDispatcher::new(SkillDeps::default());
        let err = d
            .register(SkillRegistration {
                skill_id: "remote_x".to_string(),
                name: "remote".to_string(),
                description: String::new(),
                backend: SkillBackend::Remote,
                handler: SkillHandler::Remote {
                    workflow_id: "wf-1".to_string(),
                },
                domain: "*".to_string(),
                category: "general".to_string(),
                status: Default::default(),
                parameters_schema: json!({"type": "object", "properties": {}}),
            })
            .unwrap_err();
        assert!(matches!(err, SkillError::InvalidRegistration { .. }));
    }
}
