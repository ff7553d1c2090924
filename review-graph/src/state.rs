//! Checkpointed graph state and the partial updates nodes return.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use ai_llm_service::ChatMessage;
use contract_model::{
    Action, ClauseFindings, Diff, DocumentStructure, ReviewChecklistItem, Risk,
};

use crate::orchestrator::ReviewPlan;

/// Role of an uploaded document within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentRole {
    Primary,
    Reference,
}

/// One structured document attached to the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDocument {
    pub document_id: String,
    pub role: DocumentRole,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub structure: Option<DocumentStructure>,
}

/// Outcome of the clause quality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationResult {
    Pass,
    Fail,
}

/// The complete checkpointed value. Every field has a serde default so a
/// pruned or truncated persisted payload still deserializes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphState {
    pub task_id: String,
    pub our_party: String,
    pub material_type: String,
    pub language: String,
    pub domain_id: Option<String>,
    pub domain_subtype: Option<String>,

    pub documents: Vec<TaskDocument>,
    pub primary_structure: Option<DocumentStructure>,

    pub review_checklist: Vec<ReviewChecklistItem>,
    pub current_clause_index: usize,

    pub findings: BTreeMap<String, ClauseFindings>,
    pub global_issues: Vec<String>,

    pub current_clause_id: String,
    pub current_clause_text: String,
    pub current_risks: Vec<Risk>,
    pub current_diffs: Vec<Diff>,
    pub current_skill_context: BTreeMap<String, Value>,
    /// ReAct transcript of the current clause; pruned from large checkpoints.
    pub agent_messages: Vec<ChatMessage>,

    pub validation_result: Option<ValidationResult>,
    pub clause_retry_count: u32,
    pub max_retries: u32,

    pub pending_diffs: Vec<Diff>,
    pub user_decisions: BTreeMap<String, String>,
    pub user_feedback: BTreeMap<String, String>,

    pub all_risks: Vec<Risk>,
    pub all_diffs: Vec<Diff>,
    pub all_actions: Vec<Action>,

    pub review_plan: Option<ReviewPlan>,
    pub plan_version: u32,

    /// Review criteria rows supplied with the task (external parser output).
    pub criteria_data: Vec<Value>,
    pub criteria_file_path: String,

    pub summary_notes: String,
    pub error: Option<String>,
    pub is_complete: bool,
}

impl GraphState {
    /// Projection of the state handed to skills via `prepare_input`.
    pub fn skill_snapshot(&self) -> Value {
        let reference_structures: Vec<&DocumentStructure> = self
            .documents
            .iter()
            .filter(|d| d.role == DocumentRole::Reference)
            .filter_map(|d| d.structure.as_ref())
            .collect();
        json!({
            "our_party": self.our_party,
            "language": self.language,
            "domain_id": self.domain_id.clone().unwrap_or_default(),
            "criteria_data": self.criteria_data,
            "criteria_file_path": self.criteria_file_path,
            "reference_structures": reference_structures,
        })
    }
}

/// Partial state update returned by a node. `None` leaves the slot alone;
/// double options distinguish "clear" from "keep" for nullable slots.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub primary_structure: Option<Option<DocumentStructure>>,
    pub review_checklist: Option<Vec<ReviewChecklistItem>>,
    pub current_clause_index: Option<usize>,

    pub findings: Option<BTreeMap<String, ClauseFindings>>,
    pub global_issues: Option<Vec<String>>,

    pub current_clause_id: Option<String>,
    pub current_clause_text: Option<String>,
    pub current_risks: Option<Vec<Risk>>,
    pub current_diffs: Option<Vec<Diff>>,
    pub current_skill_context: Option<BTreeMap<String, Value>>,
    pub agent_messages: Option<Vec<ChatMessage>>,

    pub validation_result: Option<ValidationResult>,
    pub clause_retry_count: Option<u32>,
    pub max_retries: Option<u32>,

    pub pending_diffs: Option<Vec<Diff>>,
    pub user_decisions: Option<BTreeMap<String, String>>,
    pub user_feedback: Option<BTreeMap<String, String>>,

    pub all_risks: Option<Vec<Risk>>,
    pub all_diffs: Option<Vec<Diff>>,
    pub all_actions: Option<Vec<Action>>,

    pub review_plan: Option<Option<ReviewPlan>>,
    pub plan_version: Option<u32>,

    pub summary_notes: Option<String>,
    pub error: Option<Option<String>>,
    pub is_complete: Option<bool>,
}

impl GraphState {
    /// Merges a partial update. Only the engine calls this.
    pub fn apply(&mut self, update: StateUpdate) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = update.$field { self.$field = value; })*
            };
        }
        merge!(
            primary_structure,
            review_checklist,
            current_clause_index,
            findings,
            global_issues,
            current_clause_id,
            current_clause_text,
            current_risks,
            current_diffs,
            current_skill_context,
            agent_messages,
            clause_retry_count,
            max_retries,
            pending_diffs,
            user_decisions,
            user_feedback,
            all_risks,
            all_diffs,
            all_actions,
            review_plan,
            plan_version,
            summary_notes,
            error,
            is_complete,
        );
        if let Some(result) = update.validation_result {
            self.validation_result = Some(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_merges_only_present_fields() {
        let mut state = GraphState {
            task_id: "t1".to_string(),
            current_clause_index: 2,
            summary_notes: "old".to_string(),
            ..Default::default()
        };
        state.apply(StateUpdate {
            current_clause_index: Some(3),
            ..Default::default()
        });
        assert_eq!(state.current_clause_index, 3);
        assert_eq!(state.summary_notes, "old");
        assert_eq!(state.task_id, "t1");
    }

    #[test]
    fn error_slot_distinguishes_clear_from_keep() {
        let mut state = GraphState {
            error: Some("boom".to_string()),
            ..Default::default()
        };
        state.apply(StateUpdate::default());
        assert!(state.error.is_some());
        state.apply(StateUpdate {
            error: Some(None),
            ..Default::default()
        });
        assert!(state.error.is_none());
    }

    #[test]
    fn state_round_trips_through_json() {
        let state = GraphState {
            task_id: "t1".to_string(),
            language: "en".to_string(),
            plan_version: 2,
            ..Default::default()
        };
        let value = serde_json::to_value(&state).unwrap();
        let back: GraphState = serde_json::from_value(value).unwrap();
        assert_eq!(back.task_id, "t1");
        assert_eq!(back.plan_version, 2);
    }

    #[test]
    fn truncated_payload_still_deserializes() {
        let back: GraphState = serde_json::from_value(json!({
            "task_id": "t1",
            "current_clause_index": 4,
            "is_complete": false,
        }))
        .unwrap();
        assert_eq!(back.task_id, "t1");
        assert_eq!(back.current_clause_index, 4);
        assert!(back.review_checklist.is_empty());
    }
}
