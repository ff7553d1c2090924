//! Review artifacts: checklist items, risks, diffs and per-clause findings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Generates a prefixed opaque id, e.g. `diff_2f4c…`.
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Checklist priority for a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Normalized risk severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    /// Coerces a raw LLM-provided level, defaulting unknown values to medium.
    pub fn coerce(raw: &str) -> RiskLevel {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => RiskLevel::High,
            "low" => RiskLevel::Low,
            _ => RiskLevel::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Medium
    }
}

/// One entry of the review checklist driving the per-clause loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewChecklistItem {
    pub clause_id: String,
    #[serde(default)]
    pub clause_name: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Location payload carried by a risk; currently only the offending text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskLocation {
    pub original_text: String,
}

/// A risk identified on one clause.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Risk {
    pub id: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub risk_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub location: Option<RiskLocation>,
}

/// Kind of textual edit a diff proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    Replace,
    Delete,
    Insert,
}

impl Default for DiffAction {
    fn default() -> Self {
        DiffAction::Replace
    }
}

impl DiffAction {
    /// Coerces a raw action string, defaulting unknown values to replace.
    pub fn coerce(raw: &str) -> DiffAction {
        match raw.trim().to_ascii_lowercase().as_str() {
            "delete" => DiffAction::Delete,
            "insert" => DiffAction::Insert,
            _ => DiffAction::Replace,
        }
    }
}

/// Approval lifecycle of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Pending,
    Approved,
    Rejected,
    Revised,
}

impl Default for DiffStatus {
    fn default() -> Self {
        DiffStatus::Pending
    }
}

/// A proposed textual edit against a clause, awaiting human approval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub diff_id: String,
    #[serde(default)]
    pub risk_id: Option<String>,
    pub clause_id: String,
    #[serde(default)]
    pub action_type: DiffAction,
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub proposed_text: String,
    #[serde(default)]
    pub status: DiffStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// A follow-up action recommendation attached to one or more risks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(default)]
    pub related_risk_ids: Vec<String>,
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub urgency: String,
}

/// Accumulated record for one reviewed clause.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClauseFindings {
    pub clause_id: String,
    #[serde(default)]
    pub risks: Vec<Risk>,
    #[serde(default)]
    pub diffs: Vec<Diff>,
    #[serde(default)]
    pub skill_context: BTreeMap<String, Value>,
    #[serde(default)]
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_unknown_risk_level_to_medium() {
        assert_eq!(RiskLevel::coerce("HIGH"), RiskLevel::High);
        assert_eq!(RiskLevel::coerce("catastrophic"), RiskLevel::Medium);
        assert_eq!(RiskLevel::coerce(""), RiskLevel::Medium);
    }

    #[test]
    fn coerce_unknown_diff_action_to_replace() {
        assert_eq!(DiffAction::coerce("insert"), DiffAction::Insert);
        assert_eq!(DiffAction::coerce("rewrite"), DiffAction::Replace);
    }

    #[test]
    fn generated_ids_carry_prefix_and_are_unique() {
        let a = generate_id("risk");
        let b = generate_id("risk");
        assert!(a.starts_with("risk_"));
        assert_ne!(a, b);
    }

    #[test]
    fn diff_serializes_with_lowercase_enums() {
        let diff = Diff {
            diff_id: "diff_1".to_string(),
            clause_id: "14.2".to_string(),
            action_type: DiffAction::Replace,
            status: DiffStatus::Pending,
            ..Default::default()
        };
        let value = serde_json::to_value(&diff).unwrap();
        assert_eq!(value["action_type"], "replace");
        assert_eq!(value["status"], "pending");
    }
}
