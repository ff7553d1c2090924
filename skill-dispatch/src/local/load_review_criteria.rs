//! `load_review_criteria` — match supplied review criteria to a clause.
//!
//! Criteria rows come from the orchestrator (uploaded checklists parsed by an
//! external collaborator); matching is by normalized clause reference with
//! prefix tolerance.

use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use contract_model::DocumentStructure;

use crate::local::snapshot_criteria;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LoadReviewCriteriaInput {
    pub clause_id: String,
    #[serde(default)]
    pub document_structure: DocumentStructure,
    #[serde(default)]
    pub criteria_file_path: String,
    #[serde(default)]
    pub criteria_data: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MatchedCriterion {
    pub criterion_id: String,
    pub clause_ref: String,
    pub review_point: String,
    pub risk_level: String,
    pub baseline_text: String,
    pub suggested_action: String,
    pub match_type: String,
    pub match_score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LoadReviewCriteriaOutput {
    pub clause_id: String,
    #[serde(default)]
    pub matched_criteria: Vec<MatchedCriterion>,
    pub total_matched: usize,
    pub has_criteria: bool,
}

static REF_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:sub-?clause|clause|article|section|条款|第)\s*")
        .expect("clause-ref prefix pattern compiles")
});

/// Normalizes `Clause 14.2.` / `第14.2条款` style references down to `14.2`.
fn normalize_clause_ref(reference: &str) -> String {
    let value = REF_PREFIX.replace(reference.trim(), "");
    value
        .trim_end_matches('款')
        .trim_end_matches('条')
        .trim()
        .trim_end_matches('.')
        .trim()
        .to_string()
}

fn is_clause_match(current: &str, candidate: &str) -> bool {
    if current.is_empty() || candidate.is_empty() {
        return false;
    }
    current == candidate
        || current.starts_with(&format!("{candidate}."))
        || candidate.starts_with(&format!("{current}."))
}

fn row_str(row: &Value, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn load_review_criteria(input: LoadReviewCriteriaInput) -> LoadReviewCriteriaOutput {
    if input.criteria_data.is_empty() {
        return LoadReviewCriteriaOutput {
            clause_id: input.clause_id,
            has_criteria: false,
            ..Default::default()
        };
    }

    let current = normalize_clause_ref(&input.clause_id);
    let mut matched = Vec::new();
    for row in &input.criteria_data {
        if !row.is_object() {
            continue;
        }
        let clause_ref = row_str(row, "clause_ref");
        if is_clause_match(&current, &normalize_clause_ref(&clause_ref)) {
            matched.push(MatchedCriterion {
                criterion_id: row_str(row, "criterion_id"),
                clause_ref,
                review_point: row_str(row, "review_point"),
                risk_level: row_str(row, "risk_level"),
                baseline_text: row_str(row, "baseline_text"),
                suggested_action: row_str(row, "suggested_action"),
                match_type: "exact".to_string(),
                match_score: 1.0,
            });
        }
    }

    LoadReviewCriteriaOutput {
        clause_id: input.clause_id,
        total_matched: matched.len(),
        matched_criteria: matched,
        has_criteria: true,
    }
}

pub fn prepare_input(
    clause_id: &str,
    structure: &DocumentStructure,
    snapshot: &Value,
) -> LoadReviewCriteriaInput {
    LoadReviewCriteriaInput {
        clause_id: clause_id.to_string(),
        document_structure: structure.clone(),
        criteria_file_path: crate::local::snapshot_str(snapshot, "criteria_file_path"),
        criteria_data: snapshot_criteria(snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn criteria() -> Vec<Value> {
        vec![
            json!({"criterion_id": "c1", "clause_ref": "Clause 14.2", "review_point": "advance payment", "risk_level": "high", "baseline_text": "", "suggested_action": ""}),
            json!({"criterion_id": "c2", "clause_ref": "17", "review_point": "indemnity", "risk_level": "medium", "baseline_text": "", "suggested_action": ""}),
        ]
    }

    #[test]
    fn matches_normalized_and_prefix_refs() {
        let out = load_review_criteria(LoadReviewCriteriaInput {
            clause_id: "14.2.1".to_string(),
            criteria_data: criteria(),
            ..Default::default()
        });
        assert!(out.has_criteria);
        assert_eq!(out.total_matched, 1);
        assert_eq!(out.matched_criteria[0].criterion_id, "c1");
    }

    #[test]
    fn no_criteria_rows_flags_absence() {
        let out = load_review_criteria(LoadReviewCriteriaInput {
            clause_id: "14.2".to_string(),
            ..Default::default()
        });
        assert!(!out.has_criteria);
        assert_eq!(out.total_matched, 0);
    }

    #[test]
    fn normalization_strips_labels() {
        assert_eq!(normalize_clause_ref("Sub-Clause 14.2."), "14.2");
        assert_eq!(normalize_clause_ref("第14条"), "14");
    }
}
