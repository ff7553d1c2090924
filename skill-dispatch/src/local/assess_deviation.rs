//! `assess_deviation` — grade a clause against its matched review criteria.
//!
//! The grading itself is an LLM task; without a client (or on any LLM
//! failure) every criterion degrades to an `unknown` deviation marked for
//! human judgement, so the pipeline never stalls here.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use ai_llm_service::json_utils::parse_json_array;
use ai_llm_service::{ChatMessage, LlmClient};
use contract_model::DocumentStructure;

use crate::local::{snapshot_criteria, snapshot_str};

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AssessDeviationInput {
    pub clause_id: String,
    #[serde(default)]
    pub clause_text: String,
    #[serde(default)]
    pub baseline_text: String,
    #[serde(default)]
    pub review_criteria: Vec<Value>,
    #[serde(default)]
    pub domain_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DeviationItem {
    pub criterion_id: String,
    #[serde(default)]
    pub review_point: String,
    #[serde(default)]
    pub deviation_level: String,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub suggested_action: String,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AssessDeviationOutput {
    pub clause_id: String,
    #[serde(default)]
    pub deviations: Vec<DeviationItem>,
    pub total_assessed: usize,
    pub major_count: usize,
    pub has_criteria: bool,
    pub llm_used: bool,
}

const DEVIATION_LEVELS: &[&str] = &["none", "minor", "major", "critical", "unknown"];
const RISK_LEVELS: &[&str] = &["low", "medium", "high", "critical", "unknown"];

const ASSESS_SYSTEM: &str = "\
You are a senior contract review lawyer. Grade the clause strictly against \
each matched review criterion. Output a JSON array only, one element per \
criterion, with fields: criterion_id, review_point, deviation_level, \
risk_level, rationale, suggested_action, confidence. deviation_level must be \
one of none|minor|major|critical|unknown; risk_level one of \
low|medium|high|critical|unknown; confidence a number between 0 and 1.";

fn normalize_level(raw: &str, allowed: &[&str], default: &str) -> String {
    let value = raw.trim().to_lowercase();
    if allowed.contains(&value.as_str()) {
        value
    } else {
        default.to_string()
    }
}

fn clamp_confidence(raw: Option<&Value>) -> f32 {
    raw.and_then(Value::as_f64).unwrap_or(0.0).clamp(0.0, 1.0) as f32
}

fn row_str(row: &Value, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn map_str(row: &Map<String, Value>, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn build_messages(input: &AssessDeviationInput) -> Vec<ChatMessage> {
    let mut criteria_lines = Vec::new();
    for row in &input.review_criteria {
        if !row.is_object() {
            continue;
        }
        criteria_lines.push(format!(
            "- criterion_id: {}\n  review_point: {}\n  risk_level: {}\n  baseline_text: {}\n  suggested_action: {}",
            row_str(row, "criterion_id"),
            row_str(row, "review_point"),
            row_str(row, "risk_level"),
            row_str(row, "baseline_text"),
            row_str(row, "suggested_action"),
        ));
    }
    let user = format!(
        "domain_id: {}\nclause_id: {}\nclause_text:\n{}\n\nbaseline_text:\n{}\n\nmatched_review_criteria:\n{}",
        input.domain_id,
        input.clause_id,
        input.clause_text,
        input.baseline_text,
        criteria_lines.join("\n"),
    );
    vec![ChatMessage::system(ASSESS_SYSTEM), ChatMessage::user(user)]
}

fn fallback_assessment(input: &AssessDeviationInput, reason: &str) -> AssessDeviationOutput {
    let deviations: Vec<DeviationItem> = input
        .review_criteria
        .iter()
        .filter(|row| row.is_object())
        .map(|row| DeviationItem {
            criterion_id: row_str(row, "criterion_id"),
            review_point: row_str(row, "review_point"),
            deviation_level: "unknown".to_string(),
            risk_level: normalize_level(&row_str(row, "risk_level"), RISK_LEVELS, "unknown"),
            rationale: reason.to_string(),
            suggested_action: row_str(row, "suggested_action"),
            confidence: 0.0,
        })
        .collect();

    AssessDeviationOutput {
        clause_id: input.clause_id.clone(),
        total_assessed: deviations.len(),
        deviations,
        major_count: 0,
        has_criteria: !input.review_criteria.is_empty(),
        llm_used: false,
    }
}

pub async fn assess_deviation(
    input: AssessDeviationInput,
    llm: Option<&LlmClient>,
) -> AssessDeviationOutput {
    if input.review_criteria.is_empty() {
        return AssessDeviationOutput {
            clause_id: input.clause_id,
            has_criteria: false,
            ..Default::default()
        };
    }
    if input.clause_text.trim().is_empty() {
        return fallback_assessment(&input, "clause text is empty, deviation not assessable");
    }
    let Some(llm) = llm else {
        return fallback_assessment(&input, "LLM client unavailable, pending human judgement");
    };

    let parsed_rows = match llm.chat(&build_messages(&input), None).await {
        Ok(response) => parse_json_array(&response),
        Err(err) => {
            warn!(clause_id = %input.clause_id, %err, "assess_deviation LLM call failed");
            return fallback_assessment(&input, "LLM call failed, pending human judgement");
        }
    };
    if parsed_rows.is_empty() {
        return fallback_assessment(&input, "LLM returned no parseable JSON, pending human judgement");
    }

    let mut deviations = Vec::new();
    for criterion in input.review_criteria.iter().filter(|row| row.is_object()) {
        let criterion_id = row_str(criterion, "criterion_id");
        let parsed = parsed_rows
            .iter()
            .find(|row| map_str(row, "criterion_id") == criterion_id);

        let (review_point, deviation_level, risk_level, rationale, suggested_action, confidence) =
            match parsed {
                Some(row) => (
                    some_or(&map_str(row, "review_point"), &row_str(criterion, "review_point")),
                    normalize_level(&map_str(row, "deviation_level"), DEVIATION_LEVELS, "unknown"),
                    normalize_level(
                        &map_str(row, "risk_level"),
                        RISK_LEVELS,
                        &normalize_level(&row_str(criterion, "risk_level"), RISK_LEVELS, "unknown"),
                    ),
                    map_str(row, "rationale"),
                    some_or(
                        &map_str(row, "suggested_action"),
                        &row_str(criterion, "suggested_action"),
                    ),
                    clamp_confidence(row.get("confidence")),
                ),
                None => (
                    row_str(criterion, "review_point"),
                    "unknown".to_string(),
                    normalize_level(&row_str(criterion, "risk_level"), RISK_LEVELS, "unknown"),
                    String::new(),
                    row_str(criterion, "suggested_action"),
                    0.0,
                ),
            };

        deviations.push(DeviationItem {
            criterion_id,
            review_point,
            deviation_level,
            risk_level,
            rationale,
            suggested_action,
            confidence,
        });
    }

    let major_count = deviations
        .iter()
        .filter(|d| d.deviation_level == "major" || d.deviation_level == "critical")
        .count();

    AssessDeviationOutput {
        clause_id: input.clause_id,
        total_assessed: deviations.len(),
        deviations,
        major_count,
        has_criteria: true,
        llm_used: true,
    }
}

fn some_or(primary: &str, fallback: &str) -> String {
    if primary.is_empty() {
        fallback.to_string()
    } else {
        primary.to_string()
    }
}

/// Criteria rows from the snapshot that reference this clause (with prefix
/// tolerance on the reference).
fn match_criteria_for_clause(criteria: &[Value], clause_id: &str) -> Vec<Value> {
    let current = clause_id.trim();
    if current.is_empty() {
        return Vec::new();
    }
    criteria
        .iter()
        .filter(|row| {
            let candidate = row_str(row, "clause_ref");
            let candidate = candidate.trim();
            !candidate.is_empty()
                && (candidate == current
                    || current.starts_with(&format!("{candidate}."))
                    || candidate.starts_with(&format!("{current}.")))
        })
        .cloned()
        .collect()
}

pub fn prepare_input(
    clause_id: &str,
    structure: &DocumentStructure,
    snapshot: &Value,
) -> AssessDeviationInput {
    let domain_id = snapshot_str(snapshot, "domain_id");
    AssessDeviationInput {
        clause_id: clause_id.to_string(),
        clause_text: structure.clause_text(clause_id),
        baseline_text: contract_model::plugin::get_baseline_text(&domain_id, clause_id)
            .unwrap_or_default(),
        review_criteria: match_criteria_for_clause(&snapshot_criteria(snapshot), clause_id),
        domain_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input_with_criteria() -> AssessDeviationInput {
        AssessDeviationInput {
            clause_id: "14.2".to_string(),
            clause_text: "payment within 10 days".to_string(),
            review_criteria: vec![json!({
                "criterion_id": "c1",
                "review_point": "payment window",
                "risk_level": "high",
                "suggested_action": "extend to 30 days",
            })],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn no_criteria_short_circuits() {
        let out = assess_deviation(AssessDeviationInput::default(), None).await;
        assert!(!out.has_criteria);
        assert_eq!(out.total_assessed, 0);
    }

    #[tokio::test]
    async fn missing_llm_degrades_to_unknown() {
        let out = assess_deviation(input_with_criteria(), None).await;
        assert!(out.has_criteria);
        assert!(!out.llm_used);
        assert_eq!(out.deviations[0].deviation_level, "unknown");
        assert_eq!(out.deviations[0].risk_level, "high");
        assert_eq!(out.deviations[0].suggested_action, "extend to 30 days");
    }

    #[test]
    fn criteria_matching_uses_prefix_tolerance() {
        let rows = vec![
            json!({"clause_ref": "14.2", "criterion_id": "a"}),
            json!({"clause_ref": "20", "criterion_id": "b"}),
        ];
        let matched = match_criteria_for_clause(&rows, "14.2.1");
        assert_eq!(matched.len(), 1);
    }
}
