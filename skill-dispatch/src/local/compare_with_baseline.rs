//! `compare_with_baseline` — diff a clause against reference wording.
//!
//! The textual comparison is deterministic; when an LLM client is available
//! and the texts differ, a semantic classification pass labels the change
//! (significance, key changes, risk delta) with strictly sanitized enums.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use ai_llm_service::json_utils::parse_json_object;
use ai_llm_service::{ChatMessage, LlmClient};
use contract_model::DocumentStructure;

use crate::local::snapshot_str;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CompareWithBaselineInput {
    pub clause_id: String,
    #[serde(default)]
    pub document_structure: DocumentStructure,
    /// Reference wording to compare against; empty means no baseline.
    #[serde(default)]
    pub baseline_text: String,
    #[serde(default)]
    pub state_snapshot: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct KeyChange {
    #[serde(default)]
    pub change_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub risk_impact: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CompareWithBaselineOutput {
    pub clause_id: String,
    pub has_baseline: bool,
    #[serde(default)]
    pub current_text: String,
    #[serde(default)]
    pub baseline_text: String,
    #[serde(default)]
    pub is_identical: bool,
    #[serde(default)]
    pub differences_summary: String,
    #[serde(default)]
    pub change_significance: String,
    #[serde(default)]
    pub key_changes: Vec<KeyChange>,
    #[serde(default)]
    pub overall_risk_delta: String,
    #[serde(default)]
    pub semantic_summary: String,
    #[serde(default)]
    pub llm_used: bool,
}

const CHANGE_SIGNIFICANCE: &[&str] = &["material", "minor", "cosmetic"];
const RISK_DELTA: &[&str] = &["increased", "decreased", "neutral"];
const CHANGE_TYPES: &[&str] = &[
    "obligation_weakened",
    "obligation_strengthened",
    "time_changed",
    "amount_changed",
    "scope_changed",
    "party_changed",
    "condition_added",
    "condition_removed",
    "wording_only",
];
const RISK_IMPACT: &[&str] = &["high", "medium", "low", "none"];

const COMPARE_SYSTEM: &str = "\
You are a contract change analyst. Compare the baseline text with the current \
text and classify the legal effect of the change. Output a single JSON object \
and nothing else, with fields:
- change_significance: material | minor | cosmetic
- key_changes: array of {change_type, description, risk_impact} where \
change_type is one of obligation_weakened|obligation_strengthened|time_changed|\
amount_changed|scope_changed|party_changed|condition_added|condition_removed|\
wording_only and risk_impact is high|medium|low|none
- overall_risk_delta: increased | decreased | neutral
- summary: one sentence on the combined effect";

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Line-level added/removed summary, capped at five lines per side.
fn diff_summary(baseline: &str, current: &str) -> String {
    let baseline_lines: BTreeSet<&str> =
        baseline.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let current_lines: BTreeSet<&str> =
        current.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    let removed: Vec<&str> = baseline_lines.difference(&current_lines).copied().take(5).collect();
    let added: Vec<&str> = current_lines.difference(&baseline_lines).copied().take(5).collect();

    let mut parts = Vec::new();
    if !removed.is_empty() {
        parts.push(format!("removed: {}", removed.join("; ")));
    }
    if !added.is_empty() {
        parts.push(format!("added: {}", added.join("; ")));
    }
    if parts.is_empty() {
        parts.push("texts differ in minor formatting".to_string());
    }
    parts.join("\n")
}

fn keep_if_allowed(raw: &Value, allowed: &[&str]) -> String {
    let value = raw.as_str().unwrap_or_default().trim().to_lowercase();
    if allowed.contains(&value.as_str()) {
        value
    } else {
        String::new()
    }
}

fn sanitize_semantic(payload: &Map<String, Value>) -> (String, Vec<KeyChange>, String, String) {
    let significance = keep_if_allowed(
        payload.get("change_significance").unwrap_or(&Value::Null),
        CHANGE_SIGNIFICANCE,
    );
    let risk_delta = keep_if_allowed(
        payload.get("overall_risk_delta").unwrap_or(&Value::Null),
        RISK_DELTA,
    );
    let summary = payload
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let mut key_changes = Vec::new();
    if let Some(rows) = payload.get("key_changes").and_then(Value::as_array) {
        for row in rows {
            let Some(obj) = row.as_object() else { continue };
            let change_type =
                keep_if_allowed(obj.get("change_type").unwrap_or(&Value::Null), CHANGE_TYPES);
            let mut risk_impact =
                keep_if_allowed(obj.get("risk_impact").unwrap_or(&Value::Null), RISK_IMPACT);
            if risk_impact.is_empty() {
                risk_impact = "none".to_string();
            }
            key_changes.push(KeyChange {
                change_type,
                description: obj
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                risk_impact,
            });
        }
    }
    (significance, key_changes, risk_delta, summary)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

async fn semantic_analysis(
    llm: &LlmClient,
    baseline: &str,
    current: &str,
    diff: &str,
) -> Option<Map<String, Value>> {
    let user = format!(
        "baseline text:\n{}\n\ncurrent text:\n{}\n\ntextual differences:\n{}",
        truncate_chars(baseline, 2000),
        truncate_chars(current, 2000),
        diff,
    );
    let messages = vec![ChatMessage::system(COMPARE_SYSTEM), ChatMessage::user(user)];
    match llm.chat(&messages, None).await {
        Ok(response) => {
            let parsed = parse_json_object(&response);
            if parsed.is_empty() { None } else { Some(parsed) }
        }
        Err(err) => {
            debug!(%err, "baseline semantic analysis degraded to textual diff only");
            None
        }
    }
}

pub async fn compare_with_baseline(
    input: CompareWithBaselineInput,
    llm: Option<&LlmClient>,
) -> CompareWithBaselineOutput {
    let current_text = input.document_structure.clause_text(&input.clause_id);

    if input.baseline_text.is_empty() {
        return CompareWithBaselineOutput {
            clause_id: input.clause_id,
            has_baseline: false,
            current_text,
            ..Default::default()
        };
    }

    let is_identical = normalize_ws(&current_text) == normalize_ws(&input.baseline_text);
    let differences_summary = if is_identical {
        String::new()
    } else {
        diff_summary(&input.baseline_text, &current_text)
    };

    let mut output = CompareWithBaselineOutput {
        clause_id: input.clause_id,
        has_baseline: true,
        current_text,
        baseline_text: input.baseline_text,
        is_identical,
        differences_summary,
        ..Default::default()
    };

    if !is_identical {
        if let Some(llm) = llm {
            if let Some(payload) = semantic_analysis(
                llm,
                &output.baseline_text,
                &output.current_text,
                &output.differences_summary,
            )
            .await
            {
                let (significance, key_changes, risk_delta, summary) = sanitize_semantic(&payload);
                output.change_significance = significance;
                output.key_changes = key_changes;
                output.overall_risk_delta = risk_delta;
                output.semantic_summary = summary;
                output.llm_used = true;
            }
        }
    }
    output
}

pub fn prepare_input(
    clause_id: &str,
    structure: &DocumentStructure,
    snapshot: &Value,
) -> CompareWithBaselineInput {
    let domain_id = snapshot_str(snapshot, "domain_id");
    let baseline_text =
        contract_model::plugin::get_baseline_text(&domain_id, clause_id).unwrap_or_default();
    CompareWithBaselineInput {
        clause_id: clause_id.to_string(),
        document_structure: structure.clone(),
        baseline_text,
        state_snapshot: serde_json::json!({
            "our_party": snapshot_str(snapshot, "our_party"),
            "language": snapshot_str(snapshot, "language"),
            "domain_id": domain_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_model::StructureParser;

    fn doc() -> DocumentStructure {
        StructureParser::generic().parse("14 Payment within 30 days.\n", "d")
    }

    #[tokio::test]
    async fn no_baseline_short_circuits() {
        let input = CompareWithBaselineInput {
            clause_id: "14".to_string(),
            document_structure: doc(),
            ..Default::default()
        };
        let out = compare_with_baseline(input, None).await;
        assert!(!out.has_baseline);
        assert!(out.current_text.contains("30 days"));
    }

    #[tokio::test]
    async fn identical_after_whitespace_normalization() {
        let input = CompareWithBaselineInput {
            clause_id: "14".to_string(),
            document_structure: doc(),
            baseline_text: "14  Payment   within 30 days.".to_string(),
            ..Default::default()
        };
        let out = compare_with_baseline(input, None).await;
        assert!(out.is_identical);
        assert!(out.differences_summary.is_empty());
    }

    #[tokio::test]
    async fn differing_texts_produce_summary_without_llm() {
        let input = CompareWithBaselineInput {
            clause_id: "14".to_string(),
            document_structure: doc(),
            baseline_text: "14 Payment within 56 days.".to_string(),
            ..Default::default()
        };
        let out = compare_with_baseline(input, None).await;
        assert!(!out.is_identical);
        assert!(out.differences_summary.contains("added"));
        assert!(!out.llm_used);
    }

    #[test]
    fn sanitize_rejects_unknown_enums() {
        let payload = parse_json_object(
            r#"{"change_significance":"huge","overall_risk_delta":"increased",
               "key_changes":[{"change_type":"time_changed","risk_impact":"severe"}],
               "summary":"ok"}"#,
        );
        let (sig, changes, delta, summary) = sanitize_semantic(&payload);
        assert!(sig.is_empty());
        assert_eq!(delta, "increased");
        assert_eq!(changes[0].risk_impact, "none");
        assert_eq!(summary, "ok");
    }
}
