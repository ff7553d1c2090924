//! `search_reference_doc` — find related passages in reference documents.
//!
//! Embedding transport is an external collaborator; this skill scores with
//! lexical token overlap so it stays useful (and deterministic) without one.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use contract_model::{ClauseNode, DocumentStructure};

use crate::local::snapshot_str;

const QUERY_CHAR_LIMIT: usize = 300;
const MIN_SCORE: f32 = 0.1;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchReferenceDocInput {
    pub clause_id: String,
    #[serde(default)]
    pub document_structure: DocumentStructure,
    /// Search query; defaults to the clause's own text.
    #[serde(default)]
    pub query: String,
    /// Maximum number of hits to return.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub state_snapshot: Value,
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchHit {
    pub document_id: String,
    pub clause_id: String,
    pub title: String,
    pub snippet: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchReferenceDocOutput {
    pub clause_id: String,
    pub query: String,
    #[serde(default)]
    pub results: Vec<SearchHit>,
    pub total_results: usize,
    pub has_references: bool,
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity over word tokens.
fn overlap_score(query: &BTreeSet<String>, candidate: &BTreeSet<String>) -> f32 {
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    let intersection = query.intersection(candidate).count() as f32;
    let union = query.union(candidate).count() as f32;
    intersection / union
}

fn flatten<'a>(nodes: &'a [ClauseNode], out: &mut Vec<&'a ClauseNode>) {
    for node in nodes {
        out.push(node);
        flatten(&node.children, out);
    }
}

pub fn search_reference_doc(input: SearchReferenceDocInput) -> SearchReferenceDocOutput {
    let references: Vec<DocumentStructure> = input
        .state_snapshot
        .get("reference_structures")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| serde_json::from_value(row.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    let query = if input.query.trim().is_empty() {
        input
            .document_structure
            .clause_text(&input.clause_id)
            .chars()
            .take(QUERY_CHAR_LIMIT)
            .collect()
    } else {
        input.query.clone()
    };

    if references.is_empty() {
        return SearchReferenceDocOutput {
            clause_id: input.clause_id,
            query,
            has_references: false,
            ..Default::default()
        };
    }

    let query_tokens = tokenize(&query);
    let mut hits = Vec::new();
    for reference in &references {
        let mut nodes = Vec::new();
        flatten(&reference.clauses, &mut nodes);
        for node in nodes {
            let score = overlap_score(&query_tokens, &tokenize(&node.text));
            if score < MIN_SCORE {
                continue;
            }
            hits.push(SearchHit {
                document_id: reference.document_id.clone(),
                clause_id: node.clause_id.clone(),
                title: node.title.clone(),
                snippet: node.text.chars().take(200).collect(),
                score,
            });
        }
    }

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(input.top_k.max(1));

    SearchReferenceDocOutput {
        clause_id: input.clause_id,
        query,
        total_results: hits.len(),
        results: hits,
        has_references: true,
    }
}

pub fn prepare_input(
    clause_id: &str,
    structure: &DocumentStructure,
    snapshot: &Value,
) -> SearchReferenceDocInput {
    SearchReferenceDocInput {
        clause_id: clause_id.to_string(),
        document_structure: structure.clone(),
        query: String::new(),
        top_k: default_top_k(),
        state_snapshot: serde_json::json!({
            "reference_structures": snapshot.get("reference_structures").cloned().unwrap_or(Value::Array(Vec::new())),
            "language": snapshot_str(snapshot, "language"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_model::StructureParser;
    use serde_json::json;

    fn reference() -> DocumentStructure {
        StructureParser::generic().parse(
            "1 Advance payment shall be repaid through percentage deductions.\n2 Unrelated boilerplate about notices.\n",
            "ref-1",
        )
    }

    #[test]
    fn ranks_overlapping_clause_first() {
        let primary = StructureParser::generic()
            .parse("14 The advance payment shall be repaid by the contractor.\n", "doc");
        let input = SearchReferenceDocInput {
            clause_id: "14".to_string(),
            document_structure: primary,
            state_snapshot: json!({"reference_structures": [reference()]}),
            top_k: 3,
            ..Default::default()
        };
        let out = search_reference_doc(input);
        assert!(out.has_references);
        assert!(out.total_results >= 1);
        assert_eq!(out.results[0].clause_id, "1");
    }

    #[test]
    fn no_references_flagged() {
        let out = search_reference_doc(SearchReferenceDocInput {
            clause_id: "14".to_string(),
            query: "anything".to_string(),
            ..Default::default()
        });
        assert!(!out.has_references);
        assert_eq!(out.total_results, 0);
    }
}
