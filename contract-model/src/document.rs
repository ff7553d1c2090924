//! Clause tree, definitions and cross references.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One clause in the parsed document, identified by a dotted id such as
/// `14.2.1`. Clauses form a forest ordered by document position.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClauseNode {
    pub clause_id: String,
    /// First heading line of the clause; empty when none could be extracted.
    #[serde(default)]
    pub title: String,
    /// Depth of the dotted id (`14` → 0, `14.2` → 1), capped by the parser's
    /// `max_depth`.
    #[serde(default)]
    pub level: usize,
    pub text: String,
    #[serde(default)]
    pub start_offset: usize,
    #[serde(default)]
    pub end_offset: usize,
    #[serde(default)]
    pub children: Vec<ClauseNode>,
}

/// Where a cross reference was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceSource {
    Regex,
    Llm,
}

impl Default for ReferenceSource {
    fn default() -> Self {
        ReferenceSource::Regex
    }
}

/// A reference from one clause to another ("see Clause 14.2").
///
/// `is_valid` is true iff `target_clause_id` exists in the clause tree the
/// reference was extracted from.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CrossReference {
    pub source_clause_id: String,
    pub target_clause_id: String,
    pub reference_text: String,
    #[serde(default)]
    pub reference_type: String,
    pub is_valid: bool,
    #[serde(default)]
    pub source: ReferenceSource,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

/// Extracted definition with provenance, kept alongside the plain
/// `definitions` map for callers that need aliases or confidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DefinitionEntry {
    pub term: String,
    pub definition: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub source: String,
}

/// Parser configuration, usually supplied by a domain plugin.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentParserConfig {
    /// Line-anchored regex matching the start of a clause heading.
    pub clause_pattern: String,
    #[serde(default)]
    pub chapter_pattern: Option<String>,
    /// Clause id of the definitions/interpretation section, when known.
    #[serde(default)]
    pub definitions_section_id: Option<String>,
    pub max_depth: usize,
    pub structure_type: String,
    /// Additional domain-specific cross-reference regexes.
    #[serde(default)]
    pub cross_reference_patterns: Vec<String>,
}

impl Default for DocumentParserConfig {
    fn default() -> Self {
        Self {
            clause_pattern: r"^\d+(?:\.\d+)*\s+".to_string(),
            chapter_pattern: None,
            definitions_section_id: None,
            max_depth: 4,
            structure_type: "generic_numbered".to_string(),
            cross_reference_patterns: Vec::new(),
        }
    }
}

/// Parsed document: clause forest plus the indexes derived from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DocumentStructure {
    pub document_id: String,
    pub structure_type: String,
    pub total_clauses: usize,
    pub clauses: Vec<ClauseNode>,
    #[serde(default)]
    pub definitions: BTreeMap<String, String>,
    #[serde(default)]
    pub definitions_v2: Vec<DefinitionEntry>,
    #[serde(default)]
    pub cross_references: Vec<CrossReference>,
}

impl DocumentStructure {
    /// Finds a clause by exact id anywhere in the forest.
    pub fn find_clause(&self, clause_id: &str) -> Option<&ClauseNode> {
        find_in(&self.clauses, clause_id)
    }

    /// Full context text of a clause: its own text followed by all
    /// descendants, in document order.
    pub fn clause_context(&self, clause_id: &str) -> Option<String> {
        self.find_clause(clause_id).map(collect_text)
    }

    /// Text of the clause matching `clause_id`.
    ///
    /// Falls back to a prefix match on numbering when there is no exact hit:
    /// asking for `14.2` returns the first `14.2.x` clause (and vice versa).
    /// Callers expecting strict lookup should use [`Self::find_clause`].
    pub fn clause_text(&self, clause_id: &str) -> String {
        search_text(&self.clauses, clause_id)
    }

    /// All clause ids in the forest, in document order.
    pub fn all_clause_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        collect_ids(&self.clauses, &mut ids);
        ids
    }
}

fn find_in<'a>(nodes: &'a [ClauseNode], clause_id: &str) -> Option<&'a ClauseNode> {
    for node in nodes {
        if node.clause_id == clause_id {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, clause_id) {
            return Some(found);
        }
    }
    None
}

fn collect_text(node: &ClauseNode) -> String {
    let mut parts = vec![node.text.clone()];
    for child in &node.children {
        parts.push(collect_text(child));
    }
    parts.join("\n")
}

fn collect_ids(nodes: &[ClauseNode], out: &mut Vec<String>) {
    for node in nodes {
        out.push(node.clause_id.clone());
        collect_ids(&node.children, out);
    }
}

fn search_text(nodes: &[ClauseNode], target_id: &str) -> String {
    for node in nodes {
        if node.clause_id == target_id {
            return node.text.clone();
        }
        if !node.children.is_empty() {
            let found = search_text(&node.children, target_id);
            if !found.is_empty() {
                return found;
            }
        }
        // Prefix tolerance for numbering mismatches (14.2 vs 14.2.1).
        if !node.clause_id.is_empty()
            && !target_id.is_empty()
            && (node.clause_id.starts_with(&format!("{target_id}."))
                || target_id.starts_with(&format!("{}.", node.clause_id)))
            && !node.text.is_empty()
        {
            return node.text.clone();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str, text: &str) -> ClauseNode {
        ClauseNode {
            clause_id: id.to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn sample() -> DocumentStructure {
        let mut parent = leaf("14.2", "14.2 Advance Payment");
        parent.children = vec![leaf("14.2.1", "14.2.1 The advance shall be repaid")];
        DocumentStructure {
            document_id: "doc-1".to_string(),
            structure_type: "generic_numbered".to_string(),
            total_clauses: 3,
            clauses: vec![leaf("1", "1 Definitions"), parent],
            ..Default::default()
        }
    }

    #[test]
    fn finds_nested_clause() {
        let doc = sample();
        assert!(doc.find_clause("14.2.1").is_some());
        assert!(doc.find_clause("99").is_none());
    }

    #[test]
    fn context_includes_descendants() {
        let doc = sample();
        let ctx = doc.clause_context("14.2").unwrap();
        assert!(ctx.contains("Advance Payment"));
        assert!(ctx.contains("shall be repaid"));
    }

    #[test]
    fn clause_text_prefix_match() {
        let mut doc = sample();
        // Remove the exact 14.2 text so only the child can answer.
        doc.clauses[1].text = String::new();
        let text = doc.clause_text("14.2");
        assert!(text.contains("14.2.1"));
    }

    #[test]
    fn all_ids_in_document_order() {
        let doc = sample();
        assert_eq!(doc.all_clause_ids(), vec!["1", "14.2", "14.2.1"]);
    }
}
