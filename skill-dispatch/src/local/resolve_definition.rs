//! `resolve_definition` — look up defined terms referenced by a clause.
//!
//! When the caller supplies no terms, quoted phrases are pulled from the
//! clause text itself.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use contract_model::DocumentStructure;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ResolveDefinitionInput {
    pub clause_id: String,
    #[serde(default)]
    pub document_structure: DocumentStructure,
    /// Terms to resolve; extracted from quoted text in the clause when empty.
    #[serde(default)]
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ResolveDefinitionOutput {
    pub clause_id: String,
    #[serde(default)]
    pub definitions_found: BTreeMap<String, String>,
    #[serde(default)]
    pub terms_not_found: Vec<String>,
}

static QUOTED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r#""([^"]+)""#, r"'([^']+)'", r"“([^”]+)”"]
        .iter()
        .map(|p| Regex::new(p).expect("quoted-term patterns compile"))
        .collect()
});

fn normalize_term(term: &str) -> String {
    term.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '“' || c == '”')
        .to_lowercase()
}

fn extract_quoted_terms(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    let mut terms = Vec::new();
    for re in QUOTED.iter() {
        for caps in re.captures_iter(text) {
            let term = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let key = normalize_term(term);
            if term.is_empty() || key.is_empty() || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            terms.push(term.to_string());
        }
    }
    terms
}

fn find_term(term: &str, definitions: &BTreeMap<String, String>) -> Option<String> {
    if let Some(exact) = definitions.get(term) {
        return Some(exact.clone());
    }
    let target = normalize_term(term);
    definitions
        .iter()
        .find(|(key, _)| normalize_term(key) == target)
        .map(|(_, value)| value.clone())
}

pub fn resolve_definition(input: ResolveDefinitionInput) -> ResolveDefinitionOutput {
    let terms = if input.terms.is_empty() {
        extract_quoted_terms(&input.document_structure.clause_text(&input.clause_id))
    } else {
        input.terms.clone()
    };

    let mut found = BTreeMap::new();
    let mut not_found = Vec::new();
    for term in terms {
        match find_term(&term, &input.document_structure.definitions) {
            Some(definition) => {
                found.insert(term, definition);
            }
            None => not_found.push(term),
        }
    }

    ResolveDefinitionOutput {
        clause_id: input.clause_id,
        definitions_found: found,
        terms_not_found: not_found,
    }
}

pub fn prepare_input(clause_id: &str, structure: &DocumentStructure) -> ResolveDefinitionInput {
    ResolveDefinitionInput {
        clause_id: clause_id.to_string(),
        document_structure: structure.clone(),
        terms: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_definitions() -> DocumentStructure {
        let mut doc = DocumentStructure::default();
        doc.definitions
            .insert("Contract Price".to_string(), "the accepted amount".to_string());
        doc.clauses = vec![contract_model::ClauseNode {
            clause_id: "2".to_string(),
            text: "2 The \"Contract Price\" and the \"Unknown Term\" apply.".to_string(),
            ..Default::default()
        }];
        doc
    }

    #[test]
    fn resolves_quoted_terms_from_clause_text() {
        let out = resolve_definition(prepare_input("2", &doc_with_definitions()));
        assert_eq!(
            out.definitions_found.get("Contract Price").map(String::as_str),
            Some("the accepted amount")
        );
        assert_eq!(out.terms_not_found, vec!["Unknown Term"]);
    }

    #[test]
    fn explicit_terms_bypass_extraction() {
        let mut input = prepare_input("2", &doc_with_definitions());
        input.terms = vec!["contract price".to_string()];
        let out = resolve_definition(input);
        assert_eq!(out.definitions_found.len(), 1);
    }
}
