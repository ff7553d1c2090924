//! `get_clause_context` — extract a clause's full text from the document.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use contract_model::DocumentStructure;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClauseContextInput {
    /// Dotted clause id, e.g. `14.2`.
    pub clause_id: String,
    #[serde(default)]
    pub document_structure: DocumentStructure,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClauseContextOutput {
    pub clause_id: String,
    pub found: bool,
    #[serde(default)]
    pub context_text: String,
    #[serde(default)]
    pub title: String,
}

pub fn get_clause_context(input: ClauseContextInput) -> ClauseContextOutput {
    match input.document_structure.clause_context(&input.clause_id) {
        Some(context_text) => {
            let title = input
                .document_structure
                .find_clause(&input.clause_id)
                .map(|n| n.title.clone())
                .unwrap_or_default();
            ClauseContextOutput {
                clause_id: input.clause_id,
                found: true,
                context_text,
                title,
            }
        }
        None => ClauseContextOutput {
            clause_id: input.clause_id,
            found: false,
            ..Default::default()
        },
    }
}

pub fn prepare_input(clause_id: &str, structure: &DocumentStructure) -> ClauseContextInput {
    ClauseContextInput {
        clause_id: clause_id.to_string(),
        document_structure: structure.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_model::StructureParser;

    #[test]
    fn returns_context_with_children() {
        let doc = StructureParser::generic().parse("3 Termination\n3.1 Notice period\n", "d");
        let out = get_clause_context(prepare_input("3", &doc));
        assert!(out.found);
        assert!(out.context_text.contains("Notice period"));
    }

    #[test]
    fn missing_clause_reports_not_found() {
        let doc = StructureParser::generic().parse("1 Scope\n", "d");
        let out = get_clause_context(prepare_input("9", &doc));
        assert!(!out.found);
        assert!(out.context_text.is_empty());
    }
}
