//! `cross_reference_check` — validate the references leaving a clause.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use contract_model::DocumentStructure;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CrossReferenceCheckInput {
    pub clause_id: String,
    #[serde(default)]
    pub document_structure: DocumentStructure,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReferenceEntry {
    pub target_clause_id: String,
    pub reference_text: String,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CrossReferenceCheckOutput {
    pub clause_id: String,
    #[serde(default)]
    pub references: Vec<ReferenceEntry>,
    #[serde(default)]
    pub invalid_references: Vec<ReferenceEntry>,
    pub total_references: usize,
    pub total_invalid: usize,
}

pub fn cross_reference_check(input: CrossReferenceCheckInput) -> CrossReferenceCheckOutput {
    let mut references = Vec::new();
    let mut invalid = Vec::new();

    for reference in &input.document_structure.cross_references {
        if reference.source_clause_id != input.clause_id {
            continue;
        }
        let entry = ReferenceEntry {
            target_clause_id: reference.target_clause_id.clone(),
            reference_text: reference.reference_text.clone(),
            is_valid: reference.is_valid,
        };
        if !entry.is_valid {
            invalid.push(entry.clone());
        }
        references.push(entry);
    }

    CrossReferenceCheckOutput {
        clause_id: input.clause_id,
        total_references: references.len(),
        total_invalid: invalid.len(),
        references,
        invalid_references: invalid,
    }
}

pub fn prepare_input(clause_id: &str, structure: &DocumentStructure) -> CrossReferenceCheckInput {
    CrossReferenceCheckInput {
        clause_id: clause_id.to_string(),
        document_structure: structure.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_model::StructureParser;

    #[test]
    fn counts_invalid_targets() {
        let text = "1 Scope, see Clause 2 and Clause 99.\n2 Term\n";
        let doc = StructureParser::generic().parse(text, "d");
        let out = cross_reference_check(prepare_input("1", &doc));
        assert_eq!(out.total_references, 2);
        assert_eq!(out.total_invalid, 1);
        assert_eq!(out.invalid_references[0].target_clause_id, "99");
    }

    #[test]
    fn clause_without_references_is_empty() {
        let doc = StructureParser::generic().parse("1 Scope\n2 Term\n", "d");
        let out = cross_reference_check(prepare_input("2", &doc));
        assert_eq!(out.total_references, 0);
    }
}
