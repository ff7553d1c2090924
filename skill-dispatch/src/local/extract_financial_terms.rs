//! `extract_financial_terms` — pull amounts, percentages, durations and
//! dates out of a clause.

use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use contract_model::DocumentStructure;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractFinancialTermsInput {
    pub clause_id: String,
    #[serde(default)]
    pub document_structure: DocumentStructure,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FinancialTerm {
    pub term_type: String,
    pub value: String,
    /// Up to ~30 characters of surrounding text on each side.
    pub context: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractFinancialTermsOutput {
    pub clause_id: String,
    #[serde(default)]
    pub terms: Vec<FinancialTerm>,
    pub total_terms: usize,
}

const PATTERNS: &[(&str, &str)] = &[
    (r"\d+(?:\.\d+)?\s*[%％]", "percentage"),
    (r"(?:USD|EUR|CNY|RMB|GBP|\$|€|£|¥)\s*[\d,]+(?:\.\d+)?", "amount"),
    (r"[\d,]+(?:\.\d+)?\s*(?:万元|亿元|元|美元|欧元|英镑)", "amount"),
    (
        r"\d+\s*(?:天|日|个月|月|年|days?|months?|years?|weeks?|周)",
        "duration",
    ),
    (r"\d{4}[-/年]\d{1,2}[-/月]\d{1,2}日?", "date"),
];

static COMPILED: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .map(|(pattern, term_type)| {
            (
                Regex::new(pattern).expect("financial patterns compile"),
                *term_type,
            )
        })
        .collect()
});

pub fn extract_financial_terms(input: ExtractFinancialTermsInput) -> ExtractFinancialTermsOutput {
    let clause_text = input.document_structure.clause_text(&input.clause_id);
    let mut terms = Vec::new();

    for (re, term_type) in COMPILED.iter() {
        for m in re.find_iter(&clause_text) {
            let start = clause_text[..m.start()]
                .char_indices()
                .rev()
                .nth(29)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let end = clause_text[m.end()..]
                .char_indices()
                .nth(30)
                .map(|(i, _)| m.end() + i)
                .unwrap_or(clause_text.len());
            terms.push(FinancialTerm {
                term_type: term_type.to_string(),
                value: m.as_str().trim().to_string(),
                context: clause_text[start..end].trim().to_string(),
            });
        }
    }

    ExtractFinancialTermsOutput {
        clause_id: input.clause_id,
        total_terms: terms.len(),
        terms,
    }
}

pub fn prepare_input(clause_id: &str, structure: &DocumentStructure) -> ExtractFinancialTermsInput {
    ExtractFinancialTermsInput {
        clause_id: clause_id.to_string(),
        document_structure: structure.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_model::StructureParser;

    #[test]
    fn finds_percentages_amounts_and_durations() {
        let text = "14 Payment\nAn advance of USD 1,000,000 equal to 10% is repaid within 30 days.\n";
        let doc = StructureParser::generic().parse(text, "d");
        let out = extract_financial_terms(prepare_input("14", &doc));
        let types: Vec<_> = out.terms.iter().map(|t| t.term_type.as_str()).collect();
        assert!(types.contains(&"percentage"));
        assert!(types.contains(&"amount"));
        assert!(types.contains(&"duration"));
        assert_eq!(out.total_terms, out.terms.len());
    }

    #[test]
    fn context_window_is_bounded() {
        let text = format!("14 Payment\n{} 10% {}\n", "a".repeat(200), "b".repeat(200));
        let doc = StructureParser::generic().parse(&text, "d");
        let out = extract_financial_terms(prepare_input("14", &doc));
        let pct = out.terms.iter().find(|t| t.term_type == "percentage").unwrap();
        assert!(pct.context.chars().count() <= 70);
    }
}
