//! Regex tables for definition and cross-reference extraction.
//!
//! Patterns cover English and Chinese drafting conventions. Each table is
//! compiled once; a pattern that fails to compile is skipped with a warning
//! instead of breaking parsing.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::document::DefinitionEntry;

/// One definition-extraction pattern.
pub struct DefinitionPattern {
    pub name: &'static str,
    pub regex: &'static str,
    pub term_group: usize,
    pub definition_group: usize,
    pub category: &'static str,
}

const DEFINITION_PATTERNS: &[DefinitionPattern] = &[
    DefinitionPattern {
        name: "en_means",
        regex: r#""([^"]+)"\s+means?\s+([^\n]+)"#,
        term_group: 1,
        definition_group: 2,
        category: "",
    },
    DefinitionPattern {
        name: "en_shall_mean",
        regex: r#""([^"]+)"\s+shall\s+mean\s+([^\n]+)"#,
        term_group: 1,
        definition_group: 2,
        category: "",
    },
    DefinitionPattern {
        name: "en_refers_to",
        regex: r#""([^"]+)"\s+refers?\s+to\s+([^\n]+)"#,
        term_group: 1,
        definition_group: 2,
        category: "",
    },
    DefinitionPattern {
        name: "en_is_defined_as",
        regex: r#""([^"]+)"\s+is\s+defined\s+as\s+([^\n]+)"#,
        term_group: 1,
        definition_group: 2,
        category: "",
    },
    DefinitionPattern {
        name: "en_hereinafter",
        regex: r#"([^\n(]{2,80})\(hereinafter\s+(?:referred\s+to\s+as\s+)?"([^"]+)"\)"#,
        term_group: 2,
        definition_group: 1,
        category: "party",
    },
    DefinitionPattern {
        name: "zh_zhi",
        regex: r#"["“]([^”"]+)["”]\s*(?:指|是指|系指)\s*([^\n]+)"#,
        term_group: 1,
        definition_group: 2,
        category: "",
    },
    DefinitionPattern {
        name: "zh_colon",
        regex: r#"["“]([^”"]+)["”]\s*[：:]\s*([^\n]+)"#,
        term_group: 1,
        definition_group: 2,
        category: "",
    },
    DefinitionPattern {
        name: "zh_inline_party",
        regex: r#"([^\n（(]{2,80})[（(]\s*以下简称\s*["“]([^”"]+)["”]\s*[)）]"#,
        term_group: 2,
        definition_group: 1,
        category: "party",
    },
];

/// One cross-reference pattern; group 1 captures the target id.
pub struct CrossRefPattern {
    pub name: &'static str,
    pub regex: &'static str,
    pub reference_type: &'static str,
}

const CROSS_REF_PATTERNS: &[CrossRefPattern] = &[
    CrossRefPattern {
        name: "en_clause",
        regex: r"[Cc]lause\s+(\d+(?:\.\d+)*)",
        reference_type: "clause",
    },
    CrossRefPattern {
        name: "en_sub_clause",
        regex: r"[Ss]ub-[Cc]lause\s+(\d+(?:\.\d+)*)",
        reference_type: "clause",
    },
    CrossRefPattern {
        name: "en_article",
        regex: r"[Aa]rticle\s+(\d+(?:\.\d+)*)",
        reference_type: "article",
    },
    CrossRefPattern {
        name: "en_section",
        regex: r"[Ss]ection\s+(\d+(?:\.\d+)*)",
        reference_type: "section",
    },
    CrossRefPattern {
        name: "en_paragraph",
        regex: r"[Pp]aragraph\s+(\d+(?:\.\d+)*)",
        reference_type: "paragraph",
    },
    CrossRefPattern {
        name: "en_appendix",
        regex: r"[Aa]ppendix\s+([A-Z\d]+)",
        reference_type: "appendix",
    },
    CrossRefPattern {
        name: "en_schedule",
        regex: r"[Ss]chedule\s+([A-Z\d]+)",
        reference_type: "schedule",
    },
    CrossRefPattern {
        name: "en_annex",
        regex: r"[Aa]nnex\s+([A-Z\d]+)",
        reference_type: "annex",
    },
    CrossRefPattern {
        name: "zh_di_tiao",
        regex: r"第\s*(\d+(?:\.\d+)*)\s*条",
        reference_type: "clause",
    },
    CrossRefPattern {
        name: "zh_see_ref",
        regex: r"(?:见|参见|依据|根据|按照|依照)\s*第?\s*(\d+(?:\.\d+)*)\s*条",
        reference_type: "clause",
    },
];

fn compile_table<T>(
    table: &'static [T],
    pattern_of: fn(&T) -> &'static str,
    name_of: fn(&T) -> &'static str,
) -> Vec<(&'static T, Regex)> {
    table
        .iter()
        .filter_map(|entry| match Regex::new(pattern_of(entry)) {
            Ok(re) => Some((entry, re)),
            Err(err) => {
                warn!(pattern = name_of(entry), %err, "skipping uncompilable pattern");
                None
            }
        })
        .collect()
}

static COMPILED_DEFINITIONS: LazyLock<Vec<(&'static DefinitionPattern, Regex)>> =
    LazyLock::new(|| compile_table(DEFINITION_PATTERNS, |p| p.regex, |p| p.name));

static COMPILED_CROSS_REFS: LazyLock<Vec<(&'static CrossRefPattern, Regex)>> =
    LazyLock::new(|| compile_table(CROSS_REF_PATTERNS, |p| p.regex, |p| p.name));

/// Compiled cross-reference patterns, ready for scanning clause text.
pub fn cross_ref_patterns() -> &'static [(&'static CrossRefPattern, Regex)] {
    &COMPILED_CROSS_REFS
}

fn normalize_term(term: &str) -> String {
    term.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '“' || c == '”')
        .to_lowercase()
}

/// Extracts definitions from a definitions-section text.
///
/// The first pattern to claim a term wins; later matches for the same
/// normalized term are dropped.
pub fn extract_definitions(text: &str) -> Vec<DefinitionEntry> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut seen: Vec<String> = Vec::new();
    let mut entries = Vec::new();
    for (pattern, re) in COMPILED_DEFINITIONS.iter() {
        for caps in re.captures_iter(text) {
            let term = caps
                .get(pattern.term_group)
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            let definition = caps
                .get(pattern.definition_group)
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            if term.is_empty() || definition.is_empty() {
                continue;
            }
            let key = normalize_term(term);
            if key.is_empty() || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            entries.push(DefinitionEntry {
                term: term.to_string(),
                definition: definition.to_string(),
                aliases: Vec::new(),
                category: pattern.category.to_string(),
                confidence: 1.0,
                source: pattern.name.to_string(),
            });
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_en_means_definition() {
        let text = "\"Contract Price\" means the amount stated in the Letter of Acceptance.\n\"Employer\" means the party named as employer.";
        let defs = extract_definitions(text);
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].term, "Contract Price");
        assert!(defs[0].definition.contains("Letter of Acceptance"));
    }

    #[test]
    fn first_pattern_wins_per_term() {
        let text = "\"Works\" means the permanent works.\n\"Works\" shall mean something else.";
        let defs = extract_definitions(text);
        assert_eq!(defs.len(), 1);
        assert!(defs[0].definition.contains("permanent works"));
    }

    #[test]
    fn cross_ref_patterns_compile() {
        assert!(!cross_ref_patterns().is_empty());
    }
}
