//! Regex-based contract structure parser.
//!
//! Splits raw text into clauses on a line-anchored numbering pattern, builds
//! the nesting tree from dotted-id depth, then derives definitions and cross
//! references from the tree.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::document::{
    ClauseNode, CrossReference, DocumentParserConfig, DocumentStructure, ReferenceSource,
};
use crate::errors::{ModelError, ModelResult};
use crate::patterns::{cross_ref_patterns, extract_definitions};

/// Candidate fallback numbering schemes, tried by match count.
const FALLBACK_PATTERNS: &[(&str, &str)] = &[
    (r"^\d+(?:\.\d+)*\s+", "generic_numbered"),
    (r"^第[一二三四五六七八九十百零]+条", "chinese_numbered"),
    (r"^第\s*\d+\s*条", "chinese_arabic_numbered"),
    (r"^(?:Article|ARTICLE)\s+\d+", "article_numbered"),
    (r"^(?:Section|SECTION)\s+\d+", "section_numbered"),
];

const MIN_FALLBACK_MATCHES: usize = 3;

/// Parses contract text into a [`DocumentStructure`].
pub struct StructureParser {
    config: DocumentParserConfig,
    clause_re: Regex,
}

impl StructureParser {
    /// Builds a parser for the given config. Fails when the clause pattern
    /// does not compile.
    pub fn new(config: DocumentParserConfig) -> ModelResult<Self> {
        let clause_re = compile_multiline(&config.clause_pattern)?;
        Ok(Self { config, clause_re })
    }

    /// Parser with the generic-numbered default config.
    pub fn generic() -> Self {
        Self::new(DocumentParserConfig::default()).expect("default clause pattern compiles")
    }

    /// Picks the fallback pattern with the highest match count for `text`,
    /// defaulting to generic numbering when nothing reaches the minimum.
    pub fn detect(text: &str) -> Self {
        let mut best = FALLBACK_PATTERNS[0];
        let mut best_count = count_matches(best.0, text);
        for candidate in &FALLBACK_PATTERNS[1..] {
            let count = count_matches(candidate.0, text);
            if count > best_count {
                best_count = count;
                best = *candidate;
            }
        }
        if best_count < MIN_FALLBACK_MATCHES {
            return Self::generic();
        }
        let config = DocumentParserConfig {
            clause_pattern: best.0.to_string(),
            structure_type: best.1.to_string(),
            ..Default::default()
        };
        debug!(
            structure_type = best.1,
            matches = best_count,
            "detected clause numbering scheme"
        );
        Self::new(config).expect("fallback patterns compile")
    }

    pub fn config(&self) -> &DocumentParserConfig {
        &self.config
    }

    /// Parses `text` into a clause tree with definitions and cross
    /// references.
    pub fn parse(&self, text: &str, document_id: &str) -> DocumentStructure {
        let raw = self.split_clauses(text);
        let clauses = self.build_tree(raw);
        let total = count_nodes(&clauses);

        let mut structure = DocumentStructure {
            document_id: document_id.to_string(),
            structure_type: self.config.structure_type.clone(),
            total_clauses: total,
            clauses,
            ..Default::default()
        };

        if let Some(section_id) = &self.config.definitions_section_id {
            if let Some(section_text) = structure.clause_context(section_id) {
                for entry in extract_definitions(&section_text) {
                    structure
                        .definitions
                        .entry(entry.term.clone())
                        .or_insert_with(|| entry.definition.clone());
                    structure.definitions_v2.push(entry);
                }
            }
        }

        structure.cross_references = extract_cross_references(&structure);
        debug!(
            document_id,
            total_clauses = total,
            definitions = structure.definitions.len(),
            cross_references = structure.cross_references.len(),
            "document parsed"
        );
        structure
    }

    /// Splits text into `(clause_id, clause_text, start_offset)` triples at
    /// every heading match. Text before the first heading is dropped; a
    /// document with no headings becomes a single clause `0`.
    fn split_clauses<'t>(&self, text: &'t str) -> Vec<(String, &'t str, usize)> {
        let matches: Vec<_> = self.clause_re.find_iter(text).collect();
        if matches.is_empty() {
            return vec![("0".to_string(), text, 0)];
        }

        let mut out = Vec::with_capacity(matches.len());
        for (i, m) in matches.iter().enumerate() {
            let clause_id = m.as_str().trim().trim_end_matches('.').to_string();
            let start = m.start();
            let end = matches
                .get(i + 1)
                .map(|next| next.start())
                .unwrap_or(text.len());
            out.push((clause_id, text[start..end].trim(), start));
        }
        out
    }

    fn build_tree(&self, raw: Vec<(String, &str, usize)>) -> Vec<ClauseNode> {
        let mut roots: Vec<ClauseNode> = Vec::new();
        // (level, index-path into the forest) for the current ancestor chain.
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for (clause_id, clause_text, start) in raw {
            let level = dotted_level(&clause_id).min(self.config.max_depth.saturating_sub(1));
            let node = ClauseNode {
                title: extract_title(clause_text, &clause_id),
                level,
                text: clause_text.to_string(),
                start_offset: start,
                end_offset: start + clause_text.len(),
                clause_id,
                children: Vec::new(),
            };

            while stack.last().is_some_and(|(l, _)| *l >= level) {
                stack.pop();
            }

            if stack.is_empty() {
                roots.push(node);
                stack.push((level, roots.len() - 1));
            } else {
                let parent = parent_mut(&mut roots, &stack);
                parent.children.push(node);
                let idx = parent.children.len() - 1;
                stack.push((level, idx));
            }
        }
        roots
    }
}

fn parent_mut<'a>(roots: &'a mut Vec<ClauseNode>, stack: &[(usize, usize)]) -> &'a mut ClauseNode {
    let mut iter = stack.iter();
    let (_, first) = iter.next().expect("stack is non-empty");
    let mut node = &mut roots[*first];
    for (_, idx) in iter {
        node = &mut node.children[*idx];
    }
    node
}

fn compile_multiline(pattern: &str) -> ModelResult<Regex> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|err| ModelError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })
}

fn count_matches(pattern: &str, text: &str) -> usize {
    compile_multiline(pattern)
        .map(|re| re.find_iter(text).count())
        .unwrap_or(0)
}

/// Dotted-component depth: `14` → 0, `14.2.1` → 2. Non-dotted ids are depth 0.
fn dotted_level(clause_id: &str) -> usize {
    clause_id.split('.').filter(|p| !p.is_empty()).count().saturating_sub(1)
}

/// First line after the clause id, kept only when it looks like a heading.
fn extract_title(clause_text: &str, clause_id: &str) -> String {
    let stripped = clause_text
        .strip_prefix(clause_id)
        .unwrap_or(clause_text)
        .trim_start_matches(['.', ' ', '\t']);
    let first_line = stripped.lines().next().unwrap_or("").trim();
    if first_line.len() > 100 {
        String::new()
    } else {
        first_line.to_string()
    }
}

fn count_nodes(nodes: &[ClauseNode]) -> usize {
    nodes
        .iter()
        .map(|n| 1 + count_nodes(&n.children))
        .sum()
}

/// Scans every clause for references to other clauses. A reference is valid
/// iff its target id exists in the tree; self references are skipped.
fn extract_cross_references(structure: &DocumentStructure) -> Vec<CrossReference> {
    let all_ids = structure.all_clause_ids();
    let mut refs = Vec::new();

    fn scan(node: &ClauseNode, all_ids: &[String], refs: &mut Vec<CrossReference>) {
        for (pattern, re) in cross_ref_patterns() {
            for caps in re.captures_iter(&node.text) {
                let Some(target) = caps.get(1) else { continue };
                let target_id = target.as_str().to_string();
                if target_id == node.clause_id {
                    continue;
                }
                refs.push(CrossReference {
                    source_clause_id: node.clause_id.clone(),
                    is_valid: all_ids.iter().any(|id| *id == target_id),
                    target_clause_id: target_id,
                    reference_text: caps.get(0).map(|m| m.as_str()).unwrap_or("").to_string(),
                    reference_type: pattern.reference_type.to_string(),
                    source: ReferenceSource::Regex,
                    confidence: 1.0,
                });
            }
        }
        for child in &node.children {
            scan(child, all_ids, refs);
        }
    }

    for node in &structure.clauses {
        scan(node, &all_ids, &mut refs);
    }
    refs
}
