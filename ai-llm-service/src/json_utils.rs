//! Tolerant parsing of JSON payloads out of raw model responses.
//!
//! Models asked for "JSON only" still wrap output in prose or code fences
//! often enough that every caller needs the same ladder: try the raw text,
//! then a fenced block, then the first bracketed span. Parsers here never
//! fail — an unparseable response degrades to an empty value.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```(?:json)?\s*\n?(.*?)\n?```").expect("fenced-block pattern compiles")
});
static FIRST_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("array pattern compiles"));
static FIRST_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("object pattern compiles"));

fn head_of(text: &str) -> String {
    text.chars().take(200).collect()
}

fn candidates(text: &str, bracket: &Regex) -> Vec<String> {
    let mut out = vec![text.trim().to_string()];
    if let Some(caps) = FENCED.captures(text) {
        if let Some(inner) = caps.get(1) {
            out.push(inner.as_str().trim().to_string());
        }
    }
    if let Some(m) = bracket.find(text) {
        out.push(m.as_str().trim().to_string());
    }
    out
}

/// Extracts a JSON array of objects; anything unparseable yields `[]`.
pub fn parse_json_array(text: &str) -> Vec<Map<String, Value>> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    for candidate in candidates(text, &FIRST_ARRAY) {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&candidate) {
            return items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
        }
    }
    warn!(
        head = %head_of(text),
        "unable to parse JSON array from LLM response"
    );
    Vec::new()
}

/// Extracts a JSON object; anything unparseable yields `{}`.
pub fn parse_json_object(text: &str) -> Map<String, Value> {
    if text.trim().is_empty() {
        return Map::new();
    }
    for candidate in candidates(text, &FIRST_OBJECT) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&candidate) {
            return map;
        }
    }
    warn!(
        head = %head_of(text),
        "unable to parse JSON object from LLM response"
    );
    Map::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_raw_array() {
        let rows = parse_json_array(r#"[{"risk_level":"high"}]"#);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["risk_level"], "high");
    }

    #[test]
    fn parses_fenced_object() {
        let obj = parse_json_object("Sure!\n```json\n{\"result\": \"pass\"}\n```\nDone.");
        assert_eq!(obj["result"], "pass");
    }

    #[test]
    fn parses_first_bracketed_span() {
        let rows = parse_json_array("the risks are: [{\"a\":1}] as shown");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn garbage_degrades_to_empty() {
        assert!(parse_json_array("no json here").is_empty());
        assert!(parse_json_object("").is_empty());
        // Non-object array members are dropped.
        assert!(parse_json_array("[1, 2, 3]").is_empty());
    }
}
