//! Process-wide domain plugin registry.
//!
//! A domain plugin carries the interfaces the review core consumes for one
//! contract family: the review checklist, baseline texts keyed by clause id,
//! and the parser config matching the family's numbering conventions.
//! Registration happens at startup; lookups are read-mostly.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::DocumentParserConfig;
use crate::review::ReviewChecklistItem;

/// One registered contract domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainPlugin {
    pub domain_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub supported_subtypes: Vec<String>,
    #[serde(default)]
    pub review_checklist: Vec<ReviewChecklistItem>,
    #[serde(default)]
    pub parser_config: Option<DocumentParserConfig>,
    /// Reference wording per clause id, used by comparison skills.
    #[serde(default)]
    pub baseline_texts: HashMap<String, String>,
}

static REGISTRY: LazyLock<RwLock<HashMap<String, DomainPlugin>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Registers a plugin, overwriting (with a warning) any existing entry.
pub fn register_domain_plugin(plugin: DomainPlugin) {
    let mut registry = REGISTRY.write().expect("plugin registry poisoned");
    if registry.contains_key(&plugin.domain_id) {
        warn!(domain_id = %plugin.domain_id, "domain plugin re-registered, overwriting");
    }
    info!(domain_id = %plugin.domain_id, name = %plugin.name, "domain plugin registered");
    registry.insert(plugin.domain_id.clone(), plugin);
}

pub fn get_domain_plugin(domain_id: &str) -> Option<DomainPlugin> {
    REGISTRY
        .read()
        .expect("plugin registry poisoned")
        .get(domain_id)
        .cloned()
}

pub fn list_domain_plugins() -> Vec<DomainPlugin> {
    let mut plugins: Vec<_> = REGISTRY
        .read()
        .expect("plugin registry poisoned")
        .values()
        .cloned()
        .collect();
    plugins.sort_by(|a, b| a.domain_id.cmp(&b.domain_id));
    plugins
}

/// Checklist for a domain; empty when the domain is unknown. The subtype is
/// accepted for forward compatibility but does not narrow the list yet.
pub fn get_review_checklist(domain_id: &str, _subtype: Option<&str>) -> Vec<ReviewChecklistItem> {
    get_domain_plugin(domain_id)
        .map(|p| p.review_checklist)
        .unwrap_or_default()
}

pub fn get_baseline_text(domain_id: &str, clause_id: &str) -> Option<String> {
    get_domain_plugin(domain_id)?.baseline_texts.get(clause_id).cloned()
}

pub fn get_parser_config(domain_id: &str) -> DocumentParserConfig {
    get_domain_plugin(domain_id)
        .and_then(|p| p.parser_config)
        .unwrap_or_default()
}

/// Removes every registered plugin. Test hook.
pub fn clear_domain_plugins() {
    REGISTRY.write().expect("plugin registry poisoned").clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(id: &str) -> DomainPlugin {
        DomainPlugin {
            domain_id: id.to_string(),
            name: format!("{id} plugin"),
            baseline_texts: HashMap::from([(
                "14.2".to_string(),
                "baseline wording".to_string(),
            )]),
            ..Default::default()
        }
    }

    #[test]
    fn register_and_lookup() {
        clear_domain_plugins();
        register_domain_plugin(plugin("fidic"));
        assert!(get_domain_plugin("fidic").is_some());
        assert_eq!(
            get_baseline_text("fidic", "14.2").as_deref(),
            Some("baseline wording")
        );
        assert!(get_baseline_text("fidic", "1.1").is_none());
        assert!(get_domain_plugin("unknown").is_none());
        clear_domain_plugins();
    }
}
