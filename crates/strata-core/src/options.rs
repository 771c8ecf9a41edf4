use crate::pattern::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Size ceilings used by the pattern detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionThresholds {
    /// States at or below this count are rendered up front.
    #[serde(default = "default_max_prerendered_states")]
    pub max_prerendered_states: usize,
    /// Datasets at or below this size are filtered in memory.
    #[serde(default = "default_max_client_items")]
    pub max_client_items: usize,
    /// States combined with more items than this switch to filterable-states.
    #[serde(default = "default_max_stateful_items")]
    pub max_stateful_items: usize,
    #[serde(default = "default_pagination_items")]
    pub pagination_items: usize,
    #[serde(default = "default_rule_grouping_rules")]
    pub rule_grouping_rules: usize,
}

fn default_max_prerendered_states() -> usize {
    10
}

fn default_max_client_items() -> usize {
    50
}

fn default_max_stateful_items() -> usize {
    100
}

fn default_pagination_items() -> usize {
    500
}

fn default_rule_grouping_rules() -> usize {
    20
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            max_prerendered_states: default_max_prerendered_states(),
            max_client_items: default_max_client_items(),
            max_stateful_items: default_max_stateful_items(),
            pagination_items: default_pagination_items(),
            rule_grouping_rules: default_rule_grouping_rules(),
        }
    }
}

/// An external script the runtime loads before (or alongside) initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalScript {
    pub src: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "async")]
    pub async_load: bool,
    #[serde(default)]
    pub defer: bool,
    /// Code run with `context = {src}` once the script has loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_load: Option<String>,
}

impl ExternalScript {
    pub fn required(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            required: true,
            async_load: false,
            defer: false,
            on_load: None,
        }
    }

    pub fn optional(src: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(src)
        }
    }
}

/// Caller supplied code snippets bound to lifecycle points.
///
/// Each snippet is the body of an async function taking `context`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hooks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_init: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_init: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_state_change: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_state_change: Option<String>,
    /// Run when the keyed state becomes active.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub state_hooks: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_destroy: Option<String>,
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.before_init.is_none()
            && self.after_init.is_none()
            && self.before_state_change.is_none()
            && self.after_state_change.is_none()
            && self.state_hooks.is_empty()
            && self.after_filter.is_none()
            && self.on_destroy.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicOptions {
    #[serde(default)]
    pub thresholds: DetectionThresholds,
    /// Used when `force_pattern` names no known pattern.
    #[serde(default)]
    pub fallback_pattern: Pattern,
    #[serde(default)]
    pub force_pattern: Option<String>,
    #[serde(default, rename = "minifyJS", alias = "minifyJs")]
    pub minify_js: bool,
    #[serde(default)]
    pub external_scripts: Vec<ExternalScript>,
    #[serde(default)]
    pub external_registry: Vec<String>,
    #[serde(default)]
    pub hooks: Hooks,
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, String>,
}

impl Default for DynamicOptions {
    fn default() -> Self {
        Self {
            thresholds: DetectionThresholds::default(),
            fallback_pattern: Pattern::Empty,
            force_pattern: None,
            minify_js: false,
            external_scripts: Vec::new(),
            external_registry: Vec::new(),
            hooks: Hooks::default(),
            custom_attributes: BTreeMap::new(),
        }
    }
}

/// Partial options layered over a spec's own, e.g. from a
/// `strata.config.json` sitting next to component files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsOverride {
    #[serde(default, rename = "minifyJS", alias = "minifyJs")]
    pub minify_js: Option<bool>,
    pub thresholds: Option<DetectionThresholds>,
    pub fallback_pattern: Option<Pattern>,
    pub external_registry: Option<Vec<String>>,
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, String>,
}

impl OptionsOverride {
    pub fn apply(&self, options: &mut DynamicOptions) {
        if let Some(minify) = self.minify_js {
            options.minify_js = minify;
        }
        if let Some(thresholds) = self.thresholds {
            options.thresholds = thresholds;
        }
        if let Some(fallback) = self.fallback_pattern {
            options.fallback_pattern = fallback;
        }
        if let Some(registry) = &self.external_registry {
            for name in registry {
                if !options.external_registry.contains(name) {
                    options.external_registry.push(name.clone());
                }
            }
        }
        for (key, value) in &self.custom_attributes {
            options
                .custom_attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_object() {
        let options: DynamicOptions = serde_json::from_value(json!({})).expect("defaults");
        assert_eq!(options.thresholds.max_prerendered_states, 10);
        assert_eq!(options.thresholds.max_client_items, 50);
        assert_eq!(options.thresholds.max_stateful_items, 100);
        assert_eq!(options.fallback_pattern, Pattern::Empty);
        assert!(!options.minify_js);
        assert!(options.hooks.is_empty());
    }

    #[test]
    fn test_camel_case_keys() {
        let options: DynamicOptions = serde_json::from_value(json!({
            "minifyJS": true,
            "externalScripts": [{"src": "/map.js", "required": true, "async": true}],
            "hooks": {"beforeStateChange": "return false;", "stateHooks": {"b": "x()"}}
        }))
        .expect("parse");
        assert!(options.minify_js);
        assert!(options.external_scripts[0].async_load);
        assert_eq!(
            options.hooks.before_state_change.as_deref(),
            Some("return false;")
        );
        assert_eq!(options.hooks.state_hooks.len(), 1);
    }

    #[test]
    fn test_override_keeps_spec_attributes() {
        let mut options = DynamicOptions::default();
        options
            .custom_attributes
            .insert("data-owner".to_string(), "spec".to_string());
        let ovr: OptionsOverride = serde_json::from_value(json!({
            "minifyJS": true,
            "customAttributes": {"data-owner": "dir", "data-env": "dev"}
        }))
        .expect("parse");
        ovr.apply(&mut options);
        assert!(options.minify_js);
        assert_eq!(options.custom_attributes["data-owner"], "spec");
        assert_eq!(options.custom_attributes["data-env"], "dev");
    }
}
