//! The embedded configuration payload.
//!
//! Everything the runtime needs that is not visible in the markup travels
//! in one `<script type="application/json">` block per component, placed
//! right after the component root.

use crate::html::{Tag, escape_html};
use crate::theme::Theme;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use strata_core::rules::RuleIndex;
use strata_core::{
    Component, DatasetOptions, DependencyRule, ExternalScript, FilterableField, Hooks,
    Optimization, Pattern, Record, TriggerCondition,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig<'a> {
    pub id: &'a str,
    pub pattern: Pattern,
    pub flags: Flags,
    pub optimizations: &'a [Optimization],
    pub server_mode: bool,
    pub theme: BTreeMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<StateMeta<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DataConfig<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<DependencyRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooks: Option<&'a Hooks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_scripts: Option<&'a [ExternalScript]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_registry: Option<&'a [String]>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Flags {
    pub has_states: bool,
    pub has_data: bool,
    pub has_rules: bool,
    pub has_renderer: bool,
}

/// State metadata; content stays in the markup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMeta<'a> {
    pub id: &'a str,
    pub label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<&'a TriggerCondition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConfig<'a> {
    pub schema: Vec<FilterableField>,
    pub options: &'a DatasetOptions,
    pub total: usize,
    /// Omitted in server mode, where rows are already in the markup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<&'a [Record]>,
}

/// Whether rows are pre-rendered and filtered in place.
pub fn server_mode(component: &Component) -> bool {
    component.data().is_some_and(|d| d.options.server_rendered)
        || component.detected().primary_pattern == Pattern::ServerFilterable
}

pub fn build<'a>(component: &'a Component, theme: &'a Theme) -> ComponentConfig<'a> {
    let detected = component.detected();
    let server = server_mode(component);
    let pattern = detected.primary_pattern;

    let states = if pattern.uses_states() {
        component
            .states()
            .iter()
            .map(|s| StateMeta {
                id: &s.id,
                label: s.display_label(),
                icon: s.icon.as_deref(),
                disabled: s.disabled,
                condition: s.condition.as_ref(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let data = component.data().filter(|_| pattern.uses_data()).map(|d| DataConfig {
        schema: d.effective_schema(),
        options: &d.options,
        total: d.len(),
        items: (!server).then_some(d.items.as_slice()),
    });

    let rules = if pattern.uses_rules() {
        RuleIndex::new(component.rules())
            .ordered()
            .into_iter()
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    let options = component.options();

    ComponentConfig {
        id: component.id(),
        pattern,
        flags: Flags {
            has_states: detected.has_states,
            has_data: detected.has_data,
            has_rules: detected.has_rules,
            has_renderer: detected.has_renderer,
        },
        optimizations: &detected.optimizations,
        server_mode: server,
        theme: theme
            .classes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect(),
        initial_state: pattern
            .uses_states()
            .then(|| component.initial_state().map(|s| s.id.as_str()))
            .flatten(),
        states,
        data,
        rules,
        hooks: Some(&options.hooks).filter(|h| !h.is_empty()),
        external_scripts: Some(options.external_scripts.as_slice()).filter(|s| !s.is_empty()),
        external_registry: Some(options.external_registry.as_slice()).filter(|s| !s.is_empty()),
    }
}

/// Makes serialized JSON safe inside a `<script>` element.
pub fn escape_script_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

pub fn to_json(component: &Component, theme: &Theme) -> Result<String, serde_json::Error> {
    serde_json::to_string(&build(component, theme))
}

/// The complete `<script type="application/json">` block.
pub fn render(component: &Component, theme: &Theme) -> Result<String, serde_json::Error> {
    let json = escape_script_json(&to_json(component, theme)?);
    Ok(Tag::new("script")
        .attr("type", "application/json")
        .attr("id", format!("{}-config", component.id()))
        .flag("data-strata-config")
        .html(&json)
        .render())
}

/// Reads a payload back out of rendered markup; used by tests and the CLI.
pub fn extract(html: &str, component_id: &str) -> Option<Value> {
    let marker = format!("id=\"{}-config\"", escape_html(component_id));
    let start = html.find(&marker)?;
    let open_end = start + html[start..].find('>')? + 1;
    let close = open_end + html[open_end..].find("</script>")?;
    serde_json::from_str(&html[open_end..close]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::{
        ComponentInput, ComponentState, ConditionOperator, DynamicOptions, FilterableDataset,
    };

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_escaped_payload_cannot_close_script() {
        let states = vec![
            ComponentState::new("a", "</script><script>alert(1)</script>"),
            ComponentState::new("b", "line\u{2028}sep & more"),
        ];
        let component = Component::new(
            "x",
            ComponentInput::StatesOnly(states),
            DynamicOptions::default(),
        )
        .unwrap();
        let block = render(&component, &Theme::default()).unwrap();
        assert_eq!(block.matches("</script>").count(), 1);
        assert!(!block.contains('\u{2028}'));

        let parsed = extract(&block, "x").unwrap();
        assert_eq!(parsed["states"][0]["label"], "</script><script>alert(1)</script>");
        assert_eq!(parsed["states"][1]["label"], "line\u{2028}sep & more");
    }

    #[test]
    fn test_server_mode_omits_items() {
        let items: Vec<Record> = (0..60).map(|i| record(json!({"n": i}))).collect();
        let component = Component::new(
            "big",
            ComponentInput::DataOnly(FilterableDataset::new(items)),
            DynamicOptions::default(),
        )
        .unwrap();
        let json: Value = serde_json::from_str(&to_json(&component, &Theme::default()).unwrap()).unwrap();
        assert_eq!(json["pattern"], "server-filterable");
        assert_eq!(json["serverMode"], true);
        assert_eq!(json["data"]["total"], 60);
        assert!(json["data"].get("items").is_none());
    }

    #[test]
    fn test_hooks_omitted_when_empty() {
        let component = Component::new(
            "t",
            ComponentInput::StatesOnly(vec![ComponentState::new("a", "A")]),
            DynamicOptions::default(),
        )
        .unwrap();
        let json: Value = serde_json::from_str(&to_json(&component, &Theme::default()).unwrap()).unwrap();
        assert!(json.get("hooks").is_none());
        assert!(json.get("externalScripts").is_none());
        assert_eq!(json["initialState"], "a");

        let mut options = DynamicOptions::default();
        options.hooks.after_init = Some("console.log(context)".into());
        let component = Component::new(
            "t",
            ComponentInput::StatesOnly(vec![ComponentState::new("a", "A")]),
            options,
        )
        .unwrap();
        let json: Value = serde_json::from_str(&to_json(&component, &Theme::default()).unwrap()).unwrap();
        assert_eq!(json["hooks"]["afterInit"], "console.log(context)");
    }

    #[test]
    fn test_rules_serialized_in_evaluation_order() {
        let rules = vec![
            strata_core::DependencyRule::show_when("t", ConditionOperator::Equals, "x", "a"),
            strata_core::DependencyRule::show_when("t", ConditionOperator::Equals, "y", "b")
                .with_priority(5),
        ];
        let component = Component::new("f", ComponentInput::RulesOnly(rules), DynamicOptions::default())
            .unwrap();
        let json: Value = serde_json::from_str(&to_json(&component, &Theme::default()).unwrap()).unwrap();
        assert_eq!(json["rules"][0]["id"], "show-b-when-t");
        assert_eq!(json["rules"][1]["id"], "show-a-when-t");
    }
}
