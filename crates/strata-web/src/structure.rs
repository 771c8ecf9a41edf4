//! Markup generation.
//!
//! The structure is fully usable without script: every state panel exists,
//! the active one visible; filter controls are real form controls; in
//! server mode the rows are already present. The runtime only toggles
//! classes and attributes on what is rendered here.

use crate::config::server_mode;
use crate::html::{Tag, escape_html, render_content};
use crate::theme::Theme;
use serde_json::Value;
use strata_core::filter::{SEARCH_FIELD, value_text};
use strata_core::{
    Component, ComponentState, FieldType, FilterableDataset, FilterableField, Optimization,
    Pattern, Record,
};

pub fn panel_id(component: &str, state: &str) -> String {
    strata_core::runtime::panel_id(component, state)
}

pub fn tab_id(component: &str, state: &str) -> String {
    strata_core::runtime::tab_id(component, state)
}

pub fn render(component: &Component, theme: &Theme) -> String {
    let detected = component.detected();
    let pattern = detected.primary_pattern;

    let mut root = Tag::new("div")
        .attr("id", component.id())
        .class(&[theme.class("component")])
        .attr("data-pattern", pattern.as_str())
        .flag("data-strata-component");
    for (name, value) in &component.options().custom_attributes {
        if is_safe_attr(name) {
            root = root.attr(name, value);
        } else {
            tracing::warn!(attr = %name, "custom attribute skipped");
        }
    }

    if pattern.uses_states() {
        let lazy = pattern == Pattern::DynamicStates || detected.has(Optimization::LazyStateLoading);
        root = root.html(&render_states(component, theme, lazy));
    }
    if pattern.uses_data() {
        if let Some(data) = component.data() {
            root = root.html(&render_data(component, data, theme));
        }
    }
    match pattern {
        Pattern::DependencyOnly => {
            root = root.child(
                Tag::new("div")
                    .class(&[theme.class("placeholder")])
                    .attr("role", "status")
                    .attr("aria-live", "polite")
                    .flag("data-strata-status"),
            );
        }
        Pattern::Empty => {
            root = root.child(
                Tag::new("div")
                    .class(&[theme.class("placeholder")])
                    .flag("data-strata-empty"),
            );
        }
        _ => {}
    }

    tracing::debug!(component = %component.id(), pattern = %pattern, "structure generated");
    root.render()
}

fn is_safe_attr(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !lower.is_empty()
        && !lower.starts_with("on")
        && !matches!(lower.as_str(), "id" | "data-pattern" | "data-strata-component")
        && lower
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
}

fn render_states(component: &Component, theme: &Theme, lazy: bool) -> String {
    let id = component.id();
    let states = component.states();
    let active = component.initial_state().map(|s| s.id.as_str());
    let mut out = String::new();

    if states.len() > 1 {
        let tabs = states
            .iter()
            .map(|state| render_tab(id, state, active == Some(state.id.as_str()), theme));
        out.push_str(
            &Tag::new("div")
                .class(&[theme.class("nav")])
                .attr("role", "tablist")
                .children(tabs)
                .render(),
        );
    }

    for state in states {
        let is_active = active == Some(state.id.as_str());
        let content = render_content(&state.content);
        let body = if lazy && !is_active {
            Tag::new("template")
                .flag("data-lazy-state")
                .html(&content)
                .render()
        } else {
            content
        };
        let panel = Tag::new("div")
            .attr("id", panel_id(id, &state.id))
            .class(&[
                theme.class("panel"),
                if is_active { theme.class("active") } else { theme.class("hidden") },
            ])
            .attr("role", "tabpanel")
            .attr("data-state", &state.id)
            .attr_if(states.len() > 1, "aria-labelledby", tab_id(id, &state.id))
            .flag_if(!is_active, "hidden")
            .html(&body);
        out.push_str(&panel.render());
    }
    out
}

fn render_tab(component: &str, state: &ComponentState, is_active: bool, theme: &Theme) -> Tag {
    let mut tab = Tag::new("button")
        .attr("type", "button")
        .attr("id", tab_id(component, &state.id))
        .class(&[
            theme.class("tab"),
            if is_active { theme.class("active") } else { "" },
            if state.disabled { theme.class("disabled") } else { "" },
        ])
        .attr("role", "tab")
        .attr("data-client-action", "switch-state")
        .attr("data-state-target", &state.id)
        .attr("aria-selected", if is_active { "true" } else { "false" })
        .attr("aria-controls", panel_id(component, &state.id))
        .flag_if(state.disabled, "disabled");
    if let Some(icon) = &state.icon {
        tab = tab.child(
            Tag::new("span")
                .attr("aria-hidden", "true")
                .attr("data-icon", icon),
        );
    }
    tab.text(state.display_label())
}

fn render_data(component: &Component, data: &FilterableDataset, theme: &Theme) -> String {
    let id = component.id();
    let server = server_mode(component);
    let schema = data.effective_schema();
    let paginate = data.options.enable_pagination || component.detected().has(Optimization::Pagination);

    let mut filters = Tag::new("div")
        .class(&[theme.class("filters")])
        .flag("data-strata-filters");
    if data.options.enable_search {
        filters = filters.child(
            Tag::new("input")
                .attr("type", "search")
                .class(&[theme.class("input")])
                .attr("placeholder", "Search")
                .attr("aria-label", "Search")
                .attr("data-filter-field", SEARCH_FIELD)
                .attr("data-filter-type", "text"),
        );
    }
    for field in &schema {
        if let Some(control) = render_filter(field, theme) {
            filters = filters.child(control);
        }
    }

    let total = data.len();
    let summary = Tag::new("div")
        .class(&[theme.class("summary")])
        .attr("aria-live", "polite")
        .flag("data-strata-summary")
        .text(&format!("Showing {total} of {total}"));

    let mut results = Tag::new("div")
        .attr("id", format!("{id}-results"))
        .class(&[theme.class("results")])
        .flag("data-strata-results");
    if server {
        let template = data.options.item_template.as_deref();
        for (index, item) in data.items.iter().enumerate() {
            results = results.html(&render_row(item, index, &schema, template, theme));
        }
    }

    let mut out = filters.render();
    out.push_str(&summary.render());
    out.push_str(&results.render());
    if paginate {
        out.push_str(
            &Tag::new("nav")
                .class(&[theme.class("pagination")])
                .attr("aria-label", "Pagination")
                .flag("data-strata-pagination")
                .render(),
        );
    }
    out
}

fn render_filter(field: &FilterableField, theme: &Theme) -> Option<Tag> {
    let label = field.display_label();
    let control = |tag: &str| {
        Tag::new(tag)
            .class(&[theme.class("input")])
            .attr("data-filter-field", &field.name)
            .attr("data-filter-type", field.field_type.as_str())
    };
    let option = |value: &str, text: &str| Tag::new("option").attr("value", value).text(text);
    let options: Vec<Tag> = field
        .options
        .iter()
        .map(|o| option(&o.value, &o.label))
        .collect();

    let inner: Vec<Tag> = match field.field_type {
        FieldType::Text => vec![
            control("input")
                .attr("type", "search")
                .attr("placeholder", &label),
        ],
        FieldType::Select => vec![
            control("select")
                .child(option("", "All"))
                .children(options),
        ],
        FieldType::Multiselect => vec![control("select").flag("multiple").children(options)],
        FieldType::Boolean => vec![control("select").children([
            option("", "Any"),
            option("true", "Yes"),
            option("false", "No"),
        ])],
        FieldType::Range => {
            let range = field.range?;
            let bound = |which: &str| {
                control("input")
                    .attr("type", "number")
                    .attr("data-filter-bound", which)
                    .attr("min", range.min.to_string())
                    .attr("max", range.max.to_string())
                    .attr("step", range.step.to_string())
                    .attr("placeholder", which)
            };
            vec![bound("min"), bound("max")]
        }
        FieldType::Unknown => {
            tracing::warn!(field = %field.name, "no control for unknown filter type");
            return None;
        }
    };

    Some(
        Tag::new("label")
            .class(&[theme.class("filter")])
            .child(Tag::new("span").text(&label))
            .children(inner),
    )
}

fn render_row(
    item: &Record,
    index: usize,
    schema: &[FilterableField],
    template: Option<&str>,
    theme: &Theme,
) -> String {
    let body = match template {
        Some(template) => fill_template(template, item),
        None => schema
            .iter()
            .map(|f| {
                let value = item.get(&f.name).map(value_text).unwrap_or_default();
                Tag::new("span")
                    .attr("data-field", &f.name)
                    .text(&value)
                    .render()
            })
            .collect(),
    };
    let record = serde_json::Value::Object(item.clone()).to_string();
    let mut row = Tag::new("div")
        .class(&[theme.class("row")])
        .flag("data-row")
        .attr("data-index", index.to_string());
    for field in schema {
        let Some(attr) = field_attribute(&field.name) else {
            continue;
        };
        let value = match item.get(&field.name) {
            Some(Value::Array(values)) => values.iter().map(value_text).collect::<Vec<_>>().join(","),
            Some(value) => value_text(value),
            None => continue,
        };
        row = row.attr(&attr, value);
    }
    row.attr("data-record", record).html(&body).render()
}

/// Row attributes the runtime reads besides any field attributes.
const ROW_ATTRIBUTES: &[&str] = &["row", "index", "record"];

/// `data-<field>` name for a schema field, when the field name can be one.
fn field_attribute(field: &str) -> Option<String> {
    let name = field.to_ascii_lowercase();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !ROW_ATTRIBUTES.contains(&name.as_str());
    valid.then(|| format!("data-{name}"))
}

/// Replaces `{{field}}` placeholders with escaped record values.
pub fn fill_template(template: &str, item: &Record) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        let value = item.get(key).map(value_text).unwrap_or_default();
        out.push_str(&escape_html(&value));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
