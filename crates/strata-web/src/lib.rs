//! Strata Web
//!
//! Turns a [`strata_core::Component`] into what a browser needs:
//!
//! 1. [`structure`] renders the semantic markup.
//! 2. [`config`] serializes the embedded configuration payload.
//! 3. [`script`] generates the per-component glue through the [`js`] IR.
//! 4. [`jsminify`] optionally compacts generated JavaScript.
//!
//! The runtime classes the glue builds on live in `src/assets/` and are
//! exposed as [`STRATA_RUNTIME_JS`]. A page needs them once, before any
//! component script.

pub mod config;
pub mod html;
pub mod js;
pub mod jsminify;
pub mod script;
pub mod structure;
pub mod theme;

pub use html::escape_html;
pub use js::InvalidIdent;
pub use jsminify::{MinifyError, minify_js};
pub use theme::Theme;

use std::collections::HashMap;
use strata_core::{Component, DetectedPattern};
use thiserror::Error;

/// Browser runtime: controller base plus the states, data and rules
/// managers. Each class attaches to `window.Strata` only once.
pub const STRATA_RUNTIME_JS: &str = concat!(
    include_str!("assets/controller.js"),
    "\n",
    include_str!("assets/states.js"),
    "\n",
    include_str!("assets/data.js"),
    "\n",
    include_str!("assets/rules.js"),
);

/// The runtime, minified on request.
pub fn runtime_js(minify: bool) -> String {
    if minify {
        script::minify_or_keep(STRATA_RUNTIME_JS.to_string())
    } else {
        STRATA_RUNTIME_JS.to_string()
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("failed to serialize component configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Ident(#[from] InvalidIdent),
    /// Two components on one page would share an element id or the
    /// `window` global the runtime publishes them under.
    #[error("components '{first}' and '{second}' both map to '{name}'")]
    Collision {
        first: String,
        second: String,
        name: String,
    },
}

/// Everything generated for one component.
#[derive(Debug, Clone)]
pub struct ComponentOutput {
    pub id: String,
    pub detected: DetectedPattern,
    /// Root element and its children.
    pub markup: String,
    /// The `{id}-config` JSON block.
    pub config: String,
    /// Glue script body, without the `<script>` element.
    pub script: String,
    pub minified: bool,
}

impl ComponentOutput {
    /// Markup, payload and glue; expects the runtime elsewhere on the page.
    pub fn fragment(&self) -> String {
        format!(
            "{}{}<script>{}</script>",
            self.markup, self.config, self.script
        )
    }

    /// Self-contained embed that carries its own copy of the runtime.
    pub fn to_html(&self) -> String {
        format!(
            "<script>{}</script>{}",
            runtime_js(self.minified),
            self.fragment()
        )
    }
}

pub fn render_component(component: &Component, theme: &Theme) -> Result<ComponentOutput, WebError> {
    let detected = component.detected().clone();
    tracing::debug!(
        component = component.id(),
        pattern = %detected.primary_pattern,
        optimizations = detected.optimizations.len(),
        "rendering component"
    );
    Ok(ComponentOutput {
        id: component.id().to_string(),
        markup: structure::render(component, theme),
        config: config::render(component, theme)?,
        script: script::render(component)?,
        minified: component.options().minify_js,
        detected,
    })
}

/// Rejects component sets whose ids or sanitized globals overlap.
pub fn check_collisions(components: &[ComponentOutput]) -> Result<(), WebError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for output in components {
        let name = script::global_name(&output.id)?.as_str().to_string();
        if let Some(first) = seen.insert(name.clone(), &output.id) {
            return Err(WebError::Collision {
                first: first.to_string(),
                second: output.id.clone(),
                name,
            });
        }
    }
    Ok(())
}

/// A complete HTML document. The stylesheet goes in `<head>` when the theme
/// enables it; the runtime is included once.
pub fn render_page(
    title: &str,
    theme: &Theme,
    components: &[ComponentOutput],
) -> Result<String, WebError> {
    check_collisions(components)?;
    let minify = !components.is_empty() && components.iter().all(|c| c.minified);
    let style = if theme.stylesheet {
        format!("<style>{}</style>", theme.stylesheet())
    } else {
        String::new()
    };
    let body: String = components.iter().map(ComponentOutput::fragment).collect();

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{}</title>
{}<script>{}</script>
</head>
<body>
{}
</body>
</html>
"#,
        escape_html(title),
        style,
        runtime_js(minify),
        body
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ComponentInput, ComponentState, DynamicOptions, StateContent};

    fn tabs(id: &str) -> Component {
        let states = vec![
            ComponentState::new("overview", "Overview").with_content(StateContent::text("Intro")),
            ComponentState::new("details", "Details").with_content(StateContent::text("More")),
        ];
        Component::new(id, ComponentInput::StatesOnly(states), DynamicOptions::default()).unwrap()
    }

    #[test]
    fn test_strata_runtime_js_exists() {
        assert!(!STRATA_RUNTIME_JS.is_empty());
        for class in ["Controller", "StatesManager", "DataManager", "RulesManager"] {
            assert!(STRATA_RUNTIME_JS.contains(&format!("Strata.{class} = {class};")));
        }
        assert!(!STRATA_RUNTIME_JS.contains("</script"));
    }

    #[test]
    fn test_runtime_minifies() {
        let minified = minify_js(STRATA_RUNTIME_JS).unwrap();
        assert!(minified.len() < STRATA_RUNTIME_JS.len());
        assert!(!minified.contains("/*"));
        assert_eq!(minify_js(&minified).unwrap(), minified);
        assert_eq!(runtime_js(true), minified);
    }

    #[test]
    fn test_render_component_parts() {
        let out = render_component(&tabs("profile"), &Theme::default()).unwrap();
        assert_eq!(out.id, "profile");
        assert!(out.markup.starts_with("<div id=\"profile\""));
        assert!(out.config.contains("id=\"profile-config\""));
        assert!(out.script.contains("new Strata_profile(\"profile\")"));

        let fragment = out.fragment();
        let markup_at = fragment.find("data-strata-component").unwrap();
        let config_at = fragment.find("data-strata-config").unwrap();
        assert!(markup_at < config_at);
        assert!(out.to_html().starts_with("<script>/* Strata runtime"));
    }

    #[test]
    fn test_render_page_includes_runtime_once() {
        let theme = Theme::default();
        let outputs = vec![
            render_component(&tabs("a"), &theme).unwrap(),
            render_component(&tabs("b"), &theme).unwrap(),
        ];
        let page = render_page("Demo <1>", &theme, &outputs).unwrap();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>Demo &lt;1&gt;</title>"));
        assert_eq!(page.matches("Strata.Controller = Controller;").count(), 1);
        assert!(page.contains("<style>"));
        assert!(page.find("Strata.Controller = Controller;") < page.find("id=\"a\""));
        assert!(page.contains("id=\"b-config\""));
    }

    #[test]
    fn test_render_page_without_stylesheet() {
        let theme = Theme {
            stylesheet: false,
            ..Theme::default()
        };
        let page = render_page("Plain", &theme, &[]).unwrap();
        assert!(!page.contains("<style>"));
    }

    #[test]
    fn test_render_page_rejects_colliding_globals() {
        let theme = Theme::default();
        let outputs = vec![
            render_component(&tabs("a-b"), &theme).unwrap(),
            render_component(&tabs("a.b"), &theme).unwrap(),
        ];
        let err = render_page("Clash", &theme, &outputs).unwrap_err();
        assert!(matches!(
            &err,
            WebError::Collision { first, second, name }
                if first == "a-b" && second == "a.b" && name == "strata_a_b"
        ));

        let twice = vec![
            render_component(&tabs("same"), &theme).unwrap(),
            render_component(&tabs("same"), &theme).unwrap(),
        ];
        assert!(render_page("Twice", &theme, &twice).is_err());
    }
}
