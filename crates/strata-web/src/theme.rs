use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Class names applied by the structure generator and toggled by the
/// runtime, plus the palette used for the optional base stylesheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(default = "default_classes")]
    pub classes: HashMap<String, String>,
    #[serde(default = "default_colors")]
    pub colors: HashMap<String, String>,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    /// Emit the base stylesheet in full pages.
    #[serde(default = "default_true")]
    pub stylesheet: bool,
}

fn default_true() -> bool {
    true
}

fn default_font_family() -> String {
    "Inter, system-ui, sans-serif".to_string()
}

fn default_classes() -> HashMap<String, String> {
    [
        ("component", "strata"),
        ("nav", "strata-nav"),
        ("tab", "strata-tab"),
        ("panel", "strata-panel"),
        ("active", "is-active"),
        ("hidden", "is-hidden"),
        ("disabled", "is-disabled"),
        ("filters", "strata-filters"),
        ("filter", "strata-filter"),
        ("input", "strata-input"),
        ("summary", "strata-summary"),
        ("results", "strata-results"),
        ("row", "strata-row"),
        ("pagination", "strata-pagination"),
        ("placeholder", "strata-placeholder"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_colors() -> HashMap<String, String> {
    [
        ("brand", "#2563eb"),
        ("muted", "#64748b"),
        ("surface", "#ffffff"),
        ("surface-alt", "#e2e8f0"),
        ("text", "#0f172a"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            classes: default_classes(),
            colors: default_colors(),
            font_family: default_font_family(),
            stylesheet: true,
        }
    }
}

impl Theme {
    /// Layers a component's `theme` object over the defaults; unknown keys
    /// are ignored and missing keys keep their default.
    pub fn with_overrides(&self, overrides: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = overrides else {
            return self.clone();
        };
        let mut theme = self.clone();
        let merge = |key: &str, target: &mut HashMap<String, String>| {
            if let Some(Value::Object(entries)) = map.get(key) {
                for (k, v) in entries {
                    if let Some(s) = v.as_str() {
                        target.insert(k.clone(), s.to_string());
                    }
                }
            }
        };
        merge("classes", &mut theme.classes);
        merge("colors", &mut theme.colors);
        if let Some(font) = map.get("fontFamily").and_then(Value::as_str) {
            theme.font_family = font.to_string();
        }
        if let Some(enabled) = map.get("stylesheet").and_then(Value::as_bool) {
            theme.stylesheet = enabled;
        }
        theme
    }

    /// Class for `role`, empty when the theme leaves it unset.
    pub fn class(&self, role: &str) -> &str {
        self.classes.get(role).map(String::as_str).unwrap_or("")
    }

    fn color(&self, name: &str, fallback: &str) -> String {
        match self.colors.get(name) {
            Some(value) if is_safe_css_value(value) => value.clone(),
            Some(value) => {
                tracing::warn!(color = name, value = %value, "unsafe theme color ignored");
                fallback.to_string()
            }
            None => fallback.to_string(),
        }
    }

    fn font(&self) -> String {
        if is_safe_css_value(&self.font_family) {
            self.font_family.clone()
        } else {
            tracing::warn!(value = %self.font_family, "unsafe theme font family ignored");
            default_font_family()
        }
    }

    /// First class of `role` usable as a selector, else the built-in one.
    fn selector_class(&self, role: &str) -> String {
        let first = self.class(role).split_whitespace().next().unwrap_or("");
        if is_css_ident(first) {
            return first.to_string();
        }
        tracing::warn!(role, class = %self.class(role), "theme class unusable in stylesheet");
        default_classes().remove(role).unwrap_or_default()
    }

    /// Base stylesheet. Values that could end a declaration, a rule or the
    /// surrounding `<style>` element are replaced by defaults.
    pub fn stylesheet(&self) -> String {
        let brand = self.color("brand", "#2563eb");
        let muted = self.color("muted", "#64748b");
        let surface = self.color("surface", "#ffffff");
        let surface_alt = self.color("surface-alt", "#e2e8f0");
        let text = self.color("text", "#0f172a");
        let c = |role: &str| self.selector_class(role);

        format!(
            r#"
.{component} {{
  font-family: {font};
  color: {text};
  background: {surface};
}}

.{component} .{hidden} {{
  display: none !important;
}}

.{nav} {{
  display: flex;
  gap: 4px;
  border-bottom: 1px solid {surface_alt};
}}

.{tab} {{
  font: inherit;
  border: 0;
  background: transparent;
  padding: 8px 14px;
  cursor: pointer;
  color: {muted};
}}

.{tab}.{active} {{
  color: {brand};
  box-shadow: inset 0 -2px 0 {brand};
}}

.{tab}[disabled] {{
  opacity: 0.5;
  cursor: not-allowed;
}}

.{filters} {{
  display: flex;
  flex-wrap: wrap;
  gap: 12px;
  margin: 12px 0;
}}

.{input} {{
  font: inherit;
  border: 1px solid {surface_alt};
  border-radius: 8px;
  padding: 6px 10px;
}}

.{summary} {{
  color: {muted};
  font-size: 14px;
}}
"#,
            component = c("component"),
            hidden = c("hidden"),
            nav = c("nav"),
            tab = c("tab"),
            active = c("active"),
            filters = c("filters"),
            input = c("input"),
            summary = c("summary"),
            font = self.font(),
        )
    }
}

fn is_safe_css_value(value: &str) -> bool {
    !value.trim().is_empty()
        && !value.contains("/*")
        && !value
            .chars()
            .any(|c| matches!(c, '<' | '>' | ';' | '{' | '}' | '\\') || c.is_control())
}

fn is_css_ident(class: &str) -> bool {
    let mut chars = class.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '-')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
