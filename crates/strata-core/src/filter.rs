//! Filter semantics shared by server-side evaluation and the browser runtime.
//!
//! Per field type:
//!
//! - text: case-insensitive substring
//! - boolean: exact match
//! - select: exact match, any value when empty
//! - multiselect: membership, any value when the list is empty
//! - range: inclusive bounds, a missing bound is open
//!
//! A filter is *active* when it currently constrains results.

use crate::model::{FieldType, FilterableField, Record};
use serde_json::Value;

/// Field name used by the global search box.
pub const SEARCH_FIELD: &str = "__search";

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Select(String),
    Multi(Vec<String>),
    Bool(Option<bool>),
    Range { min: Option<f64>, max: Option<f64> },
    /// Unsupported field type; never constrains.
    Ignored,
}

impl FilterValue {
    pub fn empty(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Text => Self::Text(String::new()),
            FieldType::Select => Self::Select(String::new()),
            FieldType::Multiselect => Self::Multi(Vec::new()),
            FieldType::Boolean => Self::Bool(None),
            FieldType::Range => Self::Range {
                min: None,
                max: None,
            },
            FieldType::Unknown => Self::Ignored,
        }
    }

    /// Interprets a raw control value the way the runtime reads inputs.
    ///
    /// Ranges take `{"min": .., "max": ..}` or a two element array.
    pub fn from_input(field_type: FieldType, raw: &Value) -> Self {
        match field_type {
            FieldType::Text => Self::Text(value_text(raw)),
            FieldType::Select => Self::Select(value_text(raw)),
            FieldType::Multiselect => Self::Multi(match raw {
                Value::Array(items) => items
                    .iter()
                    .map(value_text)
                    .filter(|s| !s.is_empty())
                    .collect(),
                Value::Null => Vec::new(),
                other => {
                    let s = value_text(other);
                    if s.is_empty() { Vec::new() } else { vec![s] }
                }
            }),
            FieldType::Boolean => Self::Bool(value_bool(raw)),
            FieldType::Range => {
                let (min, max) = match raw {
                    Value::Object(bounds) => (
                        bounds.get("min").and_then(value_number),
                        bounds.get("max").and_then(value_number),
                    ),
                    Value::Array(bounds) => (
                        bounds.first().and_then(value_number),
                        bounds.get(1).and_then(value_number),
                    ),
                    _ => (None, None),
                };
                Self::Range { min, max }
            }
            FieldType::Unknown => Self::Ignored,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Self::Text(s) | Self::Select(s) => !s.trim().is_empty(),
            Self::Multi(values) => !values.is_empty(),
            Self::Bool(b) => b.is_some(),
            Self::Range { min, max } => min.is_some() || max.is_some(),
            Self::Ignored => false,
        }
    }

    pub fn matches(&self, candidate: Option<&Value>) -> bool {
        if !self.is_active() {
            return true;
        }
        let candidate = candidate.unwrap_or(&Value::Null);
        match self {
            Self::Text(needle) => value_text(candidate)
                .to_lowercase()
                .contains(&needle.trim().to_lowercase()),
            Self::Select(wanted) => match candidate {
                Value::Array(items) => items.iter().any(|v| value_text(v) == *wanted),
                other => value_text(other) == *wanted,
            },
            Self::Multi(wanted) => match candidate {
                Value::Array(items) => items
                    .iter()
                    .any(|v| wanted.iter().any(|w| *w == value_text(v))),
                other => {
                    let text = value_text(other);
                    wanted.iter().any(|w| *w == text)
                }
            },
            Self::Bool(wanted) => value_bool(candidate) == *wanted,
            Self::Range { min, max } => {
                let Some(n) = value_number(candidate) else {
                    return false;
                };
                min.is_none_or(|lo| n >= lo) && max.is_none_or(|hi| n <= hi)
            }
            Self::Ignored => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterEntry {
    pub field: String,
    pub field_type: FieldType,
    pub value: FilterValue,
    pub active: bool,
}

/// One filter entry per schema field plus the optional global search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterSet {
    entries: Vec<FilterEntry>,
    searchable: Vec<String>,
    search: String,
}

impl FilterSet {
    pub fn new(schema: &[FilterableField]) -> Self {
        Self {
            entries: schema
                .iter()
                .map(|field| FilterEntry {
                    field: field.name.clone(),
                    field_type: field.field_type,
                    value: FilterValue::empty(field.field_type),
                    active: false,
                })
                .collect(),
            searchable: schema
                .iter()
                .filter(|f| f.searchable)
                .map(|f| f.name.clone())
                .collect(),
            search: String::new(),
        }
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn entry(&self, field: &str) -> Option<&FilterEntry> {
        self.entries.iter().find(|e| e.field == field)
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.active).count() + usize::from(!self.search.is_empty())
    }

    /// Returns false when `field` is not part of the schema.
    pub fn update(&mut self, field: &str, raw: &Value) -> bool {
        if field == SEARCH_FIELD {
            self.search = value_text(raw).trim().to_lowercase();
            return true;
        }
        let Some(entry) = self.entries.iter_mut().find(|e| e.field == field) else {
            tracing::warn!(field, "filter update for unknown field ignored");
            return false;
        };
        entry.value = FilterValue::from_input(entry.field_type, raw);
        entry.active = entry.value.is_active();
        true
    }

    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.value = FilterValue::empty(entry.field_type);
            entry.active = false;
        }
        self.search.clear();
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.matches_with(|field| record.get(field).cloned())
    }

    /// Matching against any attribute source, e.g. a pre-rendered row.
    pub fn matches_with<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<Value>,
    {
        let fields_match = self
            .entries
            .iter()
            .filter(|e| e.active)
            .all(|e| e.value.matches(lookup(&e.field).as_ref()));
        if !fields_match {
            return false;
        }
        if self.search.is_empty() {
            return true;
        }
        self.searchable.iter().any(|field| {
            lookup(field)
                .map(|v| value_text(&v).to_lowercase().contains(&self.search))
                .unwrap_or(false)
        })
    }
}

pub fn value_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        Value::Object(_) => v.to_string(),
    }
}

pub fn value_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    }
}

pub fn value_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        _ => None,
    }
}
