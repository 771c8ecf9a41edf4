//! Schema inference for datasets declared without a field list.
//!
//! Keys and their order come from the first record. Value kinds decide the
//! field type:
//!
//! - bool → `boolean`
//! - number → `range`, spanning the observed minimum and maximum
//! - array → `multiselect`, options are the union of scalar members
//! - string → `select` when the column repeats a small set of values,
//!   otherwise free `text`
//!
//! Nested objects and nulls are not filterable and are skipped.

use crate::model::{FilterableField, Record};
use serde_json::Value;
use std::collections::BTreeSet;

const MAX_INFERRED_SELECT_OPTIONS: usize = 12;

pub fn infer_schema(items: &[Record]) -> Vec<FilterableField> {
    let Some(first) = items.first() else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    for (key, sample) in first {
        let field = match sample {
            Value::Bool(_) => Some(FilterableField::boolean(key.as_str())),
            Value::Number(_) => Some(infer_range(key, items)),
            Value::Array(_) => Some(infer_multiselect(key, items)),
            Value::String(_) => Some(infer_text_or_select(key, items)),
            Value::Null | Value::Object(_) => None,
        };
        if let Some(field) = field {
            tracing::debug!(field = %key, kind = field.field_type.as_str(), "inferred schema field");
            fields.push(field);
        }
    }
    fields
}

fn infer_range(key: &str, items: &[Record]) -> FilterableField {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut integral = true;
    for n in items.iter().filter_map(|r| r.get(key)).filter_map(Value::as_f64) {
        min = min.min(n);
        max = max.max(n);
        if n.fract() != 0.0 {
            integral = false;
        }
    }
    if !min.is_finite() || !max.is_finite() {
        min = 0.0;
        max = 0.0;
    }
    let step = if integral { 1.0 } else { 0.01 };
    FilterableField::range(key, min.floor(), max.ceil(), step)
}

fn infer_multiselect(key: &str, items: &[Record]) -> FilterableField {
    let values: BTreeSet<String> = items
        .iter()
        .filter_map(|r| r.get(key))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(scalar_to_string)
        .collect();
    FilterableField::multiselect(key, values)
}

fn infer_text_or_select(key: &str, items: &[Record]) -> FilterableField {
    let values: Vec<String> = items
        .iter()
        .filter_map(|r| r.get(key))
        .filter_map(scalar_to_string)
        .collect();
    let distinct: BTreeSet<&str> = values.iter().map(String::as_str).collect();

    let repeats = values.len() >= 2 && distinct.len() < values.len();
    if repeats && distinct.len() <= MAX_INFERRED_SELECT_OPTIONS {
        return FilterableField::select(key, distinct);
    }
    FilterableField::text(key)
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
