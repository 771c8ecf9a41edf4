//! Dependency rule evaluation.
//!
//! Rules are grouped by trigger component and evaluated by descending
//! priority, declaration order on ties. `show` and `hide` are two-sided:
//! when the condition fails the complementary visibility is applied, so a
//! "show when" rule also hides its target again. Every other action runs
//! only while the condition holds.

use crate::filter::{value_bool, value_number, value_text};
use crate::model::{ActionKind, ConditionOperator, DependencyAction, DependencyRule};
use serde_json::Value;
use std::collections::BTreeMap;

impl ConditionOperator {
    pub fn evaluate(self, actual: &Value, expected: &Value) -> bool {
        match self {
            Self::Equals => loosely_equal(actual, expected),
            Self::NotEquals => !loosely_equal(actual, expected),
            Self::Contains => contains(actual, expected),
            Self::NotContains => !contains(actual, expected),
            Self::GreaterThan => compare(actual, expected).is_some_and(|o| o.is_gt()),
            Self::LessThan => compare(actual, expected).is_some_and(|o| o.is_lt()),
            Self::IsEmpty => is_empty(actual),
            Self::IsNotEmpty => !is_empty(actual),
            Self::Checked => value_bool(actual).unwrap_or(false),
            Self::Unchecked => !value_bool(actual).unwrap_or(false),
            Self::In => match expected {
                Value::Array(options) => options.iter().any(|o| loosely_equal(actual, o)),
                other => loosely_equal(actual, other),
            },
            Self::Unknown => {
                tracing::warn!("unknown condition operator evaluates to false");
                false
            }
        }
    }
}

/// Form controls report strings, so `"3"` equals `3` and `"true"` equals `true`.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Array(items), other) | (other, Value::Array(items))
            if !matches!(other, Value::Array(_)) =>
        {
            items.len() == 1 && loosely_equal(&items[0], other)
        }
        _ => value_text(actual) == value_text(expected),
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|v| loosely_equal(v, expected)),
        other => value_text(other).contains(&value_text(expected)),
    }
}

fn compare(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
    let a = value_number(actual)?;
    let b = value_number(expected)?;
    a.partial_cmp(&b)
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// The effect a single action has after its rule's condition was evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    pub rule_id: String,
    pub target_id: String,
    pub action: ActionKind,
    pub value: Option<Value>,
}

/// Rules indexed by trigger component, each bucket in evaluation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleIndex {
    by_trigger: BTreeMap<String, Vec<DependencyRule>>,
    triggers_in_order: Vec<String>,
}

impl RuleIndex {
    pub fn new(rules: &[DependencyRule]) -> Self {
        let mut index = Self::default();
        for rule in rules {
            let key = rule.trigger.component_id.clone();
            if !index.by_trigger.contains_key(&key) {
                index.triggers_in_order.push(key.clone());
            }
            index.by_trigger.entry(key).or_default().push(rule.clone());
        }
        for bucket in index.by_trigger.values_mut() {
            // Stable sort keeps declaration order for equal priorities.
            bucket.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        index
    }

    /// Trigger component ids, first-seen order.
    pub fn triggers(&self) -> &[String] {
        &self.triggers_in_order
    }

    pub fn rules_for(&self, trigger: &str) -> &[DependencyRule] {
        self.by_trigger
            .get(trigger)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All rules in evaluation order, grouped by trigger.
    pub fn ordered(&self) -> Vec<&DependencyRule> {
        self.triggers_in_order
            .iter()
            .flat_map(|t| self.rules_for(t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_trigger.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_trigger.is_empty()
    }

    /// Actions to apply when `trigger` now holds `value`.
    pub fn plan(&self, trigger: &str, value: &Value) -> Vec<PlannedAction> {
        let mut out = Vec::new();
        for rule in self.rules_for(trigger) {
            let holds = rule.trigger.condition.evaluate(value, &rule.trigger.value);
            for action in &rule.actions {
                if let Some(effective) = effective_action(action, holds) {
                    out.push(PlannedAction {
                        rule_id: rule.id.clone(),
                        target_id: action.target_id.clone(),
                        action: effective,
                        value: action.value.clone(),
                    });
                }
            }
        }
        out
    }
}

fn effective_action(action: &DependencyAction, holds: bool) -> Option<ActionKind> {
    match (action.action, holds) {
        (ActionKind::Show, false) => Some(ActionKind::Hide),
        (ActionKind::Hide, false) => Some(ActionKind::Show),
        (ActionKind::Unknown, _) => {
            tracing::warn!(target = %action.target_id, "unknown action kind skipped");
            None
        }
        (kind, true) => Some(kind),
        (_, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RuleTrigger, TriggerEvent};
    use serde_json::json;

    fn rule(id: &str, priority: i32, trigger: &str, target: &str) -> DependencyRule {
        DependencyRule {
            id: id.to_string(),
            priority,
            trigger: RuleTrigger {
                component_id: trigger.to_string(),
                event: TriggerEvent::Change,
                condition: ConditionOperator::Equals,
                value: json!("x"),
            },
            actions: vec![DependencyAction::new(target, ActionKind::Enable)],
        }
    }

    #[test]
    fn test_operators() {
        use ConditionOperator as Op;
        assert!(Op::Equals.evaluate(&json!("3"), &json!(3)));
        assert!(Op::NotEquals.evaluate(&json!("a"), &json!("b")));
        assert!(Op::Contains.evaluate(&json!("hello"), &json!("ell")));
        assert!(Op::Contains.evaluate(&json!(["a", "b"]), &json!("b")));
        assert!(Op::GreaterThan.evaluate(&json!("10"), &json!(9)));
        assert!(!Op::LessThan.evaluate(&json!("abc"), &json!(9)));
        assert!(Op::IsEmpty.evaluate(&json!(""), &Value::Null));
        assert!(Op::Checked.evaluate(&json!(true), &Value::Null));
        assert!(Op::Unchecked.evaluate(&Value::Null, &Value::Null));
        assert!(Op::In.evaluate(&json!("b"), &json!(["a", "b"])));
        assert!(!Op::Unknown.evaluate(&json!("a"), &json!("a")));
    }

    #[test]
    fn test_priority_then_declaration_order() {
        let index = RuleIndex::new(&[
            rule("low", 1, "t", "a"),
            rule("high", 5, "t", "b"),
            rule("tie-first", 1, "t", "c"),
            rule("other", 9, "u", "d"),
        ]);
        let ids: Vec<_> = index.rules_for("t").iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low", "tie-first"]);
        assert_eq!(index.triggers(), ["t".to_string(), "u".to_string()]);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_show_is_two_sided() {
        let index = RuleIndex::new(&[DependencyRule::show_when(
            "t",
            ConditionOperator::Equals,
            "x",
            "p",
        )]);
        let on = index.plan("t", &json!("x"));
        assert_eq!(on[0].action, ActionKind::Show);
        let off = index.plan("t", &json!("y"));
        assert_eq!(off[0].action, ActionKind::Hide);
    }

    #[test]
    fn test_other_actions_only_when_condition_holds() {
        let index = RuleIndex::new(&[rule("r", 0, "t", "a")]);
        assert_eq!(index.plan("t", &json!("x")).len(), 1);
        assert!(index.plan("t", &json!("y")).is_empty());
    }
}
