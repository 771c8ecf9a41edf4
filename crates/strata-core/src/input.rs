//! The API boundary: caller input is normalised once into a
//! [`ComponentInput`] and validated into a [`Component`].

use crate::error::{StrataError, StrataResult};
use crate::model::{
    ComponentState, DependencyRule, FieldType, FilterableDataset, FilterableField,
};
use crate::options::DynamicOptions;
use crate::pattern::{self, DetectedPattern};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Which of the three inputs a component carries.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ComponentInput {
    #[default]
    Empty,
    StatesOnly(Vec<ComponentState>),
    DataOnly(FilterableDataset),
    RulesOnly(Vec<DependencyRule>),
    StatesData {
        states: Vec<ComponentState>,
        data: FilterableDataset,
    },
    StatesRules {
        states: Vec<ComponentState>,
        rules: Vec<DependencyRule>,
    },
    DataRules {
        data: FilterableDataset,
        rules: Vec<DependencyRule>,
    },
    Complete {
        states: Vec<ComponentState>,
        data: FilterableDataset,
        rules: Vec<DependencyRule>,
    },
}

impl ComponentInput {
    /// Empty lists and datasets with neither items nor schema count as absent.
    pub fn from_parts(
        states: Option<Vec<ComponentState>>,
        data: Option<FilterableDataset>,
        rules: Option<Vec<DependencyRule>>,
    ) -> Self {
        let states = states.filter(|s| !s.is_empty());
        let data = data.filter(|d| !d.is_empty());
        let rules = rules.filter(|r| !r.is_empty());

        match (states, data, rules) {
            (Some(states), Some(data), Some(rules)) => Self::Complete {
                states,
                data,
                rules,
            },
            (Some(states), Some(data), None) => Self::StatesData { states, data },
            (Some(states), None, Some(rules)) => Self::StatesRules { states, rules },
            (None, Some(data), Some(rules)) => Self::DataRules { data, rules },
            (Some(states), None, None) => Self::StatesOnly(states),
            (None, Some(data), None) => Self::DataOnly(data),
            (None, None, Some(rules)) => Self::RulesOnly(rules),
            (None, None, None) => Self::Empty,
        }
    }

    pub fn states(&self) -> Option<&[ComponentState]> {
        match self {
            Self::StatesOnly(states)
            | Self::StatesData { states, .. }
            | Self::StatesRules { states, .. }
            | Self::Complete { states, .. } => Some(states),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&FilterableDataset> {
        match self {
            Self::DataOnly(data)
            | Self::StatesData { data, .. }
            | Self::DataRules { data, .. }
            | Self::Complete { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn rules(&self) -> Option<&[DependencyRule]> {
        match self {
            Self::RulesOnly(rules)
            | Self::StatesRules { rules, .. }
            | Self::DataRules { rules, .. }
            | Self::Complete { rules, .. } => Some(rules),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// JSON document describing one component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub id: String,
    #[serde(default)]
    pub states: Option<Vec<ComponentState>>,
    #[serde(default)]
    pub data: Option<FilterableDataset>,
    #[serde(default)]
    pub rules: Option<Vec<DependencyRule>>,
    #[serde(default)]
    pub options: DynamicOptions,
    /// Theme overrides, interpreted by the renderer.
    #[serde(default)]
    pub theme: Option<Value>,
}

impl ComponentSpec {
    pub fn from_json(json: &str) -> StrataResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A validated component ready for generation. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    id: String,
    input: ComponentInput,
    options: DynamicOptions,
    detected: DetectedPattern,
}

impl Component {
    pub fn new(
        id: impl Into<String>,
        input: ComponentInput,
        options: DynamicOptions,
    ) -> StrataResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(StrataError::EmptyComponentId);
        }
        validate_input(&input, &options)?;
        let detected = pattern::resolve(&input, &options);
        Ok(Self {
            id,
            input,
            options,
            detected,
        })
    }

    pub fn from_spec(spec: ComponentSpec) -> StrataResult<Self> {
        let input = ComponentInput::from_parts(spec.states, spec.data, spec.rules);
        Self::new(spec.id, input, spec.options)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input(&self) -> &ComponentInput {
        &self.input
    }

    pub fn options(&self) -> &DynamicOptions {
        &self.options
    }

    pub fn detected(&self) -> &DetectedPattern {
        &self.detected
    }

    pub fn states(&self) -> &[ComponentState] {
        self.input.states().unwrap_or_default()
    }

    pub fn data(&self) -> Option<&FilterableDataset> {
        self.input.data()
    }

    pub fn rules(&self) -> &[DependencyRule] {
        self.input.rules().unwrap_or_default()
    }

    /// The state that starts active: the first one marked, else the first
    /// declared.
    pub fn initial_state(&self) -> Option<&ComponentState> {
        initial_state(self.states())
    }
}

pub fn initial_state(states: &[ComponentState]) -> Option<&ComponentState> {
    let mut marked = states.iter().filter(|s| s.active);
    match marked.next() {
        Some(first) => {
            if marked.next().is_some() {
                tracing::warn!(state = %first.id, "several states marked active; first one wins");
            }
            Some(first)
        }
        None => states.first(),
    }
}

fn validate_input(input: &ComponentInput, options: &DynamicOptions) -> StrataResult<()> {
    if let Some(states) = input.states() {
        let mut seen = HashSet::new();
        for (index, state) in states.iter().enumerate() {
            if state.id.trim().is_empty() {
                return Err(StrataError::EmptyStateId { index });
            }
            if !seen.insert(state.id.as_str()) {
                return Err(StrataError::DuplicateStateId {
                    id: state.id.clone(),
                });
            }
        }
        for state in options.hooks.state_hooks.keys() {
            if !seen.contains(state.as_str()) {
                return Err(StrataError::UnknownStateHook {
                    state: state.clone(),
                });
            }
        }
    } else if let Some(state) = options.hooks.state_hooks.keys().next() {
        return Err(StrataError::UnknownStateHook {
            state: state.clone(),
        });
    }

    if let Some(data) = input.data() {
        for field in &data.schema {
            validate_field(field)?;
        }
    }

    if let Some(rules) = input.rules() {
        for rule in rules {
            if rule.trigger.component_id.trim().is_empty() {
                return Err(StrataError::MissingTrigger {
                    rule: rule.id.clone(),
                });
            }
        }
    }
    Ok(())
}

pub fn validate_field(field: &FilterableField) -> StrataResult<()> {
    let invalid = |reason: &str| StrataError::InvalidField {
        field: field.name.clone(),
        reason: reason.to_string(),
    };
    if field.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    match (field.field_type, field.range) {
        (FieldType::Range, None) => Err(invalid("range fields require min/max")),
        (FieldType::Range, Some(range)) if range.min > range.max => {
            Err(invalid("range min exceeds max"))
        }
        (FieldType::Range, Some(_)) => Ok(()),
        (other, Some(_)) => Err(invalid(&format!(
            "only range fields may carry a range (type is {})",
            other.as_str()
        ))),
        (FieldType::Unknown, None) => {
            tracing::warn!(field = %field.name, "unknown filter type; field will not filter");
            Ok(())
        }
        _ => Ok(()),
    }
}
