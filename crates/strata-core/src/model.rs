use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A flat key → value record of a dataset.
pub type Record = Map<String, Value>;

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentState {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub condition: Option<TriggerCondition>,
    #[serde(default)]
    pub content: StateContent,
}

impl ComponentState {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            icon: None,
            active: false,
            disabled: false,
            condition: None,
            content: StateContent::default(),
        }
    }

    pub fn with_content(mut self, content: StateContent) -> Self {
        self.content = content;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn active(mut self) -> Self {
        self.active = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn when(mut self, condition: TriggerCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Label shown on the trigger; falls back to the id.
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// Renderable body of a state panel. Rendered once, at generation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StateContentRepr", into = "TaggedContent")]
pub enum StateContent {
    /// Literal text, escaped on output.
    Text(String),
    /// Trusted, already rendered markup.
    Html(String),
    Element(Element),
}

impl StateContent {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn html(s: impl Into<String>) -> Self {
        Self::Html(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) | Self::Html(s) => s.is_empty(),
            Self::Element(_) => false,
        }
    }
}

impl Default for StateContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<Element> for StateContent {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StateContentRepr {
    Plain(String),
    Tagged(TaggedContent),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TaggedContent {
    Text(String),
    Html(String),
    Element(Element),
}

impl From<StateContentRepr> for StateContent {
    fn from(repr: StateContentRepr) -> Self {
        match repr {
            StateContentRepr::Plain(s) => Self::Text(s),
            StateContentRepr::Tagged(TaggedContent::Text(s)) => Self::Text(s),
            StateContentRepr::Tagged(TaggedContent::Html(s)) => Self::Html(s),
            StateContentRepr::Tagged(TaggedContent::Element(e)) => Self::Element(e),
        }
    }
}

impl From<StateContent> for TaggedContent {
    fn from(content: StateContent) -> Self {
        match content {
            StateContent::Text(s) => Self::Text(s),
            StateContent::Html(s) => Self::Html(s),
            StateContent::Element(e) => Self::Element(e),
        }
    }
}

/// Minimal element tree for pre-built state content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<StateContent>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: impl Into<StateContent>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(StateContent::Text(text.into()));
        self
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Select,
    Multiselect,
    Boolean,
    Range,
    #[serde(other)]
    Unknown,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Select => "select",
            Self::Multiselect => "multiselect",
            Self::Boolean => "boolean",
            Self::Range => "range",
            Self::Unknown => "unknown",
        }
    }

    /// Free-text search only looks at text and select fields unless a field
    /// says otherwise.
    pub fn searchable_by_default(self) -> bool {
        matches!(self, Self::Text | Self::Select)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FilterOptionRepr")]
pub struct FilterOption {
    pub value: String,
    pub label: String,
}

impl FilterOption {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterOptionRepr {
    Plain(String),
    Full {
        value: String,
        #[serde(default)]
        label: Option<String>,
    },
}

impl From<FilterOptionRepr> for FilterOption {
    fn from(repr: FilterOptionRepr) -> Self {
        match repr {
            FilterOptionRepr::Plain(value) => Self::new(value),
            FilterOptionRepr::Full { value, label } => Self {
                label: label.unwrap_or_else(|| value.clone()),
                value,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_step")]
    pub step: f64,
}

fn default_step() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "FieldRepr")]
pub struct FilterableField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FilterOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeSpec>,
    /// Defaults to true for text and select fields only.
    pub searchable: bool,
}

/// Wire form of [`FilterableField`]; `searchable` falls back per type.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldRepr {
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    label: String,
    #[serde(default)]
    options: Vec<FilterOption>,
    #[serde(default)]
    range: Option<RangeSpec>,
    #[serde(default)]
    searchable: Option<bool>,
}

impl From<FieldRepr> for FilterableField {
    fn from(repr: FieldRepr) -> Self {
        Self {
            searchable: repr
                .searchable
                .unwrap_or_else(|| FieldType::searchable_by_default(repr.field_type)),
            name: repr.name,
            field_type: repr.field_type,
            label: repr.label,
            options: repr.options,
            range: repr.range,
        }
    }
}

impl FilterableField {
    fn base(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            label: String::new(),
            options: Vec::new(),
            range: None,
            searchable: FieldType::searchable_by_default(field_type),
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::base(name, FieldType::Text)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::base(name, FieldType::Boolean)
    }

    pub fn select<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut field = Self::base(name, FieldType::Select);
        field.options = options.into_iter().map(FilterOption::new).collect();
        field
    }

    pub fn multiselect<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut field = Self::base(name, FieldType::Multiselect);
        field.options = options.into_iter().map(FilterOption::new).collect();
        field
    }

    pub fn range(name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        let mut field = Self::base(name, FieldType::Range);
        field.range = Some(RangeSpec { min, max, step });
        field
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Label shown next to the control; derived from the name when unset.
    pub fn display_label(&self) -> String {
        if !self.label.trim().is_empty() {
            return self.label.clone();
        }
        title_case(&self.name)
    }
}

fn title_case(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetOptions {
    #[serde(default)]
    pub enable_search: bool,
    #[serde(default)]
    pub enable_pagination: bool,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
    #[serde(default)]
    pub server_rendered: bool,
    #[serde(default = "default_row_selector")]
    pub row_selector: String,
    #[serde(default)]
    pub counter_selector: Option<String>,
    /// Row template with `{{field}}` placeholders.
    #[serde(default)]
    pub item_template: Option<String>,
}

fn default_items_per_page() -> usize {
    20
}

fn default_row_selector() -> String {
    "[data-row]".to_string()
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            enable_search: false,
            enable_pagination: false,
            items_per_page: default_items_per_page(),
            server_rendered: false,
            row_selector: default_row_selector(),
            counter_selector: None,
            item_template: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterableDataset {
    #[serde(default)]
    pub items: Vec<Record>,
    #[serde(default)]
    pub schema: Vec<FilterableField>,
    #[serde(default)]
    pub options: DatasetOptions,
}

impl FilterableDataset {
    pub fn new(items: Vec<Record>) -> Self {
        Self {
            items,
            schema: Vec::new(),
            options: DatasetOptions::default(),
        }
    }

    pub fn with_schema(mut self, schema: Vec<FilterableField>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_options(mut self, options: DatasetOptions) -> Self {
        self.options = options;
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.schema.is_empty()
    }

    /// The declared schema, or one inferred from the first record.
    pub fn effective_schema(&self) -> Vec<FilterableField> {
        if !self.schema.is_empty() {
            return self.schema.clone();
        }
        crate::schema::infer_schema(&self.items)
    }
}

// ---------------------------------------------------------------------------
// Dependency rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    #[default]
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
    Checked,
    Unchecked,
    In,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerEvent {
    #[default]
    Change,
    Input,
    Click,
}

impl TriggerEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Input => "input",
            Self::Click => "click",
        }
    }
}

/// `componentId`'s current value compared against `value` with `condition`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerCondition {
    pub component_id: String,
    #[serde(default)]
    pub condition: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl TriggerCondition {
    pub fn new(
        component_id: impl Into<String>,
        condition: ConditionOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            condition,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTrigger {
    pub component_id: String,
    #[serde(default)]
    pub event: TriggerEvent,
    #[serde(default)]
    pub condition: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Show,
    Hide,
    Enable,
    Disable,
    AddClass,
    RemoveClass,
    SetValue,
    SetText,
    #[serde(rename = "setHTML")]
    SetHtml,
    Focus,
    Blur,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyAction {
    pub target_id: String,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl DependencyAction {
    pub fn new(target_id: impl Into<String>, action: ActionKind) -> Self {
        Self {
            target_id: target_id.into(),
            action,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRule {
    pub id: String,
    #[serde(default)]
    pub priority: i32,
    pub trigger: RuleTrigger,
    #[serde(default)]
    pub actions: Vec<DependencyAction>,
}

impl DependencyRule {
    pub fn new(id: impl Into<String>, trigger: RuleTrigger) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            trigger,
            actions: Vec::new(),
        }
    }

    /// Shows `target` while `trigger`'s value satisfies the condition.
    pub fn show_when(
        trigger: impl Into<String>,
        condition: ConditionOperator,
        value: impl Into<Value>,
        target: impl Into<String>,
    ) -> Self {
        Self::single(trigger, condition, value, target, ActionKind::Show)
    }

    /// Hides `target` while `trigger`'s value satisfies the condition.
    pub fn hide_when(
        trigger: impl Into<String>,
        condition: ConditionOperator,
        value: impl Into<Value>,
        target: impl Into<String>,
    ) -> Self {
        Self::single(trigger, condition, value, target, ActionKind::Hide)
    }

    fn single(
        trigger: impl Into<String>,
        condition: ConditionOperator,
        value: impl Into<Value>,
        target: impl Into<String>,
        action: ActionKind,
    ) -> Self {
        let trigger = trigger.into();
        let target = target.into();
        let verb = match action {
            ActionKind::Hide => "hide",
            _ => "show",
        };
        Self {
            id: format!("{verb}-{target}-when-{trigger}"),
            priority: 0,
            trigger: RuleTrigger {
                component_id: trigger,
                event: TriggerEvent::Change,
                condition,
                value: value.into(),
            },
            actions: vec![DependencyAction::new(target, action)],
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_action(mut self, action: DependencyAction) -> Self {
        self.actions.push(action);
        self
    }
}
