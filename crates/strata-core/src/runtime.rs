//! Headless controller.
//!
//! A Rust model of the generated browser runtime, driven against an
//! in-memory [`Document`] instead of the DOM. It follows the same
//! lifecycle, manager and hook contract as the emitted script, which makes
//! it usable for server-side evaluation (initial rule state, pre-filtered
//! counts) and as the executable reference for the runtime's behavior.
//!
//! Lifecycle:
//!
//! ```text
//! uninitialized → loading-externals → initializing → ready
//!                        │                  │
//!                        └──── error ◄──────┘
//! ```
//!
//! A `beforeInit` hook returning cancel sends the controller back to
//! `uninitialized`; that is a veto, not a failure.

use crate::filter::FilterSet;
use crate::input::{Component, initial_state};
use crate::model::{ActionKind, ComponentState, Record, TriggerCondition};
use crate::options::ExternalScript;
use crate::pattern::Pattern;
use crate::rules::{PlannedAction, RuleIndex};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// State id the `complete` pattern falls back to when filtering empties the
/// result set.
pub const NO_RESULTS_STATE: &str = "no-results";

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementState {
    pub value: Value,
    pub visible: bool,
    pub enabled: bool,
    pub focused: bool,
    pub classes: BTreeSet<String>,
    pub text: String,
    pub html: String,
    /// `data-*` style attributes, used for pre-rendered row matching.
    pub attrs: Map<String, Value>,
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            value: Value::Null,
            visible: true,
            enabled: true,
            focused: false,
            classes: BTreeSet::new(),
            text: String::new(),
            html: String::new(),
            attrs: Map::new(),
        }
    }
}

/// Element states keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    elements: BTreeMap<String, ElementState>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// The elements the generated markup would contain for `component`,
    /// plus every rule trigger and target.
    pub fn scaffold(component: &Component) -> Self {
        let mut doc = Self::new();
        let id = component.id();
        doc.insert(id);

        let active = component.initial_state().map(|s| s.id.clone());
        for state in component.states() {
            let is_active = active.as_deref() == Some(state.id.as_str());
            let panel = doc.insert(&panel_id(id, &state.id));
            panel.visible = is_active;
            let trigger = doc.insert(&tab_id(id, &state.id));
            trigger.enabled = !state.disabled;
            trigger
                .attrs
                .insert("aria-selected".to_string(), Value::Bool(is_active));
        }

        if let Some(data) = component.data() {
            doc.insert(&results_id(id));
            for (index, item) in data.items.iter().enumerate() {
                doc.insert(&row_id(id, index)).attrs = item.clone();
            }
        }

        for rule in component.rules() {
            doc.insert(&rule.trigger.component_id);
            for action in &rule.actions {
                doc.insert(&action.target_id);
            }
        }
        doc
    }

    /// Inserts `id` if missing and returns it.
    pub fn insert(&mut self, id: &str) -> &mut ElementState {
        self.elements.entry(id.to_string()).or_default()
    }

    pub fn remove(&mut self, id: &str) -> Option<ElementState> {
        self.elements.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&ElementState> {
        self.elements.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ElementState> {
        self.elements.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    pub fn value(&self, id: &str) -> Value {
        self.get(id).map(|e| e.value.clone()).unwrap_or(Value::Null)
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.get(id).is_some_and(|e| e.visible)
    }
}

pub fn panel_id(component: &str, state: &str) -> String {
    format!("{component}-panel-{state}")
}

pub fn tab_id(component: &str, state: &str) -> String {
    format!("{component}-tab-{state}")
}

pub fn results_id(component: &str) -> String {
    format!("{component}-results")
}

pub fn row_id(component: &str, index: usize) -> String {
    format!("{component}-row-{index}")
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeInit,
    AfterInit,
    BeforeStateChange,
    AfterStateChange,
    /// Entering the keyed state.
    State(String),
    AfterFilter,
    Destroy,
}

impl HookPoint {
    fn can_cancel(&self) -> bool {
        matches!(self, Self::BeforeInit | Self::BeforeStateChange)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Proceed,
    /// Only honoured by `before*` hooks.
    Cancel,
    /// The hook threw; logged and treated as proceed.
    Fail(String),
}

type Hook = Box<dyn FnMut(&Value) -> HookOutcome + Send>;

#[derive(Default)]
pub struct HookSet {
    hooks: HashMap<HookPoint, Hook>,
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.hooks.keys()).finish()
    }
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, point: HookPoint, hook: F) -> Self
    where
        F: FnMut(&Value) -> HookOutcome + Send + 'static,
    {
        self.hooks.insert(point, Box::new(hook));
        self
    }

    /// Runs the hook at `point`; returns false only for an honoured cancel.
    fn run(&mut self, point: HookPoint, context: &Value) -> bool {
        let Some(hook) = self.hooks.get_mut(&point) else {
            return true;
        };
        match hook(context) {
            HookOutcome::Proceed => true,
            HookOutcome::Cancel if point.can_cancel() => false,
            HookOutcome::Cancel => true,
            HookOutcome::Fail(err) => {
                tracing::warn!(hook = ?point, %err, "hook failed; continuing");
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Externals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalLoadError {
    #[error("external script {src} not found")]
    NotFound { src: String },
    #[error("external script {src} timed out")]
    TimedOut { src: String },
    #[error("onLoad for {src} failed: {reason}")]
    OnLoad { src: String, reason: String },
}

/// Loads external script resources.
///
/// Required scripts gate initialization. Optional ones load in the
/// background; their outcome is logged and never changes the lifecycle.
pub trait ExternalLoader {
    fn load(&mut self, script: &ExternalScript) -> Result<(), ExternalLoadError>;
}

/// Loader that treats every resource as already present.
#[derive(Debug, Default, Clone, Copy)]
pub struct Preloaded;

impl ExternalLoader for Preloaded {
    fn load(&mut self, _script: &ExternalScript) -> Result<(), ExternalLoadError> {
        Ok(())
    }
}

/// A third-party object handed to the controller at runtime.
pub trait ExternalObject: Send {
    /// Whether the object exposes a teardown method.
    fn has_destroy(&self) -> bool {
        false
    }

    fn destroy(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Only reserved names can be filled.
    #[error("name is not reserved in the external registry")]
    NotReserved,
    #[error("external registry was cleared by destroy()")]
    Cleared,
}

/// Non-owning store of runtime-registered objects.
///
/// Every reserved name starts empty, is filled by `register`, and the whole
/// registry is torn down and cleared once by `clear`.
#[derive(Default)]
pub struct ExternalRegistry {
    slots: BTreeMap<String, Option<Box<dyn ExternalObject>>>,
    cleared: bool,
}

impl fmt::Debug for ExternalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|(k, v)| (k, v.is_some())))
            .finish()
    }
}

impl ExternalRegistry {
    pub fn reserve<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            slots: names.into_iter().map(|n| (n.into(), None)).collect(),
            cleared: false,
        }
    }

    pub fn register(
        &mut self,
        name: &str,
        object: Box<dyn ExternalObject>,
    ) -> Result<(), RegistryError> {
        if self.cleared {
            return Err(RegistryError::Cleared);
        }
        let slot = self.slots.get_mut(name).ok_or(RegistryError::NotReserved)?;
        *slot = Some(object);
        Ok(())
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(Option::is_some)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Tears down every registered object that supports it; returns how many.
    pub fn clear(&mut self) -> usize {
        let mut destroyed = 0;
        for object in self.slots.values_mut().filter_map(Option::as_mut) {
            if object.has_destroy() {
                object.destroy();
                destroyed += 1;
            }
        }
        self.slots.clear();
        self.cleared = true;
        destroyed
    }
}

// ---------------------------------------------------------------------------
// Managers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched { from: Option<String>, to: String },
    /// Unknown, disabled, unavailable or already active target.
    Ignored,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct StatesManager {
    component: String,
    states: Vec<ComponentState>,
    active: Option<String>,
    initial: Option<String>,
}

impl StatesManager {
    pub fn new(component: &str, states: &[ComponentState]) -> Self {
        let initial = initial_state(states).map(|s| s.id.clone());
        Self {
            component: component.to_string(),
            states: states.to_vec(),
            active: initial.clone(),
            initial,
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn initial(&self) -> Option<&str> {
        self.initial.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.states.iter().any(|s| s.id == id)
    }

    fn available(&self, id: &str, doc: &Document) -> bool {
        let Some(state) = self.states.iter().find(|s| s.id == id) else {
            return false;
        };
        if state.disabled {
            return false;
        }
        match &state.condition {
            Some(TriggerCondition {
                component_id,
                condition,
                value,
            }) => condition.evaluate(&doc.value(component_id), value),
            None => true,
        }
    }

    fn switch_to(&mut self, id: &str, doc: &mut Document, hooks: &mut HookSet) -> SwitchOutcome {
        if self.active.as_deref() == Some(id) || !self.available(id, doc) {
            return SwitchOutcome::Ignored;
        }
        let from = self.active.clone();
        let context = json!({"from": from, "to": id});
        if !hooks.run(HookPoint::BeforeStateChange, &context) {
            return SwitchOutcome::Cancelled;
        }

        if let Some(prev) = &from {
            self.apply_visibility(prev, false, doc);
        }
        self.apply_visibility(id, true, doc);
        self.active = Some(id.to_string());
        SwitchOutcome::Switched {
            from,
            to: id.to_string(),
        }
    }

    fn apply_visibility(&self, state: &str, shown: bool, doc: &mut Document) {
        if let Some(panel) = doc.get_mut(&panel_id(&self.component, state)) {
            panel.visible = shown;
        }
        if let Some(tab) = doc.get_mut(&tab_id(&self.component, state)) {
            tab.attrs
                .insert("aria-selected".to_string(), Value::Bool(shown));
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataManager {
    component: String,
    items: Vec<Record>,
    filters: FilterSet,
    server_rows: bool,
    per_page: Option<usize>,
    page: usize,
    matched: Vec<usize>,
}

impl DataManager {
    pub fn new(component: &Component) -> Option<Self> {
        let data = component.data()?;
        let schema = data.effective_schema();
        let paginate = data.options.enable_pagination
            || component
                .detected()
                .has(crate::pattern::Optimization::Pagination);
        let server_rows = data.options.server_rendered
            || component.detected().primary_pattern == Pattern::ServerFilterable;
        Some(Self {
            component: component.id().to_string(),
            matched: (0..data.items.len()).collect(),
            items: data.items.clone(),
            filters: FilterSet::new(&schema),
            server_rows,
            per_page: paginate.then_some(data.options.items_per_page.max(1)),
            page: 1,
        })
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items matching the current filters, across all pages.
    pub fn visible_count(&self) -> usize {
        self.matched.len()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        match self.per_page {
            Some(per) => self.matched.len().div_ceil(per).max(1),
            None => 1,
        }
    }

    /// Records on the current page.
    pub fn page_items(&self) -> Vec<&Record> {
        let (start, end) = self.page_bounds();
        self.matched[start..end]
            .iter()
            .map(|&i| &self.items[i])
            .collect()
    }

    fn page_bounds(&self) -> (usize, usize) {
        match self.per_page {
            Some(per) => {
                let start = ((self.page - 1) * per).min(self.matched.len());
                (start, (start + per).min(self.matched.len()))
            }
            None => (0, self.matched.len()),
        }
    }

    pub fn set_page(&mut self, page: usize, doc: &mut Document) {
        self.page = page.clamp(1, self.page_count());
        self.render(doc);
    }

    fn apply(&mut self, updates: &Map<String, Value>, doc: &mut Document) -> usize {
        for (field, value) in updates {
            self.filters.update(field, value);
        }
        self.refilter(doc)
    }

    fn refilter(&mut self, doc: &mut Document) -> usize {
        self.matched = if self.server_rows {
            let filters = &self.filters;
            (0..self.items.len())
                .filter(|&i| match doc.get(&row_id(&self.component, i)) {
                    Some(row) => filters.matches_with(|f| row.attrs.get(f).cloned()),
                    None => false,
                })
                .collect()
        } else {
            (0..self.items.len())
                .filter(|&i| self.filters.matches(&self.items[i]))
                .collect()
        };
        self.page = 1;
        self.render(doc);
        self.matched.len()
    }

    fn render(&self, doc: &mut Document) {
        if self.server_rows {
            for i in 0..self.items.len() {
                if let Some(row) = doc.get_mut(&row_id(&self.component, i)) {
                    row.visible = self.matched.contains(&i);
                }
            }
        } else if let Some(results) = doc.get_mut(&results_id(&self.component)) {
            let (start, end) = self.page_bounds();
            results.value = Value::from(end - start);
        }
    }
}

#[derive(Debug, Clone)]
pub struct RulesManager {
    index: RuleIndex,
}

impl RulesManager {
    pub fn new(component: &Component) -> Self {
        Self {
            index: RuleIndex::new(component.rules()),
        }
    }

    pub fn index(&self) -> &RuleIndex {
        &self.index
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    LoadingExternals,
    Initializing,
    Ready,
    Error(String),
    Destroyed,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::LoadingExternals => "loading-externals",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Error(_) => "error",
            Self::Destroyed => "destroyed",
        }
    }
}

/// A dispatched component event, `strata:{name}` in the browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub name: String,
    pub detail: Value,
}

pub struct Controller<L: ExternalLoader = Preloaded> {
    component: Component,
    lifecycle: Lifecycle,
    doc: Document,
    hooks: HookSet,
    loader: L,
    registry: ExternalRegistry,
    states: Option<StatesManager>,
    data: Option<DataManager>,
    rules: Option<RulesManager>,
    state_filters: BTreeMap<String, Map<String, Value>>,
    notifications: Vec<Notification>,
}

impl Controller<Preloaded> {
    pub fn new(component: Component, doc: Document) -> Self {
        Self::with_loader(component, doc, Preloaded)
    }
}

impl<L: ExternalLoader> Controller<L> {
    pub fn with_loader(component: Component, doc: Document, loader: L) -> Self {
        let registry = ExternalRegistry::reserve(component.options().external_registry.clone());
        Self {
            component,
            lifecycle: Lifecycle::Uninitialized,
            doc,
            hooks: HookSet::new(),
            loader,
            registry,
            states: None,
            data: None,
            rules: None,
            state_filters: BTreeMap::new(),
            notifications: Vec::new(),
        }
    }

    pub fn hooks(mut self, hooks: HookSet) -> Self {
        self.hooks = hooks;
        self
    }

    /// Filter values re-applied whenever the keyed state becomes active.
    pub fn state_filters(mut self, filters: BTreeMap<String, Map<String, Value>>) -> Self {
        self.state_filters = filters;
        self
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn registry(&self) -> &ExternalRegistry {
        &self.registry
    }

    pub fn active_state(&self) -> Option<&str> {
        self.states.as_ref().and_then(StatesManager::active)
    }

    pub fn data(&self) -> Option<&DataManager> {
        self.data.as_ref()
    }

    pub fn visible_count(&self) -> Option<usize> {
        self.data.as_ref().map(DataManager::visible_count)
    }

    pub fn init(&mut self) -> &Lifecycle {
        if self.lifecycle != Lifecycle::Uninitialized {
            return &self.lifecycle;
        }
        let id = self.component.id().to_string();
        if !self.doc.contains(&id) {
            tracing::error!(component = %id, "container element not found");
            self.lifecycle = Lifecycle::Error(format!("container '{id}' not found"));
            return &self.lifecycle;
        }

        self.lifecycle = Lifecycle::LoadingExternals;
        let (required, optional): (Vec<_>, Vec<_>) = self
            .component
            .options()
            .external_scripts
            .iter()
            .cloned()
            .partition(|script| script.required);
        // Every required load is attempted; the first failure wins.
        let mut failure = None;
        for script in &required {
            match self.loader.load(script) {
                Ok(()) => tracing::debug!(src = %script.src, "external script loaded"),
                Err(err) => {
                    tracing::error!(src = %script.src, %err, "required external script failed");
                    failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = failure {
            self.lifecycle = Lifecycle::Error(err.to_string());
            self.emit("error", json!({"error": err.to_string()}));
            return &self.lifecycle;
        }

        self.lifecycle = Lifecycle::Initializing;
        if !self.hooks.run(HookPoint::BeforeInit, &json!({})) {
            tracing::debug!(component = %id, "initialization vetoed by beforeInit");
            self.lifecycle = Lifecycle::Uninitialized;
            return &self.lifecycle;
        }

        let pattern = self.component.detected().primary_pattern;
        if pattern.uses_states() {
            self.states = Some(StatesManager::new(&id, self.component.states()));
        }
        if pattern.uses_data() {
            self.data = DataManager::new(&self.component);
        }
        if pattern.uses_rules() {
            let rules = RulesManager::new(&self.component);
            let triggers = rules.index().triggers().to_vec();
            self.rules = Some(rules);
            for trigger in triggers {
                self.evaluate_trigger(&trigger);
            }
        }

        self.lifecycle = Lifecycle::Ready;
        self.hooks.run(HookPoint::AfterInit, &json!({}));
        self.emit("ready", json!({"pattern": pattern.as_str()}));

        for script in &optional {
            match self.loader.load(script) {
                Ok(()) => tracing::debug!(src = %script.src, "optional external script loaded"),
                Err(err) => tracing::warn!(src = %script.src, %err, "optional external script failed"),
            }
        }
        &self.lifecycle
    }

    /// Also honoured while initializing, so initial rule evaluation can
    /// target state panels.
    pub fn switch_to(&mut self, state: &str) -> SwitchOutcome {
        if !matches!(self.lifecycle, Lifecycle::Ready | Lifecycle::Initializing) {
            return SwitchOutcome::Ignored;
        }
        let Some(states) = self.states.as_mut() else {
            return SwitchOutcome::Ignored;
        };
        let outcome = states.switch_to(state, &mut self.doc, &mut self.hooks);
        if let SwitchOutcome::Switched { from, to } = &outcome {
            let context = json!({"from": from, "to": to});
            self.hooks.run(HookPoint::State(to.clone()), &context);
            self.emit("state-change", context.clone());

            if let Some(filters) = self.state_filters.get(to).cloned() {
                if let Some(data) = self.data.as_mut() {
                    let visible = data.apply(&filters, &mut self.doc);
                    self.after_filter(Value::Null, Value::Object(filters), visible);
                }
            }
            self.hooks.run(HookPoint::AfterStateChange, &context);
        }
        outcome
    }

    /// Returns the visible count after filtering, `None` without a dataset.
    pub fn update_filter(&mut self, field: &str, value: Value) -> Option<usize> {
        if self.lifecycle != Lifecycle::Ready {
            return None;
        }
        let data = self.data.as_mut()?;
        let mut updates = Map::new();
        updates.insert(field.to_string(), value.clone());
        let visible = data.apply(&updates, &mut self.doc);
        self.after_filter(Value::from(field), value, visible);
        Some(visible)
    }

    pub fn clear_filters(&mut self) -> Option<usize> {
        if self.lifecycle != Lifecycle::Ready {
            return None;
        }
        let data = self.data.as_mut()?;
        data.filters.clear();
        let visible = data.refilter(&mut self.doc);
        self.after_filter(Value::Null, Value::Null, visible);
        Some(visible)
    }

    pub fn set_page(&mut self, page: usize) {
        if let Some(data) = self.data.as_mut() {
            data.set_page(page, &mut self.doc);
            let page = data.page();
            self.emit("page-change", json!({"page": page}));
        }
    }

    fn after_filter(&mut self, field: Value, value: Value, visible: usize) {
        let total = self.data.as_ref().map(DataManager::total).unwrap_or(0);
        self.emit("filter", json!({"visible": visible, "total": total}));
        self.hooks.run(
            HookPoint::AfterFilter,
            &json!({"field": field, "value": value, "visible": visible, "total": total}),
        );

        if visible == 0 && self.component.detected().primary_pattern == Pattern::Complete {
            let has_fallback = self
                .states
                .as_ref()
                .is_some_and(|s| s.contains(NO_RESULTS_STATE));
            if has_fallback {
                self.switch_to(NO_RESULTS_STATE);
            }
        }
    }

    /// Simulates user input on a rule trigger element.
    pub fn set_value(&mut self, element: &str, value: Value) {
        self.doc.insert(element).value = value;
        if self.lifecycle == Lifecycle::Ready {
            self.evaluate_trigger(element);
        }
    }

    fn evaluate_trigger(&mut self, trigger: &str) {
        let Some(rules) = self.rules.as_ref() else {
            return;
        };
        let value = self.doc.value(trigger);
        let plan = rules.index().plan(trigger, &value);
        if plan.is_empty() {
            return;
        }
        for action in &plan {
            self.execute(action);
        }
        self.emit(
            "rules-applied",
            json!({"trigger": trigger, "actions": plan.len()}),
        );
    }

    fn execute(&mut self, planned: &PlannedAction) {
        let is_state = self
            .states
            .as_ref()
            .is_some_and(|s| s.contains(&planned.target_id));
        if is_state && matches!(planned.action, ActionKind::Show | ActionKind::Hide) {
            self.execute_on_state(planned);
            return;
        }

        let Some(target) = self.doc.get_mut(&planned.target_id) else {
            tracing::warn!(
                rule = %planned.rule_id,
                target = %planned.target_id,
                "rule target not found; action skipped"
            );
            return;
        };
        let text = planned
            .value
            .as_ref()
            .map(crate::filter::value_text)
            .unwrap_or_default();
        match planned.action {
            ActionKind::Show => target.visible = true,
            ActionKind::Hide => target.visible = false,
            ActionKind::Enable => target.enabled = true,
            ActionKind::Disable => target.enabled = false,
            ActionKind::AddClass => {
                target.classes.insert(text);
            }
            ActionKind::RemoveClass => {
                target.classes.remove(&text);
            }
            ActionKind::SetValue => {
                target.value = planned.value.clone().unwrap_or(Value::Null);
            }
            ActionKind::SetText => target.text = text,
            ActionKind::SetHtml => target.html = text,
            ActionKind::Focus => target.focused = true,
            ActionKind::Blur => target.focused = false,
            ActionKind::Unknown => {}
        }
    }

    /// Show switches to the state; hide on the active state returns to the
    /// initial one.
    fn execute_on_state(&mut self, planned: &PlannedAction) {
        match planned.action {
            ActionKind::Show => {
                self.switch_to(&planned.target_id);
            }
            ActionKind::Hide => {
                let fallback = self.states.as_ref().and_then(|s| {
                    (s.active() == Some(planned.target_id.as_str()))
                        .then(|| s.initial().map(str::to_string))
                        .flatten()
                });
                if let Some(initial) = fallback.filter(|i| *i != planned.target_id) {
                    self.switch_to(&initial);
                }
            }
            _ => {}
        }
    }

    pub fn register_external(
        &mut self,
        name: &str,
        object: Box<dyn ExternalObject>,
    ) -> Result<(), RegistryError> {
        self.registry.register(name, object)?;
        self.emit("external-registered", json!({"name": name}));
        Ok(())
    }

    /// Terminal and idempotent. The controller is marked destroyed and torn
    /// down before `onDestroy` runs; the hook cannot delay or undo teardown.
    pub fn destroy(&mut self) -> usize {
        if self.lifecycle == Lifecycle::Destroyed {
            return 0;
        }
        self.lifecycle = Lifecycle::Destroyed;
        let destroyed = self.registry.clear();
        self.states = None;
        self.data = None;
        self.rules = None;
        self.emit("destroy", json!({"externals": destroyed}));
        self.hooks.run(HookPoint::Destroy, &json!({}));
        destroyed
    }

    fn emit(&mut self, name: &str, detail: Value) {
        tracing::debug!(component = %self.component.id(), event = name, "notify");
        self.notifications.push(Notification {
            name: name.to_string(),
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ComponentInput;
    use crate::model::{ConditionOperator, DependencyRule};
    use crate::options::DynamicOptions;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tabs(ids: &[&str]) -> Component {
        let states = ids.iter().map(|id| ComponentState::new(*id, *id)).collect();
        Component::new(
            "tabs",
            ComponentInput::StatesOnly(states),
            DynamicOptions::default(),
        )
        .expect("valid component")
    }

    fn ready(component: Component) -> Controller {
        let doc = Document::scaffold(&component);
        let mut controller = Controller::new(component, doc);
        assert_eq!(controller.init(), &Lifecycle::Ready);
        controller
    }

    #[test]
    fn test_switch_updates_panels_and_notifies() {
        let mut c = ready(tabs(&["a", "b"]));
        assert_eq!(
            c.switch_to("b"),
            SwitchOutcome::Switched {
                from: Some("a".to_string()),
                to: "b".to_string()
            }
        );
        assert!(c.document().is_visible("tabs-panel-b"));
        assert!(!c.document().is_visible("tabs-panel-a"));
        assert_eq!(c.notifications().last().map(|n| n.name.as_str()), Some("state-change"));
        assert_eq!(c.switch_to("b"), SwitchOutcome::Ignored);
        assert_eq!(c.switch_to("zzz"), SwitchOutcome::Ignored);
    }

    #[test]
    fn test_disabled_and_conditional_states_are_skipped() {
        let states = vec![
            ComponentState::new("a", "A"),
            ComponentState::new("b", "B").disabled(),
            ComponentState::new("c", "C").when(TriggerCondition::new(
                "plan",
                ConditionOperator::Equals,
                "pro",
            )),
        ];
        let component = Component::new(
            "t",
            ComponentInput::StatesOnly(states),
            DynamicOptions::default(),
        )
        .expect("valid");
        let mut c = ready(component);
        assert_eq!(c.switch_to("b"), SwitchOutcome::Ignored);
        assert_eq!(c.switch_to("c"), SwitchOutcome::Ignored);
        c.set_value("plan", json!("pro"));
        assert!(matches!(c.switch_to("c"), SwitchOutcome::Switched { .. }));
    }

    #[test]
    fn test_missing_container_is_an_error() {
        let component = tabs(&["a"]);
        let mut c = Controller::new(component, Document::new());
        assert!(matches!(c.init(), Lifecycle::Error(_)));
    }

    #[test]
    fn test_before_init_veto_leaves_uninitialized() {
        let component = tabs(&["a", "b"]);
        let doc = Document::scaffold(&component);
        let mut c = Controller::new(component, doc)
            .hooks(HookSet::new().on(HookPoint::BeforeInit, |_| HookOutcome::Cancel));
        assert_eq!(c.init(), &Lifecycle::Uninitialized);
        assert!(c.notifications().is_empty());
    }

    #[test]
    fn test_failing_hook_does_not_abort() {
        let component = tabs(&["a", "b"]);
        let doc = Document::scaffold(&component);
        let mut c = Controller::new(component, doc).hooks(
            HookSet::new()
                .on(HookPoint::BeforeStateChange, |_| HookOutcome::Fail("boom".into())),
        );
        c.init();
        assert!(matches!(c.switch_to("b"), SwitchOutcome::Switched { .. }));
    }

    struct FailingLoader;

    impl ExternalLoader for FailingLoader {
        fn load(&mut self, script: &ExternalScript) -> Result<(), ExternalLoadError> {
            Err(ExternalLoadError::NotFound {
                src: script.src.clone(),
            })
        }
    }

    /// Records load order and fails the listed sources.
    #[derive(Default)]
    struct RecordingLoader {
        requested: Arc<std::sync::Mutex<Vec<String>>>,
        failing: Vec<&'static str>,
    }

    impl ExternalLoader for RecordingLoader {
        fn load(&mut self, script: &ExternalScript) -> Result<(), ExternalLoadError> {
            if let Ok(mut requested) = self.requested.lock() {
                requested.push(script.src.clone());
            }
            if self.failing.iter().any(|src| *src == script.src) {
                Err(ExternalLoadError::TimedOut {
                    src: script.src.clone(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_external_failures() {
        let mut options = DynamicOptions::default();
        options.external_scripts = vec![ExternalScript::optional("/extra.js")];
        let input = ComponentInput::StatesOnly(vec![ComponentState::new("a", "A")]);
        let component = Component::new("x", input.clone(), options.clone()).expect("valid");
        let doc = Document::scaffold(&component);
        let mut c = Controller::with_loader(component, doc, FailingLoader);
        assert_eq!(c.init(), &Lifecycle::Ready);

        options.external_scripts = vec![ExternalScript::required("/map.js")];
        let component = Component::new("x", input, options).expect("valid");
        let doc = Document::scaffold(&component);
        let mut c = Controller::with_loader(component, doc, FailingLoader);
        assert!(matches!(c.init(), Lifecycle::Error(msg) if msg.contains("/map.js")));
        assert_eq!(c.notifications().last().map(|n| n.name.as_str()), Some("error"));
    }

    #[test]
    fn test_optional_externals_do_not_gate_ready() {
        let mut options = DynamicOptions::default();
        options.external_scripts = vec![
            ExternalScript::optional("/opt.js"),
            ExternalScript::required("/req-a.js"),
            ExternalScript::required("/req-b.js"),
        ];
        let component = Component::new(
            "x",
            ComponentInput::StatesOnly(vec![ComponentState::new("a", "A")]),
            options,
        )
        .expect("valid");
        let doc = Document::scaffold(&component);
        let loader = RecordingLoader {
            failing: vec!["/opt.js"],
            ..RecordingLoader::default()
        };
        let requested = Arc::clone(&loader.requested);
        let mut c = Controller::with_loader(component, doc, loader);
        assert_eq!(c.init(), &Lifecycle::Ready);
        assert_eq!(
            *requested.lock().expect("lock"),
            vec!["/req-a.js", "/req-b.js", "/opt.js"]
        );
        let ready_at = c.notifications().iter().position(|n| n.name == "ready");
        assert!(ready_at.is_some());
    }

    #[test]
    fn test_every_required_external_is_attempted() {
        let mut options = DynamicOptions::default();
        options.external_scripts = vec![
            ExternalScript::required("/first.js"),
            ExternalScript::required("/second.js"),
        ];
        let component = Component::new(
            "x",
            ComponentInput::StatesOnly(vec![ComponentState::new("a", "A")]),
            options,
        )
        .expect("valid");
        let doc = Document::scaffold(&component);
        let loader = RecordingLoader {
            failing: vec!["/first.js"],
            ..RecordingLoader::default()
        };
        let requested = Arc::clone(&loader.requested);
        let mut c = Controller::with_loader(component, doc, loader);
        assert_eq!(
            c.init(),
            &Lifecycle::Error("external script /first.js timed out".to_string())
        );
        assert_eq!(requested.lock().expect("lock").len(), 2);
    }

    struct Widget(Arc<AtomicUsize>);

    impl ExternalObject for Widget {
        fn has_destroy(&self) -> bool {
            true
        }

        fn destroy(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Inert;

    impl ExternalObject for Inert {}

    #[test]
    fn test_registry_lifecycle() {
        let options = DynamicOptions {
            external_registry: vec!["map".to_string(), "chart".to_string(), "misc".to_string()],
            ..DynamicOptions::default()
        };
        let component = Component::new(
            "x",
            ComponentInput::StatesOnly(vec![ComponentState::new("a", "A")]),
            options,
        )
        .expect("valid");
        let mut c = ready(component);
        assert!(c.registry().is_reserved("map"));
        assert!(!c.registry().is_registered("map"));

        let torn_down = Arc::new(AtomicUsize::new(0));
        c.register_external("map", Box::new(Widget(Arc::clone(&torn_down))))
            .expect("reserved");
        c.register_external("misc", Box::new(Inert)).expect("reserved");
        assert_eq!(
            c.register_external("unknown", Box::new(Inert)),
            Err(RegistryError::NotReserved)
        );
        assert!(c.registry().is_registered("map"));

        assert_eq!(c.destroy(), 1);
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);
        assert_eq!(c.registry().names().count(), 0);
        assert_eq!(c.lifecycle(), &Lifecycle::Destroyed);
        assert_eq!(
            c.register_external("map", Box::new(Inert)),
            Err(RegistryError::Cleared)
        );
        assert_eq!(
            RegistryError::NotReserved.to_string(),
            "name is not reserved in the external registry"
        );
    }

    #[test]
    fn test_destroy_is_terminal_and_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let component = tabs(&["a", "b"]);
        let doc = Document::scaffold(&component);
        let mut c = Controller::new(component, doc).hooks(HookSet::new().on(
            HookPoint::Destroy,
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                HookOutcome::Fail("teardown hook threw".into())
            },
        ));
        c.init();
        assert_eq!(c.destroy(), 0);
        assert_eq!(c.destroy(), 0);

        assert_eq!(c.lifecycle(), &Lifecycle::Destroyed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let destroys = c.notifications().iter().filter(|n| n.name == "destroy").count();
        assert_eq!(destroys, 1);
        assert_eq!(c.active_state(), None);
        assert_eq!(c.switch_to("b"), SwitchOutcome::Ignored);
        assert_eq!(c.init(), &Lifecycle::Destroyed);
    }

    #[test]
    fn test_rule_missing_target_is_skipped() {
        let rules = vec![
            DependencyRule::show_when("t", ConditionOperator::Equals, "x", "gone"),
            DependencyRule::show_when("t", ConditionOperator::Equals, "x", "here"),
        ];
        let component = Component::new(
            "form",
            ComponentInput::RulesOnly(rules),
            DynamicOptions::default(),
        )
        .expect("valid");
        let mut doc = Document::scaffold(&component);
        doc.remove("gone");
        let mut c = Controller::new(component, doc);
        c.init();
        c.set_value("t", json!("x"));
        assert!(c.document().is_visible("here"));
        assert!(!c.document().contains("gone"));
    }
}
