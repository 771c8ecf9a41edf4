//! Strata core crate.
//!
//! Everything here is independent of the emitted markup and script:
//!
//! - `model` + `input`: the component description and its validated,
//!   normalised form ([`Component`]).
//! - `pattern`: deterministic classification of a component into the
//!   cheapest client implementation that covers it.
//! - `filter` + `rules` + `schema`: filter and dependency-rule semantics.
//! - `runtime`: a headless controller executing those semantics against an
//!   in-memory document.
//!
//! The browser runtime produced by `strata-web` and the headless controller
//! implement the same contract; observable state after any sequence of
//! filter updates, state switches and rule triggers must agree between the
//! two.

pub mod error;
pub mod filter;
pub mod input;
pub mod model;
pub mod options;
pub mod pattern;
pub mod rules;
pub mod runtime;
pub mod schema;

pub use error::{StrataError, StrataResult};
pub use input::{Component, ComponentInput, ComponentSpec};
pub use model::{
    ActionKind, ComponentState, ConditionOperator, DatasetOptions, DependencyAction,
    DependencyRule, Element, FieldType, FilterOption, FilterableDataset, FilterableField,
    RangeSpec, Record, RuleTrigger, StateContent, TriggerCondition, TriggerEvent,
};
pub use options::{DetectionThresholds, DynamicOptions, ExternalScript, Hooks, OptionsOverride};
pub use pattern::{DetectedPattern, Optimization, Pattern, PatternFacts, detect, resolve};
pub use runtime::{Controller, Document, ExternalLoadError, Lifecycle};
