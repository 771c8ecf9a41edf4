//! Error types for component construction.

use thiserror::Error;

/// Errors raised while assembling a component from caller input.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Component ids become DOM ids and global names, so they cannot be blank.
    #[error("component id must not be empty")]
    EmptyComponentId,

    #[error("state id must not be empty (state #{index})")]
    EmptyStateId { index: usize },

    #[error("duplicate state id '{id}'")]
    DuplicateStateId { id: String },

    /// A schema field breaks the `range` iff `type = range` invariant, or
    /// names nothing.
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("rule '{rule}' has no trigger component id")]
    MissingTrigger { rule: String },

    #[error("state hook references unknown state '{state}'")]
    UnknownStateHook { state: String },

    #[error("failed to parse component spec: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type StrataResult<T> = Result<T, StrataError>;
