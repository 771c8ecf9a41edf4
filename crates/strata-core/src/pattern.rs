//! Pattern detection.
//!
//! Picks the cheapest client implementation that covers the inputs. The
//! decision is a pure function of which inputs are present and how large
//! they are, evaluated in a fixed precedence order (first match wins):
//!
//! | inputs                 | pattern                                              |
//! |------------------------|------------------------------------------------------|
//! | states + data + rules  | `complete`                                           |
//! | states + data          | `filterable-states` above the stateful ceiling, else `stateful-data` |
//! | states + rules         | `dependent-states`                                   |
//! | data + rules           | `dependent-data`                                     |
//! | states                 | `pre-rendered-states` up to the ceiling, else `dynamic-states` |
//! | data                   | `client-filterable` up to the ceiling, else `server-filterable` |
//! | rules                  | `dependency-only`                                    |
//! | nothing                | `empty`                                              |
//!
//! Optimizations are advisory and never change the primary pattern.

use crate::input::ComponentInput;
use crate::options::{DetectionThresholds, DynamicOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pattern {
    PreRenderedStates,
    DynamicStates,
    ClientFilterable,
    ServerFilterable,
    DependencyOnly,
    StatefulData,
    FilterableStates,
    DependentStates,
    DependentData,
    Complete,
    #[default]
    Empty,
}

impl Pattern {
    pub const ALL: [Pattern; 11] = [
        Pattern::PreRenderedStates,
        Pattern::DynamicStates,
        Pattern::ClientFilterable,
        Pattern::ServerFilterable,
        Pattern::DependencyOnly,
        Pattern::StatefulData,
        Pattern::FilterableStates,
        Pattern::DependentStates,
        Pattern::DependentData,
        Pattern::Complete,
        Pattern::Empty,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreRenderedStates => "pre-rendered-states",
            Self::DynamicStates => "dynamic-states",
            Self::ClientFilterable => "client-filterable",
            Self::ServerFilterable => "server-filterable",
            Self::DependencyOnly => "dependency-only",
            Self::StatefulData => "stateful-data",
            Self::FilterableStates => "filterable-states",
            Self::DependentStates => "dependent-states",
            Self::DependentData => "dependent-data",
            Self::Complete => "complete",
            Self::Empty => "empty",
        }
    }

    pub fn uses_states(self) -> bool {
        matches!(
            self,
            Self::PreRenderedStates
                | Self::DynamicStates
                | Self::StatefulData
                | Self::FilterableStates
                | Self::DependentStates
                | Self::Complete
        )
    }

    pub fn uses_data(self) -> bool {
        matches!(
            self,
            Self::ClientFilterable
                | Self::ServerFilterable
                | Self::StatefulData
                | Self::FilterableStates
                | Self::DependentData
                | Self::Complete
        )
    }

    pub fn uses_rules(self) -> bool {
        matches!(
            self,
            Self::DependencyOnly | Self::DependentStates | Self::DependentData | Self::Complete
        )
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown pattern '{0}'")]
pub struct UnknownPattern(pub String);

impl FromStr for Pattern {
    type Err = UnknownPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Pattern::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| UnknownPattern(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Optimization {
    Pagination,
    LazyStateLoading,
    RuleGrouping,
    StateDataCoordination,
    RuleCoordination,
}

impl Optimization {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pagination => "pagination",
            Self::LazyStateLoading => "lazy-state-loading",
            Self::RuleGrouping => "rule-grouping",
            Self::StateDataCoordination => "state-data-coordination",
            Self::RuleCoordination => "rule-coordination",
        }
    }
}

/// Presence and size facts the detector works from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternFacts {
    pub has_states: bool,
    pub has_data: bool,
    pub has_rules: bool,
    pub has_renderer: bool,
    pub state_count: usize,
    pub data_size: usize,
    pub rule_count: usize,
    /// The caller asked for pagination regardless of size.
    pub pagination_requested: bool,
}

impl PatternFacts {
    pub fn of(input: &ComponentInput) -> Self {
        let states = input.states().map(<[_]>::len).unwrap_or(0);
        let data = input.data();
        let rules = input.rules().map(<[_]>::len).unwrap_or(0);
        Self {
            has_states: input.states().is_some(),
            has_data: data.is_some(),
            has_rules: input.rules().is_some(),
            has_renderer: data.is_some_and(|d| d.options.item_template.is_some()),
            state_count: states,
            data_size: data.map(|d| d.len()).unwrap_or(0),
            rule_count: rules,
            pagination_requested: data.is_some_and(|d| d.options.enable_pagination),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedPattern {
    pub has_states: bool,
    pub has_data: bool,
    pub has_rules: bool,
    pub has_renderer: bool,
    pub state_count: usize,
    pub data_size: usize,
    pub rule_count: usize,
    pub primary_pattern: Pattern,
    pub optimizations: Vec<Optimization>,
}

impl DetectedPattern {
    pub fn has(&self, optimization: Optimization) -> bool {
        self.optimizations.contains(&optimization)
    }
}

pub fn primary_pattern(facts: &PatternFacts, thresholds: &DetectionThresholds) -> Pattern {
    match (facts.has_states, facts.has_data, facts.has_rules) {
        (true, true, true) => Pattern::Complete,
        (true, true, false) => {
            if facts.data_size > thresholds.max_stateful_items {
                Pattern::FilterableStates
            } else {
                Pattern::StatefulData
            }
        }
        (true, false, true) => Pattern::DependentStates,
        (false, true, true) => Pattern::DependentData,
        (true, false, false) => {
            if facts.state_count <= thresholds.max_prerendered_states {
                Pattern::PreRenderedStates
            } else {
                Pattern::DynamicStates
            }
        }
        (false, true, false) => {
            if facts.data_size <= thresholds.max_client_items {
                Pattern::ClientFilterable
            } else {
                Pattern::ServerFilterable
            }
        }
        (false, false, true) => Pattern::DependencyOnly,
        (false, false, false) => Pattern::Empty,
    }
}

pub fn optimizations(facts: &PatternFacts, thresholds: &DetectionThresholds) -> Vec<Optimization> {
    let mut out = Vec::new();
    if facts.has_data && (facts.data_size > thresholds.pagination_items || facts.pagination_requested)
    {
        out.push(Optimization::Pagination);
    }
    if facts.has_states && facts.state_count > thresholds.max_prerendered_states {
        out.push(Optimization::LazyStateLoading);
    }
    if facts.has_rules && facts.rule_count > thresholds.rule_grouping_rules {
        out.push(Optimization::RuleGrouping);
    }
    if facts.has_states && facts.has_data {
        out.push(Optimization::StateDataCoordination);
    }
    if facts.has_rules && (facts.has_states || facts.has_data) {
        out.push(Optimization::RuleCoordination);
    }
    out
}

pub fn detect_facts(facts: PatternFacts, thresholds: &DetectionThresholds) -> DetectedPattern {
    DetectedPattern {
        has_states: facts.has_states,
        has_data: facts.has_data,
        has_rules: facts.has_rules,
        has_renderer: facts.has_renderer,
        state_count: facts.state_count,
        data_size: facts.data_size,
        rule_count: facts.rule_count,
        primary_pattern: primary_pattern(&facts, thresholds),
        optimizations: optimizations(&facts, thresholds),
    }
}

pub fn detect(input: &ComponentInput, thresholds: &DetectionThresholds) -> DetectedPattern {
    detect_facts(PatternFacts::of(input), thresholds)
}

/// Detection followed by the caller's `forcePattern`, if any. Unknown
/// names degrade to `fallbackPattern`.
pub fn resolve(input: &ComponentInput, options: &DynamicOptions) -> DetectedPattern {
    let mut detected = detect(input, &options.thresholds);
    if let Some(forced) = options.force_pattern.as_deref() {
        let pattern = match forced.parse::<Pattern>() {
            Ok(pattern) => pattern,
            Err(err) => {
                tracing::warn!(
                    %err,
                    fallback = %options.fallback_pattern,
                    "unsupported pattern requested; using fallback"
                );
                options.fallback_pattern
            }
        };
        tracing::debug!(detected = %detected.primary_pattern, forced = %pattern, "pattern forced");
        detected.primary_pattern = pattern;
    }
    tracing::debug!(
        pattern = %detected.primary_pattern,
        states = detected.state_count,
        items = detected.data_size,
        rules = detected.rule_count,
        "pattern detected"
    );
    detected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(states: usize, data: Option<usize>, rules: usize) -> PatternFacts {
        PatternFacts {
            has_states: states > 0,
            has_data: data.is_some(),
            has_rules: rules > 0,
            state_count: states,
            data_size: data.unwrap_or(0),
            rule_count: rules,
            ..PatternFacts::default()
        }
    }

    fn primary(states: usize, data: Option<usize>, rules: usize) -> Pattern {
        primary_pattern(&facts(states, data, rules), &DetectionThresholds::default())
    }

    #[test]
    fn test_truth_table() {
        assert_eq!(primary(2, Some(5), 1), Pattern::Complete);
        assert_eq!(primary(2, Some(100), 0), Pattern::StatefulData);
        assert_eq!(primary(2, Some(101), 0), Pattern::FilterableStates);
        assert_eq!(primary(2, None, 3), Pattern::DependentStates);
        assert_eq!(primary(0, Some(5), 3), Pattern::DependentData);
        assert_eq!(primary(0, None, 3), Pattern::DependencyOnly);
        assert_eq!(primary(0, None, 0), Pattern::Empty);
    }

    #[test]
    fn test_state_ceiling_boundary() {
        assert_eq!(primary(10, None, 0), Pattern::PreRenderedStates);
        assert_eq!(primary(11, None, 0), Pattern::DynamicStates);
    }

    #[test]
    fn test_client_ceiling_boundary() {
        assert_eq!(primary(0, Some(50), 0), Pattern::ClientFilterable);
        assert_eq!(primary(0, Some(51), 0), Pattern::ServerFilterable);
    }

    #[test]
    fn test_optimizations_are_additive() {
        let t = DetectionThresholds::default();
        let detected = detect_facts(facts(12, Some(600), 25), &t);
        assert_eq!(detected.primary_pattern, Pattern::Complete);
        assert_eq!(
            detected.optimizations,
            vec![
                Optimization::Pagination,
                Optimization::LazyStateLoading,
                Optimization::RuleGrouping,
                Optimization::StateDataCoordination,
                Optimization::RuleCoordination,
            ]
        );
        assert!(detect_facts(facts(0, Some(500), 0), &t).optimizations.is_empty());
    }

    #[test]
    fn test_pattern_names_round_trip_through_from_str() {
        for pattern in Pattern::ALL {
            assert_eq!(pattern.as_str().parse::<Pattern>(), Ok(pattern));
        }
        let err = "tabs".parse::<Pattern>().unwrap_err();
        assert_eq!(err, UnknownPattern("tabs".to_string()));
        assert_eq!(err.to_string(), "unknown pattern 'tabs'");
    }
}
