//! Failure-mode classifier.
//!
//! A pure function from a finished event log to a [`FailureModeProfile`].
//! Each rule in [`rules::RULES`] scans the log independently and emits at
//! most one hit per agent; the profile is rendered with agents and hits in
//! lexicographic order so the same log always serialises to the same bytes.

mod rules;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{AgentId, MatchEvent};
use crate::scenario::ScenarioHints;

use rules::{RuleInput, RULES};

/// Bumped whenever a rule's semantics change.
pub const CLASSIFIER_VERSION: &str = "fm-1";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierThresholds {
    /// Consecutive no-op actions that count as a loop.
    pub noop_run: u32,
    /// Consecutive rejected outputs that count as a streak.
    pub invalid_run: u32,
    /// Tolerant decodes needed before format drift is reported.
    pub drift_min_count: u32,
    /// Trailing actions inspected for storm behaviour.
    pub storm_window: u32,
    /// A window with at most this many distinct actions is a storm.
    pub storm_max_distinct: u32,
    /// Consecutive timeouts that count as a streak.
    pub timeout_run: u32,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            noop_run: 3,
            invalid_run: 3,
            drift_min_count: 2,
            storm_window: 6,
            storm_max_distinct: 1,
            timeout_run: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    NoopLoop,
    InvalidStreak,
    FormatDrift,
    TruncatedOutput,
    TimeoutStreak,
    BudgetExceeded,
    ActionStorm,
    MaxTurnsStall,
}

impl FailureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMode::NoopLoop => "noop-loop",
            FailureMode::InvalidStreak => "invalid-streak",
            FailureMode::FormatDrift => "format-drift",
            FailureMode::TruncatedOutput => "truncated-output",
            FailureMode::TimeoutStreak => "timeout-streak",
            FailureMode::BudgetExceeded => "budget-exceeded",
            FailureMode::ActionStorm => "action-storm",
            FailureMode::MaxTurnsStall => "max-turns-stall",
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureModeHit {
    pub code: FailureMode,
    pub count: u32,
    /// `count / opportunities`, rounded to four decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Event type the detecting rule scans.
    pub detector_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureModeProfile {
    pub classifier_version: String,
    /// Every agent in the roster, hits sorted by code.
    pub agents: BTreeMap<AgentId, Vec<FailureModeHit>>,
}

impl FailureModeProfile {
    pub fn hits_for(&self, agent_id: &str) -> &[FailureModeHit] {
        self.agents.get(agent_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, agent_id: &str, code: FailureMode) -> bool {
        self.hits_for(agent_id).iter().any(|h| h.code == code)
    }

    pub fn total_hits(&self) -> usize {
        self.agents.values().map(Vec::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Classify a finished log. `max_turns` overrides the budget recorded in
/// `MatchStarted` when given.
pub fn classify(
    events: &[MatchEvent],
    hints: &ScenarioHints,
    agent_ids: &[AgentId],
    max_turns: Option<u32>,
    thresholds: &ClassifierThresholds,
) -> FailureModeProfile {
    let input = RuleInput::new(events, hints, max_turns, thresholds);
    let mut agents = BTreeMap::new();

    for agent_id in agent_ids {
        let mut hits: Vec<FailureModeHit> = RULES
            .iter()
            .filter_map(|rule| rule(&input, agent_id))
            .collect();
        hits.sort_by(|a, b| a.code.as_str().cmp(b.code.as_str()));
        agents.insert(agent_id.clone(), hits);
    }

    FailureModeProfile {
        classifier_version: CLASSIFIER_VERSION.to_string(),
        agents,
    }
}
