//! Scenario contract and the built-in scenarios.
//!
//! A scenario is a pure state machine. It never performs I/O, and every
//! bit of randomness comes from an RNG seeded at `init` whose output is
//! stored in the state, so re-running the same actions from the same seed
//! reproduces the same states exactly.

mod nim;
mod number_guess;
mod rock_paper_scissors;

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{AgentId, ScenarioError, Seed};

pub use nim::Nim;
pub use number_guess::NumberGuess;
pub use rock_paper_scissors::RockPaperScissors;

/// Result of applying one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjudication<S> {
    pub valid: bool,
    pub state: S,
    pub feedback: Value,
}

/// Static facts the classifier and the tournament need about a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioHints {
    /// Agents per match.
    pub seats: usize,
    /// The action that means "do nothing".
    pub noop_action: Value,
    pub default_max_turns: u32,
}

/// The state-transition contract every scenario implements.
pub trait Scenario: Send + Sync {
    type State: Clone + Send + Sync + Debug;

    fn id(&self) -> &'static str;

    /// JSON Schema every agent action must satisfy.
    fn action_schema(&self) -> Value;

    /// Substituted when an agent fails to produce a usable action.
    fn fallback_action(&self) -> Value {
        json!({ "noop": true })
    }

    fn hints(&self) -> ScenarioHints;

    fn init(&self, seed: Seed, agent_ids: &[AgentId]) -> Result<Self::State, ScenarioError>;

    /// Agents that act this turn, in order.
    fn turn_order(&self, state: &Self::State) -> Vec<AgentId>;

    /// The agent-visible view of `state`. Must not expose other agents'
    /// private fields.
    fn observe(&self, state: &Self::State, agent_id: &str) -> Value;

    /// Apply `action`. Invalid actions return `valid: false`; they never
    /// fail.
    fn adjudicate(
        &self,
        state: &Self::State,
        agent_id: &str,
        action: &Value,
    ) -> Adjudication<Self::State>;

    /// Once true, stays true.
    fn is_terminal(&self, state: &Self::State) -> bool;

    fn score(&self, state: &Self::State) -> BTreeMap<AgentId, f64>;

    /// JSON-safe snapshot recorded in `StateUpdated` events.
    fn summarize(&self, state: &Self::State) -> Value;
}

pub(crate) fn require_seats(
    scenario: &str,
    agent_ids: &[AgentId],
    min: usize,
    max: usize,
) -> Result<(), ScenarioError> {
    if agent_ids.len() < min || agent_ids.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min}..={max}")
        };
        return Err(ScenarioError::SeatCount {
            scenario: scenario.to_string(),
            expected,
            actual: agent_ids.len(),
        });
    }
    let mut seen = std::collections::BTreeSet::new();
    for id in agent_ids {
        if !seen.insert(id) {
            return Err(ScenarioError::InvalidConfig(format!(
                "duplicate agent id: {id}"
            )));
        }
    }
    Ok(())
}

pub(crate) fn is_noop(action: &Value) -> bool {
    action.get("noop").and_then(Value::as_bool) == Some(true)
}

/// Scenario selection as it appears in config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ScenarioSpec {
    NumberGuess {
        #[serde(default = "default_min")]
        min: i64,
        #[serde(default = "default_max")]
        max: i64,
    },
    RockPaperScissors {
        #[serde(default = "default_rounds")]
        rounds: u32,
    },
    Nim {
        #[serde(default = "default_pile")]
        pile: u32,
        #[serde(default = "default_max_take")]
        max_take: u32,
    },
}

fn default_min() -> i64 {
    1
}

fn default_max() -> i64 {
    100
}

fn default_rounds() -> u32 {
    5
}

fn default_pile() -> u32 {
    15
}

fn default_max_take() -> u32 {
    3
}

/// Run `$body` with `$s` bound to the concrete scenario for `$spec`.
macro_rules! with_scenario {
    ($spec:expr, |$s:ident| $body:expr) => {
        match $spec {
            $crate::scenario::ScenarioSpec::NumberGuess { min, max } => {
                let $s = $crate::scenario::NumberGuess::new(*min, *max);
                $body
            }
            $crate::scenario::ScenarioSpec::RockPaperScissors { rounds } => {
                let $s = $crate::scenario::RockPaperScissors::new(*rounds);
                $body
            }
            $crate::scenario::ScenarioSpec::Nim { pile, max_take } => {
                let $s = $crate::scenario::Nim::new(*pile, *max_take);
                $body
            }
        }
    };
}
pub(crate) use with_scenario;

impl ScenarioSpec {
    /// Default configuration for a bare kind name, e.g. `"nim"`.
    pub fn from_kind(kind: &str) -> Result<Self, ScenarioError> {
        serde_json::from_value(json!({ "kind": kind }))
            .map_err(|_| ScenarioError::UnknownKind(kind.to_string()))
    }

    pub fn id(&self) -> &'static str {
        with_scenario!(self, |s| s.id())
    }

    pub fn hints(&self) -> ScenarioHints {
        with_scenario!(self, |s| s.hints())
    }

    pub fn action_schema(&self) -> Value {
        with_scenario!(self, |s| s.action_schema())
    }

    pub fn fallback_action(&self) -> Value {
        with_scenario!(self, |s| s.fallback_action())
    }

    /// Reject configurations no match could run with.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        match self {
            ScenarioSpec::NumberGuess { min, max } if min >= max => {
                Err(ScenarioError::InvalidConfig(format!(
                    "number-guess needs min < max, got {min}..{max}"
                )))
            }
            ScenarioSpec::RockPaperScissors { rounds: 0 } => Err(ScenarioError::InvalidConfig(
                "rock-paper-scissors needs at least one round".to_string(),
            )),
            ScenarioSpec::Nim { pile, max_take } if *pile == 0 || *max_take == 0 => {
                Err(ScenarioError::InvalidConfig(
                    "nim needs a non-empty pile and maxTake >= 1".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}
