//! Guess a secret integer in `[min, max]` with higher/lower feedback.
//!
//! Any number of agents may play; each guesses once per turn in seat
//! order and the first correct guess ends the match.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{is_noop, require_seats, Adjudication, Scenario, ScenarioHints};
use crate::domain::{AgentId, ScenarioError, Seed};

const SCORE_CEILING: f64 = 110.0;
const SCORE_PER_ATTEMPT: f64 = 10.0;
const SCORE_FLOOR: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct NumberGuess {
    min: i64,
    max: i64,
}

impl NumberGuess {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberGuessState {
    secret: i64,
    seats: Vec<AgentId>,
    attempts: BTreeMap<AgentId, u32>,
    last_guess: BTreeMap<AgentId, i64>,
    last_feedback: BTreeMap<AgentId, String>,
    solved_by: Option<AgentId>,
}

impl NumberGuessState {
    pub fn secret(&self) -> i64 {
        self.secret
    }
}

impl Scenario for NumberGuess {
    type State = NumberGuessState;

    fn id(&self) -> &'static str {
        "number-guess"
    }

    fn action_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "guess": { "type": "integer" },
                "noop": { "const": true }
            },
            "anyOf": [
                { "required": ["guess"] },
                { "required": ["noop"] }
            ]
        })
    }

    fn hints(&self) -> ScenarioHints {
        ScenarioHints {
            seats: 1,
            noop_action: self.fallback_action(),
            default_max_turns: 20,
        }
    }

    fn init(&self, seed: Seed, agent_ids: &[AgentId]) -> Result<Self::State, ScenarioError> {
        if self.min >= self.max {
            return Err(ScenarioError::InvalidConfig(format!(
                "number-guess needs min < max, got {}..{}",
                self.min, self.max
            )));
        }
        require_seats(self.id(), agent_ids, 1, usize::MAX)?;

        let mut rng = ChaCha8Rng::seed_from_u64(u64::from(seed));
        let secret = rng.random_range(self.min..=self.max);

        Ok(NumberGuessState {
            secret,
            seats: agent_ids.to_vec(),
            attempts: agent_ids.iter().map(|id| (id.clone(), 0)).collect(),
            last_guess: BTreeMap::new(),
            last_feedback: BTreeMap::new(),
            solved_by: None,
        })
    }

    fn turn_order(&self, state: &Self::State) -> Vec<AgentId> {
        state.seats.clone()
    }

    fn observe(&self, state: &Self::State, agent_id: &str) -> Value {
        json!({
            "min": self.min,
            "max": self.max,
            "attempts": state.attempts.get(agent_id).copied().unwrap_or(0),
            "lastGuess": state.last_guess.get(agent_id),
            "lastFeedback": state.last_feedback.get(agent_id),
        })
    }

    fn adjudicate(
        &self,
        state: &Self::State,
        agent_id: &str,
        action: &Value,
    ) -> Adjudication<Self::State> {
        let mut next = state.clone();
        *next.attempts.entry(agent_id.to_string()).or_insert(0) += 1;

        let (valid, feedback) = if is_noop(action) {
            (true, "noop")
        } else {
            match action.get("guess").and_then(Value::as_i64) {
                Some(guess) if (self.min..=self.max).contains(&guess) => {
                    next.last_guess.insert(agent_id.to_string(), guess);
                    if guess < state.secret {
                        (true, "higher")
                    } else if guess > state.secret {
                        (true, "lower")
                    } else {
                        if next.solved_by.is_none() {
                            next.solved_by = Some(agent_id.to_string());
                        }
                        (true, "correct")
                    }
                }
                _ => (false, "invalid"),
            }
        };

        next.last_feedback
            .insert(agent_id.to_string(), feedback.to_string());
        Adjudication {
            valid,
            state: next,
            feedback: json!(feedback),
        }
    }

    fn is_terminal(&self, state: &Self::State) -> bool {
        state.solved_by.is_some()
    }

    fn score(&self, state: &Self::State) -> BTreeMap<AgentId, f64> {
        state
            .seats
            .iter()
            .map(|id| {
                let score = if state.solved_by.as_deref() == Some(id.as_str()) {
                    let attempts = f64::from(state.attempts.get(id).copied().unwrap_or(1));
                    (SCORE_CEILING - SCORE_PER_ATTEMPT * attempts).max(SCORE_FLOOR)
                } else {
                    0.0
                };
                (id.clone(), score)
            })
            .collect()
    }

    fn summarize(&self, state: &Self::State) -> Value {
        json!({
            "attempts": state.attempts,
            "lastGuess": state.last_guess,
            "lastFeedback": state.last_feedback,
            "solvedBy": state.solved_by,
            "_private": { "secret": state.secret },
        })
    }
}
