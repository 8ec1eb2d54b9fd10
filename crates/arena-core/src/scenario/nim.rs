//! Two-player single-pile Nim: take 1..=maxTake objects, whoever takes the
//! last object wins. A noop passes the move; so does an invalid take.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{is_noop, require_seats, Adjudication, Scenario, ScenarioHints};
use crate::domain::{AgentId, ScenarioError, Seed};

#[derive(Debug, Clone)]
pub struct Nim {
    pile: u32,
    max_take: u32,
}

impl Nim {
    pub fn new(pile: u32, max_take: u32) -> Self {
        Self { pile, max_take }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NimState {
    seats: Vec<AgentId>,
    pile: u32,
    to_move: usize,
    winner: Option<AgentId>,
}

impl Scenario for Nim {
    type State = NimState;

    fn id(&self) -> &'static str {
        "nim"
    }

    fn action_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "take": { "type": "integer", "minimum": 1, "maximum": self.max_take },
                "noop": { "const": true }
            },
            "anyOf": [
                { "required": ["take"] },
                { "required": ["noop"] }
            ]
        })
    }

    fn hints(&self) -> ScenarioHints {
        ScenarioHints {
            seats: 2,
            noop_action: self.fallback_action(),
            default_max_turns: self.pile.saturating_mul(2).max(2),
        }
    }

    fn init(&self, _seed: Seed, agent_ids: &[AgentId]) -> Result<Self::State, ScenarioError> {
        if self.pile == 0 || self.max_take == 0 {
            return Err(ScenarioError::InvalidConfig(
                "nim needs a non-empty pile and maxTake >= 1".to_string(),
            ));
        }
        require_seats(self.id(), agent_ids, 2, 2)?;
        Ok(NimState {
            seats: agent_ids.to_vec(),
            pile: self.pile,
            to_move: 0,
            winner: None,
        })
    }

    fn turn_order(&self, state: &Self::State) -> Vec<AgentId> {
        if state.winner.is_some() {
            return Vec::new();
        }
        vec![state.seats[state.to_move].clone()]
    }

    fn observe(&self, state: &Self::State, agent_id: &str) -> Value {
        json!({
            "pile": state.pile,
            "maxTake": self.max_take,
            "yourMove": state.seats.get(state.to_move).map(String::as_str) == Some(agent_id),
        })
    }

    fn adjudicate(
        &self,
        state: &Self::State,
        agent_id: &str,
        action: &Value,
    ) -> Adjudication<Self::State> {
        let mut next = state.clone();
        let on_move = state.winner.is_none() && state.seats[state.to_move] == agent_id;
        if !on_move {
            return Adjudication {
                valid: false,
                state: next,
                feedback: json!("not-your-move"),
            };
        }

        let limit = self.max_take.min(state.pile);
        let take = action
            .get("take")
            .and_then(Value::as_u64)
            .filter(|t| *t >= 1 && *t <= u64::from(limit));

        let (valid, feedback) = match take {
            Some(t) => {
                next.pile -= t as u32;
                if next.pile == 0 {
                    next.winner = Some(agent_id.to_string());
                    (true, json!("won"))
                } else {
                    (true, json!({ "took": t, "remaining": next.pile }))
                }
            }
            None if is_noop(action) => (true, json!("pass")),
            None => (false, json!("invalid")),
        };

        if next.winner.is_none() {
            next.to_move = (state.to_move + 1) % state.seats.len();
        }
        Adjudication {
            valid,
            state: next,
            feedback,
        }
    }

    fn is_terminal(&self, state: &Self::State) -> bool {
        state.winner.is_some()
    }

    fn score(&self, state: &Self::State) -> BTreeMap<AgentId, f64> {
        state
            .seats
            .iter()
            .map(|id| {
                let won = state.winner.as_deref() == Some(id.as_str());
                (id.clone(), if won { 1.0 } else { 0.0 })
            })
            .collect()
    }

    fn summarize(&self, state: &Self::State) -> Value {
        json!({
            "pile": state.pile,
            "toMove": state.seats[state.to_move],
            "winner": state.winner,
        })
    }
}
