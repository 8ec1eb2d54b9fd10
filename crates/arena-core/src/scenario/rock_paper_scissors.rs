//! Two-player rock-paper-scissors over a fixed number of rounds.
//!
//! Both players act each turn in seat order. The first move of a round is
//! held as pending and never shown to the opponent; the second move
//! resolves the round. A noop or invalid move forfeits the round.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{is_noop, require_seats, Adjudication, Scenario, ScenarioHints};
use crate::domain::{AgentId, ScenarioError, Seed};

const MOVES: [&str; 3] = ["rock", "paper", "scissors"];

#[derive(Debug, Clone)]
pub struct RockPaperScissors {
    rounds: u32,
}

impl RockPaperScissors {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub moves: BTreeMap<AgentId, Option<String>>,
    pub winner: Option<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpsState {
    seats: Vec<AgentId>,
    /// `None` records a forfeited move.
    pending: BTreeMap<AgentId, Option<String>>,
    history: Vec<Round>,
    wins: BTreeMap<AgentId, u32>,
}

fn beats(a: &str, b: &str) -> bool {
    matches!(
        (a, b),
        ("rock", "scissors") | ("paper", "rock") | ("scissors", "paper")
    )
}

impl RockPaperScissors {
    fn resolve(&self, state: &mut RpsState) {
        let (p0, p1) = (&state.seats[0], &state.seats[1]);
        let m0 = state.pending.get(p0).cloned().flatten();
        let m1 = state.pending.get(p1).cloned().flatten();
        let winner = match (&m0, &m1) {
            (Some(a), Some(b)) if beats(a, b) => Some(p0.clone()),
            (Some(a), Some(b)) if beats(b, a) => Some(p1.clone()),
            (Some(_), None) => Some(p0.clone()),
            (None, Some(_)) => Some(p1.clone()),
            _ => None,
        };
        if let Some(w) = &winner {
            *state.wins.entry(w.clone()).or_insert(0) += 1;
        }
        state.history.push(Round {
            moves: std::mem::take(&mut state.pending),
            winner,
        });
    }
}

impl Scenario for RockPaperScissors {
    type State = RpsState;

    fn id(&self) -> &'static str {
        "rock-paper-scissors"
    }

    fn action_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "move": { "enum": MOVES },
                "noop": { "const": true }
            },
            "anyOf": [
                { "required": ["move"] },
                { "required": ["noop"] }
            ]
        })
    }

    fn hints(&self) -> ScenarioHints {
        ScenarioHints {
            seats: 2,
            noop_action: self.fallback_action(),
            default_max_turns: self.rounds,
        }
    }

    fn init(&self, _seed: Seed, agent_ids: &[AgentId]) -> Result<Self::State, ScenarioError> {
        if self.rounds == 0 {
            return Err(ScenarioError::InvalidConfig(
                "rock-paper-scissors needs at least one round".to_string(),
            ));
        }
        require_seats(self.id(), agent_ids, 2, 2)?;
        Ok(RpsState {
            seats: agent_ids.to_vec(),
            pending: BTreeMap::new(),
            history: Vec::new(),
            wins: agent_ids.iter().map(|id| (id.clone(), 0)).collect(),
        })
    }

    fn turn_order(&self, state: &Self::State) -> Vec<AgentId> {
        state
            .seats
            .iter()
            .filter(|id| !state.pending.contains_key(*id))
            .cloned()
            .collect()
    }

    fn observe(&self, state: &Self::State, agent_id: &str) -> Value {
        let history: Vec<Value> = state
            .history
            .iter()
            .map(|round| {
                let mine = round.moves.get(agent_id).cloned().flatten();
                let theirs = round
                    .moves
                    .iter()
                    .find(|(id, _)| id.as_str() != agent_id)
                    .and_then(|(_, m)| m.clone());
                json!({ "mine": mine, "theirs": theirs, "winner": round.winner })
            })
            .collect();
        let opponent_wins: u32 = state
            .wins
            .iter()
            .filter(|(id, _)| id.as_str() != agent_id)
            .map(|(_, w)| *w)
            .sum();
        json!({
            "round": state.history.len() + 1,
            "rounds": self.rounds,
            "myWins": state.wins.get(agent_id).copied().unwrap_or(0),
            "opponentWins": opponent_wins,
            "history": history,
        })
    }

    fn adjudicate(
        &self,
        state: &Self::State,
        agent_id: &str,
        action: &Value,
    ) -> Adjudication<Self::State> {
        let mut next = state.clone();
        if self.is_terminal(state) || !state.seats.iter().any(|s| s == agent_id) {
            return Adjudication {
                valid: false,
                state: next,
                feedback: json!("invalid"),
            };
        }

        let chosen = action
            .get("move")
            .and_then(Value::as_str)
            .filter(|m| MOVES.contains(m));
        let (valid, feedback) = match chosen {
            Some(_) => (true, "accepted"),
            None if is_noop(action) => (true, "forfeit-round"),
            None => (false, "invalid"),
        };
        next.pending
            .insert(agent_id.to_string(), chosen.map(str::to_string));

        if next.pending.len() == next.seats.len() {
            self.resolve(&mut next);
        }

        Adjudication {
            valid,
            state: next,
            feedback: json!(feedback),
        }
    }

    fn is_terminal(&self, state: &Self::State) -> bool {
        state.history.len() as u32 >= self.rounds
    }

    fn score(&self, state: &Self::State) -> BTreeMap<AgentId, f64> {
        state
            .wins
            .iter()
            .map(|(id, w)| (id.clone(), f64::from(*w)))
            .collect()
    }

    fn summarize(&self, state: &Self::State) -> Value {
        json!({
            "roundsPlayed": state.history.len(),
            "wins": state.wins,
            "pendingFrom": state.pending.keys().collect::<Vec<_>>(),
            "history": state.history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(rounds: u32) -> (RockPaperScissors, RpsState) {
        let game = RockPaperScissors::new(rounds);
        let state = game
            .init(0, &["a".to_string(), "b".to_string()])
            .expect("init");
        (game, state)
    }

    fn play(game: &RockPaperScissors, state: RpsState, a: Value, b: Value) -> RpsState {
        let s = game.adjudicate(&state, "a", &a).state;
        game.adjudicate(&s, "b", &b).state
    }

    #[test]
    fn test_round_resolution() {
        let (game, state) = setup(3);
        let state = play(&game, state, json!({"move": "rock"}), json!({"move": "scissors"}));
        let state = play(&game, state, json!({"move": "rock"}), json!({"move": "paper"}));
        let state = play(&game, state, json!({"move": "paper"}), json!({"move": "paper"}));
        assert!(game.is_terminal(&state));
        let scores = game.score(&state);
        assert_eq!(scores["a"], 1.0);
        assert_eq!(scores["b"], 1.0);
    }

    #[test]
    fn test_noop_forfeits_round() {
        let (game, state) = setup(1);
        let state = play(&game, state, json!({"noop": true}), json!({"move": "rock"}));
        assert_eq!(game.score(&state)["b"], 1.0);
    }

    #[test]
    fn test_pending_move_is_hidden_from_opponent() {
        let (game, state) = setup(2);
        let state = game
            .adjudicate(&state, "a", &json!({"move": "rock"}))
            .state;
        let obs = game.observe(&state, "b");
        assert!(!obs.to_string().contains("rock"));
        assert_eq!(game.turn_order(&state), vec!["b".to_string()]);
    }

    #[test]
    fn test_invalid_move_reports_invalid() {
        let (game, state) = setup(1);
        let adj = game.adjudicate(&state, "a", &json!({"move": "lizard"}));
        assert!(!adj.valid);
        assert_eq!(adj.feedback, json!("invalid"));
    }

    #[test]
    fn test_requires_two_players() {
        let game = RockPaperScissors::new(1);
        assert!(game.init(0, &["solo".to_string()]).is_err());
    }
}
