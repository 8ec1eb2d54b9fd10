//! Deterministic scripted agents used as baselines and in tests.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};

use super::{ActContext, Agent, AgentReply};
use crate::domain::{AgentError, AgentId};

/// Plays the same action every turn.
#[derive(Debug, Clone)]
pub struct ConstantAgent {
    id: AgentId,
    action: Value,
}

impl ConstantAgent {
    pub fn new(id: impl Into<AgentId>, action: Value) -> Self {
        Self {
            id: id.into(),
            action,
        }
    }
}

#[async_trait]
impl Agent for ConstantAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn act(&mut self, _obs: &Value, _ctx: &mut ActContext) -> Result<AgentReply, AgentError> {
        Ok(AgentReply::Action(self.action.clone()))
    }
}

/// Plays a fixed list of actions, cycling when it runs out.
#[derive(Debug, Clone)]
pub struct SequenceAgent {
    id: AgentId,
    actions: Vec<Value>,
    cursor: usize,
}

impl SequenceAgent {
    pub fn new(id: impl Into<AgentId>, actions: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            actions,
            cursor: 0,
        }
    }
}

#[async_trait]
impl Agent for SequenceAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn act(&mut self, _obs: &Value, _ctx: &mut ActContext) -> Result<AgentReply, AgentError> {
        if self.actions.is_empty() {
            return Err(AgentError::InvalidConfig(format!(
                "sequence agent {} has no actions",
                self.id
            )));
        }
        let action = self.actions[self.cursor % self.actions.len()].clone();
        self.cursor += 1;
        Ok(AgentReply::Action(action))
    }
}

/// Picks uniformly among `choices` using the seeded context RNG.
#[derive(Debug, Clone)]
pub struct RandomChoiceAgent {
    id: AgentId,
    choices: Vec<Value>,
}

impl RandomChoiceAgent {
    pub fn new(id: impl Into<AgentId>, choices: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            choices,
        }
    }
}

#[async_trait]
impl Agent for RandomChoiceAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn act(&mut self, _obs: &Value, ctx: &mut ActContext) -> Result<AgentReply, AgentError> {
        if self.choices.is_empty() {
            return Err(AgentError::InvalidConfig(format!(
                "random agent {} has no choices",
                self.id
            )));
        }
        let pick = ctx.rng.random_range(0..self.choices.len());
        Ok(AgentReply::Action(self.choices[pick].clone()))
    }
}

/// Number-guess solver: bisects `[min, max]` using higher/lower feedback.
#[derive(Debug, Clone)]
pub struct BinarySearchAgent {
    id: AgentId,
    bounds: Option<(i64, i64)>,
}

impl BinarySearchAgent {
    pub fn new(id: impl Into<AgentId>) -> Self {
        Self {
            id: id.into(),
            bounds: None,
        }
    }
}

#[async_trait]
impl Agent for BinarySearchAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn act(&mut self, obs: &Value, _ctx: &mut ActContext) -> Result<AgentReply, AgentError> {
        let (mut lo, mut hi) = match self.bounds {
            Some(b) => b,
            None => {
                let min = obs.get("min").and_then(Value::as_i64);
                let max = obs.get("max").and_then(Value::as_i64);
                match (min, max) {
                    (Some(min), Some(max)) => (min, max),
                    _ => {
                        return Err(AgentError::Provider(
                            "observation has no min/max range".to_string(),
                        ))
                    }
                }
            }
        };

        let last_guess = obs.get("lastGuess").and_then(Value::as_i64);
        let feedback = obs.get("lastFeedback").and_then(Value::as_str);
        match (last_guess, feedback) {
            (Some(g), Some("higher")) => lo = g + 1,
            (Some(g), Some("lower")) => hi = g - 1,
            _ => {}
        }
        if lo > hi {
            hi = lo;
        }
        self.bounds = Some((lo, hi));

        let guess = lo + (hi - lo) / 2;
        Ok(AgentReply::Action(json!({ "guess": guess })))
    }
}
