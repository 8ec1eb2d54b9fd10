//! Agents: anything that can turn an observation into an action.
//!
//! Agents see the world only through `observe` output and draw randomness
//! only from the seeded RNG in [`ActContext`]. Scripted agents answer with
//! structured actions; model-backed agents answer with raw text that the
//! gateway decodes.

mod model;
mod scripted;

use std::sync::Arc;

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AgentError, AgentId, Seed};

pub use model::{
    EchoProvider, ModelAgent, ModelProvider, ModelRequest, ModelResponse, ScriptedProvider,
    UnreachableProvider, PROVIDER_ERROR_SENTINEL,
};
pub use scripted::{BinarySearchAgent, ConstantAgent, RandomChoiceAgent, SequenceAgent};

/// What an agent learns before the first turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInit {
    pub match_id: String,
    pub scenario: String,
    pub seat: usize,
    pub action_schema: Value,
}

/// Per-agent context threaded through every `act` call.
#[derive(Debug, Clone)]
pub struct ActContext {
    pub turn: u32,
    pub seat: usize,
    pub rng: ChaCha8Rng,
}

impl ActContext {
    /// Each seat gets its own stream derived from the match seed.
    pub fn new(seed: Seed, seat: usize) -> Self {
        let stream = (u64::from(seed) << 32) | (seat as u64 & 0xFFFF_FFFF);
        Self {
            turn: 0,
            seat,
            rng: ChaCha8Rng::seed_from_u64(stream),
        }
    }
}

/// An agent's answer for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    /// Already structured; validated against the schema but not decoded.
    Action(Value),
    /// Free-form text for the decoder, with the tokens it cost.
    Raw { text: String, tokens: u64 },
}

#[async_trait]
pub trait Agent: Send {
    fn id(&self) -> &str;

    /// Provisioning and preflight. An error here is a setup failure.
    async fn init(&mut self, init: &AgentInit) -> Result<(), AgentError> {
        let _ = init;
        Ok(())
    }

    async fn act(
        &mut self,
        observation: &Value,
        ctx: &mut ActContext,
    ) -> Result<AgentReply, AgentError>;
}

/// Provider selection for model-backed agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ProviderSpec {
    /// Canned replies, cycled, optionally delayed.
    Scripted {
        replies: Vec<String>,
        #[serde(default)]
        delay_ms: u64,
    },
    /// Replies with the prompt it was given.
    Echo,
    /// Fails preflight.
    Unreachable {
        #[serde(default = "default_unreachable_reason")]
        reason: String,
    },
}

fn default_unreachable_reason() -> String {
    "connection refused".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AgentKind {
    Constant {
        action: Value,
    },
    Sequence {
        actions: Vec<Value>,
    },
    Random {
        choices: Vec<Value>,
    },
    BinarySearch,
    Model {
        provider: ProviderSpec,
        #[serde(default)]
        system_prompt: Option<String>,
    },
}

/// One roster entry in a match or tournament config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    pub id: AgentId,
    #[serde(flatten)]
    pub kind: AgentKind,
}

impl AgentSpec {
    pub fn new(id: impl Into<AgentId>, kind: AgentKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Instantiate a fresh agent. Every match gets its own instance.
pub fn build_agent(spec: &AgentSpec) -> Result<Box<dyn Agent>, AgentError> {
    let id = spec.id.clone();
    if id.is_empty() {
        return Err(AgentError::InvalidConfig("agent id must not be empty".to_string()));
    }
    let agent: Box<dyn Agent> = match &spec.kind {
        AgentKind::Constant { action } => Box::new(ConstantAgent::new(id, action.clone())),
        AgentKind::Sequence { actions } => {
            if actions.is_empty() {
                return Err(AgentError::InvalidConfig(format!(
                    "sequence agent {} has no actions",
                    spec.id
                )));
            }
            Box::new(SequenceAgent::new(id, actions.clone()))
        }
        AgentKind::Random { choices } => {
            if choices.is_empty() {
                return Err(AgentError::InvalidConfig(format!(
                    "random agent {} has no choices",
                    spec.id
                )));
            }
            Box::new(RandomChoiceAgent::new(id, choices.clone()))
        }
        AgentKind::BinarySearch => Box::new(BinarySearchAgent::new(id)),
        AgentKind::Model {
            provider,
            system_prompt,
        } => {
            let provider: Arc<dyn ModelProvider> = match provider {
                ProviderSpec::Scripted { replies, delay_ms } => {
                    Arc::new(ScriptedProvider::new(replies.clone()).with_delay_ms(*delay_ms))
                }
                ProviderSpec::Echo => Arc::new(EchoProvider),
                ProviderSpec::Unreachable { reason } => {
                    Arc::new(UnreachableProvider::new(reason.clone()))
                }
            };
            let mut agent = ModelAgent::new(id, provider);
            if let Some(prompt) = system_prompt {
                agent = agent.with_system_prompt(prompt.clone());
            }
            Box::new(agent)
        }
    };
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use serde_json::json;

    #[test]
    fn test_agent_spec_wire_format() {
        let spec: AgentSpec = serde_json::from_value(json!({
            "id": "llm",
            "kind": "model",
            "systemPrompt": "play well",
            "provider": {"type": "scripted", "replies": ["{\"guess\": 50}"], "delayMs": 10}
        }))
        .expect("parse");
        assert_eq!(spec.id, "llm");
        match &spec.kind {
            AgentKind::Model {
                provider: ProviderSpec::Scripted { delay_ms, .. },
                system_prompt,
            } => {
                assert_eq!(*delay_ms, 10);
                assert_eq!(system_prompt.as_deref(), Some("play well"));
            }
            other => panic!("unexpected kind {other:?}"),
        }

        let simple: AgentSpec =
            serde_json::from_value(json!({"id": "bs", "kind": "binary-search"})).expect("parse");
        assert_eq!(simple.kind, AgentKind::BinarySearch);
    }

    #[test]
    fn test_build_agent_rejects_empty_sequences() {
        let spec = AgentSpec::new("s", AgentKind::Sequence { actions: vec![] });
        assert!(build_agent(&spec).is_err());
        let spec = AgentSpec::new("", AgentKind::BinarySearch);
        assert!(build_agent(&spec).is_err());
    }

    #[test]
    fn test_act_context_streams_are_seeded_per_seat() {
        let mut a = ActContext::new(42, 0);
        let mut a2 = ActContext::new(42, 0);
        let mut b = ActContext::new(42, 1);
        let xa: u64 = a.rng.random();
        let xa2: u64 = a2.rng.random();
        let xb: u64 = b.rng.random();
        assert_eq!(xa, xa2);
        assert_ne!(xa, xb);
    }
}
