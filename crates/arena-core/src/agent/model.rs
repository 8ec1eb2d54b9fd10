//! Model-backed agents and the provider boundary.
//!
//! A provider turns a prompt into text. Failures come back either as an
//! `Err` or as text starting with [`PROVIDER_ERROR_SENTINEL`]; both are
//! surfaced as `AgentError::Provider` so the gateway routes them through
//! the same fallback path as a timeout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::{ActContext, Agent, AgentInit, AgentReply};
use crate::domain::{AgentError, AgentId};

/// Prefix some providers use instead of a transport error.
pub const PROVIDER_ERROR_SENTINEL: &str = "[provider-error]";

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are playing a turn-based game. Reply with a single JSON object that matches the action schema.";

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub turn: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub tokens: u64,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Credential/connectivity check run once during agent setup.
    async fn preflight(&self) -> Result<(), AgentError> {
        Ok(())
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, AgentError>;
}

/// Rough whitespace token count for providers that do not report usage.
fn approx_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Replays canned replies in order, cycling.
#[derive(Debug)]
pub struct ScriptedProvider {
    replies: Vec<String>,
    cursor: AtomicUsize,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            cursor: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Sleep before every reply (deadline testing).
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay = Duration::from_millis(delay_ms);
        self
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, AgentError> {
        if self.replies.is_empty() {
            return Err(AgentError::Provider("scripted provider has no replies".to_string()));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        let text = self.replies[i].clone();
        Ok(ModelResponse {
            tokens: approx_tokens(&text),
            text,
        })
    }
}

/// Answers with the prompt it received.
#[derive(Debug, Default)]
pub struct EchoProvider;

#[async_trait]
impl ModelProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, AgentError> {
        Ok(ModelResponse {
            tokens: approx_tokens(&request.prompt),
            text: request.prompt,
        })
    }
}

/// Stands in for a provider whose credentials or endpoint are broken.
#[derive(Debug)]
pub struct UnreachableProvider {
    reason: String,
}

impl UnreachableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ModelProvider for UnreachableProvider {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn preflight(&self) -> Result<(), AgentError> {
        Err(AgentError::Unreachable(self.reason.clone()))
    }

    async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, AgentError> {
        Ok(ModelResponse {
            text: format!("{PROVIDER_ERROR_SENTINEL} {}", self.reason),
            tokens: 0,
        })
    }
}

/// Aborts the wrapped task when dropped, e.g. when the gateway deadline
/// wins the race and drops the `act` future.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Agent that prompts a [`ModelProvider`] and returns its raw text.
pub struct ModelAgent {
    id: AgentId,
    provider: Arc<dyn ModelProvider>,
    system_prompt: String,
    schema_text: String,
}

impl ModelAgent {
    pub fn new(id: impl Into<AgentId>, provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            id: id.into(),
            provider,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            schema_text: String::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    fn format_prompt(&self, observation: &Value, turn: u32) -> String {
        format!(
            "Turn {turn}.\nAction schema:\n{}\nObservation:\n{}\nYour action:",
            self.schema_text, observation
        )
    }
}

#[async_trait]
impl Agent for ModelAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn init(&mut self, init: &AgentInit) -> Result<(), AgentError> {
        self.schema_text = init.action_schema.to_string();
        self.provider.preflight().await
    }

    async fn act(
        &mut self,
        observation: &Value,
        ctx: &mut ActContext,
    ) -> Result<AgentReply, AgentError> {
        let request = ModelRequest {
            system_prompt: self.system_prompt.clone(),
            prompt: self.format_prompt(observation, ctx.turn),
            turn: ctx.turn,
        };
        let provider = Arc::clone(&self.provider);
        let mut call = AbortOnDrop(tokio::spawn(async move { provider.complete(request).await }));

        let response = (&mut call.0)
            .await
            .map_err(|e| AgentError::Provider(format!("provider task failed: {e}")))??;

        if let Some(rest) = response.text.strip_prefix(PROVIDER_ERROR_SENTINEL) {
            return Err(AgentError::Provider(rest.trim().to_string()));
        }
        Ok(AgentReply::Raw {
            text: response.text,
            tokens: response.tokens,
        })
    }
}
