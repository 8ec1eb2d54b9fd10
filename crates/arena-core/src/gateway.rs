//! Agent gateway: one per seat, wrapping an agent with a deadline,
//! call/token budgets and a diagnostic transcript.
//!
//! Each request races the agent against a deadline timer. Whichever
//! finishes first decides the outcome; the loser is dropped, which aborts
//! any in-flight provider task. Nothing is retried. Every failure yields
//! the scenario fallback immediately.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{sleep, Instant};

use crate::agent::{ActContext, Agent, AgentInit, AgentReply};
use crate::decoder::{ActionDecoder, DecodeOutcome};
use crate::domain::{ActionSource, AgentError, AgentId, DecodeMethod, FailureReason};
use crate::metrics::METRICS;
use crate::obs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub action_timeout_ms: u64,
    pub setup_timeout_ms: u64,
    /// Calls allowed per agent per match.
    pub max_calls: Option<u32>,
    /// Provider tokens allowed per agent per match.
    pub max_tokens: Option<u64>,
    /// Consecutive timeouts after which the agent forfeits the match.
    pub forfeit_after_timeouts: Option<u32>,
    pub max_raw_output_chars: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 5_000,
            setup_timeout_ms: 5_000,
            max_calls: None,
            max_tokens: None,
            forfeit_after_timeouts: None,
            max_raw_output_chars: 8_192,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    pub text: String,
    pub truncated: bool,
}

/// The action to adjudicate plus everything needed to log how it was
/// obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOutcome {
    pub action: Value,
    pub source: ActionSource,
    pub method: Option<DecodeMethod>,
    pub failure: Option<FailureReason>,
    pub detail: Option<String>,
    pub raw: Option<RawOutput>,
    pub elapsed_ms: u64,
}

/// One line of `transcript.jsonl`. Diagnostic only; wall-clock values make
/// it non-deterministic, which is why it is kept out of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub turn: u32,
    pub agent_id: AgentId,
    pub outcome: String,
    pub elapsed_ms: u64,
    pub tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<DecodeMethod>,
    pub raw_chars: usize,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

pub struct AgentGateway {
    agent: Box<dyn Agent>,
    decoder: Arc<ActionDecoder>,
    config: GatewayConfig,
    calls: u32,
    tokens: u64,
    consecutive_timeouts: u32,
    transcript: Vec<TranscriptEntry>,
}

fn truncate_chars(text: String, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text, false),
    }
}

impl AgentGateway {
    pub fn new(agent: Box<dyn Agent>, decoder: Arc<ActionDecoder>, config: GatewayConfig) -> Self {
        Self {
            agent,
            decoder,
            config,
            calls: 0,
            tokens: 0,
            consecutive_timeouts: 0,
            transcript: Vec::new(),
        }
    }

    pub fn agent_id(&self) -> &str {
        self.agent.id()
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn budget_exhausted(&self) -> bool {
        let calls_out = self.config.max_calls.is_some_and(|max| self.calls >= max);
        let tokens_out = self.config.max_tokens.is_some_and(|max| self.tokens >= max);
        calls_out || tokens_out
    }

    /// True once the consecutive-timeout threshold is reached.
    pub fn should_forfeit(&self) -> bool {
        self.config
            .forfeit_after_timeouts
            .is_some_and(|n| n > 0 && self.consecutive_timeouts >= n)
    }

    /// Run agent setup under the setup deadline.
    pub async fn init(&mut self, init: &AgentInit) -> Result<(), AgentError> {
        let limit_ms = self.config.setup_timeout_ms;
        tokio::select! {
            result = self.agent.init(init) => result,
            _ = sleep(Duration::from_millis(limit_ms)) => {
                Err(AgentError::Setup(format!("setup exceeded {limit_ms}ms")))
            }
        }
    }

    /// Ask the agent for an action. Never fails: every problem becomes a
    /// fallback outcome.
    pub async fn request_action(
        &mut self,
        observation: &Value,
        ctx: &mut ActContext,
    ) -> GatewayOutcome {
        let turn = ctx.turn;
        if self.budget_exhausted() {
            return self.fallback(
                turn,
                FailureReason::BudgetExhausted,
                "call or token budget exhausted".to_string(),
                0,
            );
        }

        self.calls += 1;
        let started = Instant::now();
        let limit = Duration::from_millis(self.config.action_timeout_ms);
        let reply = tokio::select! {
            reply = self.agent.act(observation, ctx) => Some(reply),
            _ = sleep(limit) => None,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match reply {
            None => {
                self.consecutive_timeouts += 1;
                self.fallback(
                    turn,
                    FailureReason::Timeout,
                    format!("no action within {}ms", self.config.action_timeout_ms),
                    elapsed_ms,
                )
            }
            Some(Err(e)) => {
                self.consecutive_timeouts = 0;
                self.fallback(turn, FailureReason::ProviderError, e.to_string(), elapsed_ms)
            }
            Some(Ok(AgentReply::Action(value))) => {
                self.consecutive_timeouts = 0;
                let decoded = self.decoder.decode_value(&value);
                self.finish(turn, decoded, None, 0, elapsed_ms)
            }
            Some(Ok(AgentReply::Raw { text, tokens })) => {
                self.consecutive_timeouts = 0;
                self.tokens = self.tokens.saturating_add(tokens);
                let (text, truncated) = truncate_chars(text, self.config.max_raw_output_chars);
                let decoded = self.decoder.decode(&text);
                self.finish(
                    turn,
                    decoded,
                    Some(RawOutput { text, truncated }),
                    tokens,
                    elapsed_ms,
                )
            }
        }
    }

    fn finish(
        &mut self,
        turn: u32,
        decoded: DecodeOutcome,
        raw: Option<RawOutput>,
        tokens: u64,
        elapsed_ms: u64,
    ) -> GatewayOutcome {
        let agent_id = self.agent.id().to_string();
        let (raw_chars, truncated) = raw
            .as_ref()
            .map(|r| (r.text.chars().count(), r.truncated))
            .unwrap_or((0, false));

        self.transcript.push(TranscriptEntry {
            turn,
            agent_id: agent_id.clone(),
            outcome: decoded
                .failure
                .map(|f| f.as_str().to_string())
                .unwrap_or_else(|| "ok".to_string()),
            elapsed_ms,
            tokens,
            method: decoded.method,
            raw_chars,
            truncated,
            warnings: decoded.warnings.clone(),
            errors: decoded.errors.clone(),
        });

        match decoded.failure {
            None => {
                if let Some(method) = decoded.method.filter(DecodeMethod::is_recovery) {
                    METRICS.inc_decode_recoveries();
                    obs::emit_decoder_recovered(&agent_id, turn, method.as_str());
                }
                GatewayOutcome {
                    action: decoded.action,
                    source: ActionSource::Agent,
                    method: decoded.method,
                    failure: None,
                    detail: None,
                    raw,
                    elapsed_ms,
                }
            }
            Some(reason) => {
                METRICS.inc_fallbacks();
                obs::emit_gateway_fallback(&agent_id, turn, reason.as_str());
                let detail = if decoded.errors.is_empty() {
                    reason.as_str().to_string()
                } else {
                    decoded.errors.join("; ")
                };
                GatewayOutcome {
                    action: decoded.action,
                    source: ActionSource::Fallback,
                    method: None,
                    failure: Some(reason),
                    detail: Some(detail),
                    raw,
                    elapsed_ms,
                }
            }
        }
    }

    fn fallback(
        &mut self,
        turn: u32,
        reason: FailureReason,
        detail: String,
        elapsed_ms: u64,
    ) -> GatewayOutcome {
        let agent_id = self.agent.id().to_string();
        METRICS.inc_fallbacks();
        obs::emit_gateway_fallback(&agent_id, turn, reason.as_str());
        self.transcript.push(TranscriptEntry {
            turn,
            agent_id,
            outcome: reason.as_str().to_string(),
            elapsed_ms,
            tokens: 0,
            method: None,
            raw_chars: 0,
            truncated: false,
            warnings: Vec::new(),
            errors: vec![detail.clone()],
        });
        GatewayOutcome {
            action: self.decoder.fallback().clone(),
            source: ActionSource::Fallback,
            method: None,
            failure: Some(reason),
            detail: Some(detail),
            raw: None,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ConstantAgent, ModelAgent, ScriptedProvider};
    use crate::decoder::DecodeLimits;
    use serde_json::json;

    fn decoder() -> Arc<ActionDecoder> {
        Arc::new(
            ActionDecoder::new(
                json!({"type": "object", "required": ["guess"]}),
                json!({"noop": true}),
                DecodeLimits::default(),
            )
            .expect("decoder"),
        )
    }

    fn model(replies: &[&str]) -> Box<dyn Agent> {
        let provider = ScriptedProvider::new(replies.iter().map(|s| s.to_string()).collect());
        Box::new(ModelAgent::new("m", Arc::new(provider)))
    }

    #[test]
    fn test_config_defaults() {
        let cfg: GatewayConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(cfg.action_timeout_ms, 5_000);
        assert_eq!(cfg.max_raw_output_chars, 8_192);
        assert_eq!(cfg.max_calls, None);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        let (t, cut) = truncate_chars("héllo".to_string(), 2);
        assert_eq!(t, "hé");
        assert!(cut);
        let (t, cut) = truncate_chars("hi".to_string(), 2);
        assert_eq!(t, "hi");
        assert!(!cut);
    }

    #[tokio::test]
    async fn test_structured_action_passes_through() {
        let agent = Box::new(ConstantAgent::new("c", json!({"guess": 3})));
        let mut gw = AgentGateway::new(agent, decoder(), GatewayConfig::default());
        let out = gw.request_action(&json!({}), &mut ActContext::new(1, 0)).await;
        assert_eq!(out.action, json!({"guess": 3}));
        assert_eq!(out.source, ActionSource::Agent);
        assert!(out.raw.is_none());
    }

    #[tokio::test]
    async fn test_raw_text_is_decoded_and_truncated() {
        let config = GatewayConfig {
            max_raw_output_chars: 20,
            ..GatewayConfig::default()
        };
        let mut gw = AgentGateway::new(
            model(&["{\"guess\": 9} and then a very long explanation"]),
            decoder(),
            config,
        );
        let out = gw.request_action(&json!({}), &mut ActContext::new(1, 0)).await;
        assert_eq!(out.action, json!({"guess": 9}));
        assert_eq!(out.method, Some(DecodeMethod::BraceExtract));
        let raw = out.raw.expect("raw");
        assert!(raw.truncated);
        assert_eq!(raw.text.chars().count(), 20);
    }

    #[tokio::test]
    async fn test_call_budget_yields_fallback_without_calling() {
        let config = GatewayConfig {
            max_calls: Some(1),
            ..GatewayConfig::default()
        };
        let mut gw = AgentGateway::new(model(&["{\"guess\": 1}"]), decoder(), config);
        let mut ctx = ActContext::new(1, 0);
        let first = gw.request_action(&json!({}), &mut ctx).await;
        assert_eq!(first.source, ActionSource::Agent);
        let second = gw.request_action(&json!({}), &mut ctx).await;
        assert_eq!(second.failure, Some(FailureReason::BudgetExhausted));
        assert_eq!(gw.calls(), 1);
        assert!(gw.budget_exhausted());
        assert_eq!(gw.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_provider_error_is_fallback() {
        let mut gw = AgentGateway::new(
            model(&["[provider-error] 503"]),
            decoder(),
            GatewayConfig::default(),
        );
        let out = gw.request_action(&json!({}), &mut ActContext::new(1, 0)).await;
        assert_eq!(out.failure, Some(FailureReason::ProviderError));
        assert_eq!(out.action, json!({"noop": true}));
    }
}
