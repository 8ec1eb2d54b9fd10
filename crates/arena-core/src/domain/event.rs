//! Match events: the system of record for a match.
//!
//! A log is a gapless `seq` sequence starting at 0, all sharing one
//! `matchId`. No wall-clock data is recorded so identical inputs produce
//! byte-identical logs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AgentId, Seed};

/// Why a match ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    Completed,
    MaxTurnsReached,
    Forfeited,
    SetupFailed,
    BudgetExceeded,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Completed => "completed",
            EndReason::MaxTurnsReached => "maxTurnsReached",
            EndReason::Forfeited => "forfeited",
            EndReason::SetupFailed => "setupFailed",
            EndReason::BudgetExceeded => "budgetExceeded",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the action that reached adjudication came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ActionSource {
    Agent,
    Fallback,
}

/// Decoder strategy that produced a valid action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum DecodeMethod {
    Direct,
    Fenced,
    BraceExtract,
    Unwrapped,
}

impl DecodeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeMethod::Direct => "direct",
            DecodeMethod::Fenced => "fenced",
            DecodeMethod::BraceExtract => "brace-extract",
            DecodeMethod::Unwrapped => "unwrapped",
        }
    }

    /// Anything other than a clean parse of the whole output.
    pub fn is_recovery(&self) -> bool {
        !matches!(self, DecodeMethod::Direct)
    }
}

/// Machine-readable reason a fallback action was substituted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    NoJsonFound,
    SchemaValidationFailed,
    Timeout,
    BudgetExhausted,
    ProviderError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoJsonFound => "no-json-found",
            FailureReason::SchemaValidationFailed => "schema-validation-failed",
            FailureReason::Timeout => "timeout",
            FailureReason::BudgetExhausted => "budget-exhausted",
            FailureReason::ProviderError => "provider-error",
        }
    }

    /// The agent answered but the answer was unusable.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            FailureReason::NoJsonFound | FailureReason::SchemaValidationFailed
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of things that can happen in a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum EventKind {
    MatchStarted {
        scenario: String,
        seed: Seed,
        agent_ids: Vec<AgentId>,
        max_turns: u32,
    },

    TurnStarted {
        turn: u32,
    },

    ObservationEmitted {
        turn: u32,
        agent_id: AgentId,
        observation: Value,
    },

    ActionSubmitted {
        turn: u32,
        agent_id: AgentId,
        action: Value,
        source: ActionSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<DecodeMethod>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure: Option<FailureReason>,
    },

    /// The agent's output was rejected before adjudication.
    InvalidAction {
        turn: u32,
        agent_id: AgentId,
        reason: FailureReason,
        detail: String,
        fallback_action: Value,
    },

    ActionAdjudicated {
        turn: u32,
        agent_id: AgentId,
        action: Value,
        valid: bool,
        feedback: Value,
    },

    AgentRawOutput {
        turn: u32,
        agent_id: AgentId,
        text: String,
        truncated: bool,
    },

    StateUpdated {
        turn: u32,
        snapshot: Value,
    },

    MatchEnded {
        reason: EndReason,
        turns: u32,
        scores: BTreeMap<AgentId, f64>,
        winner: Option<AgentId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        forfeited_by: Option<AgentId>,
    },

    /// Provisioning failed before any turn. Carries the match identity
    /// because no `MatchStarted` precedes it.
    MatchSetupFailed {
        scenario: String,
        seed: Seed,
        agent_ids: Vec<AgentId>,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
    },
}

impl EventKind {
    /// Variant name as written in the `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::MatchStarted { .. } => "MatchStarted",
            EventKind::TurnStarted { .. } => "TurnStarted",
            EventKind::ObservationEmitted { .. } => "ObservationEmitted",
            EventKind::ActionSubmitted { .. } => "ActionSubmitted",
            EventKind::InvalidAction { .. } => "InvalidAction",
            EventKind::ActionAdjudicated { .. } => "ActionAdjudicated",
            EventKind::AgentRawOutput { .. } => "AgentRawOutput",
            EventKind::StateUpdated { .. } => "StateUpdated",
            EventKind::MatchEnded { .. } => "MatchEnded",
            EventKind::MatchSetupFailed { .. } => "MatchSetupFailed",
        }
    }

    /// Agent the event is about, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            EventKind::ObservationEmitted { agent_id, .. }
            | EventKind::ActionSubmitted { agent_id, .. }
            | EventKind::InvalidAction { agent_id, .. }
            | EventKind::ActionAdjudicated { agent_id, .. }
            | EventKind::AgentRawOutput { agent_id, .. } => Some(agent_id),
            EventKind::MatchSetupFailed { agent_id, .. } => agent_id.as_deref(),
            _ => None,
        }
    }
}

/// One line of the event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchEvent {
    pub seq: u64,
    pub match_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl MatchEvent {
    pub fn new(seq: u64, match_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            seq,
            match_id: match_id.into(),
            kind,
        }
    }
}
