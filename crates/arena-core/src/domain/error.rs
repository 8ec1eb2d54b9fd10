//! Error taxonomy for arena-core.
//!
//! Malformed agent output, schema violations and provider failures are not
//! errors here; they travel as values (`DecodeOutcome`, `GatewayOutcome`)
//! and end up as events. The enums below cover setup failures, broken logs
//! and programmer mistakes.

use std::path::PathBuf;

/// Scenario configuration or state errors.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("invalid scenario config: {0}")]
    InvalidConfig(String),

    #[error("scenario {scenario} needs {expected} agents, got {actual}")]
    SeatCount {
        scenario: String,
        expected: String,
        actual: usize,
    },

    #[error("unknown scenario kind: {0}")]
    UnknownKind(String),
}

/// Agent provisioning and invocation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("agent setup failed: {0}")]
    Setup(String),

    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid agent config: {0}")]
    InvalidConfig(String),
}

/// Event log parsing and well-formedness errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("log is empty")]
    Empty,

    #[error("sequence gap: expected seq {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("event {seq} belongs to match {found}, expected {expected}")]
    MatchIdMismatch {
        seq: u64,
        expected: String,
        found: String,
    },

    #[error("log does not end with MatchEnded")]
    NotTerminated,

    #[error("event {seq} follows MatchEnded")]
    EventAfterEnd { seq: u64 },

    #[error("replay diverged at seq {seq}: {reason}")]
    ReplayDiverged { seq: u64, reason: String },
}

/// Top-level arena errors.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("match id collision: {match_id} already exists at {path}")]
    MatchIdCollision { match_id: String, path: PathBuf },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("setup failure aborted tournament in match {match_id}: {reason}")]
    SetupAborted { match_id: String, reason: String },

    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("decoder error: {0}")]
    Decoder(#[from] crate::decoder::DecoderError),

    #[error("attestation error: {0}")]
    Attest(#[from] arena_attest::AttestError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for arena-core operations.
pub type Result<T> = std::result::Result<T, ArenaError>;
