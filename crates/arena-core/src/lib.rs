//! Arena-Core: the Agent Arena evaluation engine
//!
//! Runs scripted or model-backed agents against deterministic turn-based
//! scenarios, records every transition as an append-only event log,
//! classifies degenerate behaviour and folds results into signed
//! tournament bundles.
//!
//! ## Layer 1 - Evaluation
//!
//! Focus: deterministic matches, tolerant decoding, post-hoc analysis.
//!
//! ## Key Components
//!
//! - `Scenario`: pure state-machine contract, plus three built-in games
//! - `AgentGateway`: deadline race, budgets and fallback substitution
//! - `ActionDecoder`: free-form text to schema-valid action
//! - `run_match` / `run_match_to_dir`: the turn loop and its artifact directory
//! - `MatchProjection` / `replay_state`: state rebuilt by folding the log
//! - `classify`: failure-mode profile of a finished log
//! - `run_tournament`: schedules, standings and the signed bundle

pub mod agent;
pub mod classifier;
pub mod decoder;
pub mod domain;
pub mod gateway;
pub mod metrics;
pub mod obs;
pub mod replay;
pub mod runner;
pub mod scenario;
pub mod telemetry;
pub mod tournament;

pub use agent::{
    build_agent, ActContext, Agent, AgentInit, AgentKind, AgentReply, AgentSpec, ModelAgent,
    ModelProvider, ProviderSpec,
};
pub use classifier::{
    classify, ClassifierThresholds, FailureMode, FailureModeHit, FailureModeProfile,
    CLASSIFIER_VERSION,
};
pub use decoder::{ActionDecoder, DecodeLimits, DecodeOutcome, DecoderError};
pub use domain::{
    is_safe_id, ActionSource, AgentError, AgentId, ArenaError, DecodeMethod, EndReason,
    EventKind, FailureReason, LogError, MatchEvent, MatchSummary, Result, ScenarioError, Seed,
};
pub use gateway::{AgentGateway, GatewayConfig, GatewayOutcome, TranscriptEntry};
pub use replay::{
    parse_event_log, read_event_log, render_event_log, replay_spec, replay_state,
    validate_log, MatchProjection, ReplayReport,
};
pub use runner::{
    record_setup_failure, run_match, run_match_to_dir, run_spec_match, EventSink,
    JsonlEventSink, MatchConfig, MatchDir, MatchRecord, MemoryEventSink, SetupFailure,
};
pub use scenario::{Nim, NumberGuess, RockPaperScissors, Scenario, ScenarioHints, ScenarioSpec};
pub use tournament::{
    compute_standings, run_tournament, schedule, StandingsRow, TournamentConfig,
    TournamentOutcome,
};
