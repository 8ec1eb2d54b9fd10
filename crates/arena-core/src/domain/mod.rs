//! Domain model for Agent Arena.
//!
//! - `MatchEvent` / `EventKind`: the append-only match history
//! - `MatchSummary`: the immutable result derived from a finished log
//! - error taxonomy shared by every layer above

pub mod error;
pub mod event;
pub mod summary;

pub use error::{AgentError, ArenaError, LogError, Result, ScenarioError};
pub use event::{
    ActionSource, DecodeMethod, EndReason, EventKind, FailureReason, MatchEvent,
};
pub use summary::MatchSummary;

/// Agent identifier, unique within a match.
pub type AgentId = String;

/// The only source of randomness for a match.
pub type Seed = u32;

/// Ids that become directory names: non-empty `[A-Za-z0-9_-]`.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
