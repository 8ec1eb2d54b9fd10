//! Tournaments: many matches, one set of standings, one signed bundle.
//!
//! - [`config`]: `TournamentConfig` and the deterministic match schedule
//! - [`orchestrator`]: bounded-concurrency execution
//! - [`standings`]: folding summaries into ranked rows
//! - [`bundle`]: the tournament-level artifacts, manifest and receipts

pub mod bundle;
pub mod config;
pub mod orchestrator;
pub mod standings;

pub use bundle::{
    write_bundle, MatchRef, StandingsDoc, MATCHES_DIR, STANDINGS_FILE, STANDINGS_RECEIPT_FILE,
    TOURNAMENT_FILE,
};
pub use config::{derive_seed, schedule, ScheduledMatch, TournamentConfig};
pub use orchestrator::{run_tournament, TournamentOutcome};
pub use standings::{compute_standings, StandingsRow};
