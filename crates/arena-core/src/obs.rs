//! Structured observability hooks for match and tournament lifecycle.
//!
//! Every emitter logs a stable `event = "..."` field so log pipelines can
//! filter on it regardless of the message text.

use tracing::{debug, info, warn};

/// RAII guard that enters a match-scoped span for the duration of a match.
///
/// ```ignore
/// let _span = MatchSpan::enter("r01-p00-alice-vs-bob");
/// // every tracing call now carries match_id
/// ```
pub struct MatchSpan {
    _span: tracing::span::EnteredSpan,
}

impl MatchSpan {
    pub fn enter(match_id: &str) -> Self {
        let span = tracing::info_span!("arena.match", match_id = %match_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_match_started(match_id: &str, scenario: &str, seed: u32, agents: usize) {
    info!(
        event = "match.started",
        match_id = %match_id,
        scenario = %scenario,
        seed = seed,
        agents = agents,
    );
}

/// Per-event trace; debug level because matches emit hundreds of these.
pub fn emit_event_appended(match_id: &str, kind: &str, seq: u64) {
    debug!(event = "match.event_appended", match_id = %match_id, kind = %kind, seq = seq);
}

pub fn emit_match_ended(match_id: &str, reason: &str, turns: u32, winner: Option<&str>) {
    info!(
        event = "match.ended",
        match_id = %match_id,
        reason = %reason,
        turns = turns,
        winner = winner.unwrap_or("-"),
    );
}

pub fn emit_match_setup_failed(match_id: &str, agent_id: Option<&str>, error: &str) {
    warn!(
        event = "match.setup_failed",
        match_id = %match_id,
        agent_id = agent_id.unwrap_or("-"),
        error = %error,
    );
}

pub fn emit_gateway_fallback(agent_id: &str, turn: u32, reason: &str) {
    warn!(event = "gateway.fallback", agent_id = %agent_id, turn = turn, reason = %reason);
}

pub fn emit_decoder_recovered(agent_id: &str, turn: u32, method: &str) {
    debug!(event = "decoder.recovered", agent_id = %agent_id, turn = turn, method = %method);
}

pub fn emit_tournament_started(name: &str, matches: usize, concurrency: usize) {
    info!(
        event = "tournament.started",
        tournament = %name,
        matches = matches,
        concurrency = concurrency,
    );
}

pub fn emit_tournament_finished(
    name: &str,
    matches: usize,
    setup_failures: usize,
    leader: Option<&str>,
) {
    info!(
        event = "tournament.finished",
        tournament = %name,
        matches = matches,
        setup_failures = setup_failures,
        leader = leader.unwrap_or("-"),
    );
}

pub fn emit_bundle_verified(root: &str, errors: usize, warnings: usize) {
    if errors == 0 {
        info!(event = "bundle.verified", root = %root, errors = errors, warnings = warnings);
    } else {
        warn!(event = "bundle.verified", root = %root, errors = errors, warnings = warnings);
    }
}
