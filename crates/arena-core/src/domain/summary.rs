//! Match summary: the immutable result of one match.
//!
//! A summary is never built incrementally. It is a fold over a finished
//! log, so the same log always yields the same summary.

use std::collections::BTreeMap;

use arena_attest::ContentDigest;
use serde::{Deserialize, Serialize};

use super::error::LogError;
use super::event::{EndReason, EventKind, MatchEvent};
use super::{AgentId, Seed};
use crate::replay::{render_event_log, validate_log};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub match_id: String,
    pub scenario: String,
    pub seed: Seed,
    pub agent_ids: Vec<AgentId>,
    pub scores: BTreeMap<AgentId, f64>,
    pub winner: Option<AgentId>,
    pub turns: u32,
    pub reason: EndReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forfeited_by: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    /// SHA-256 of the rendered JSONL log.
    pub log_sha256: ContentDigest,
    pub manifest_sha256: Option<ContentDigest>,
}

impl MatchSummary {
    /// Derive the summary from a complete, well-formed log.
    pub fn from_events(
        events: &[MatchEvent],
        manifest_sha256: Option<ContentDigest>,
    ) -> Result<Self, LogError> {
        validate_log(events)?;

        let mut scenario = String::new();
        let mut seed = 0;
        let mut agent_ids = Vec::new();
        let mut setup_error = None;
        let mut ended = None;

        for event in events {
            match &event.kind {
                EventKind::MatchStarted {
                    scenario: s,
                    seed: sd,
                    agent_ids: ids,
                    ..
                } => {
                    scenario = s.clone();
                    seed = *sd;
                    agent_ids = ids.clone();
                }
                EventKind::MatchSetupFailed {
                    scenario: s,
                    seed: sd,
                    agent_ids: ids,
                    error,
                    ..
                } => {
                    scenario = s.clone();
                    seed = *sd;
                    agent_ids = ids.clone();
                    setup_error = Some(error.clone());
                }
                EventKind::MatchEnded {
                    reason,
                    turns,
                    scores,
                    winner,
                    forfeited_by,
                } => {
                    ended = Some((
                        *reason,
                        *turns,
                        scores.clone(),
                        winner.clone(),
                        forfeited_by.clone(),
                    ));
                }
                _ => {}
            }
        }

        let (reason, turns, scores, winner, forfeited_by) = ended.ok_or(LogError::NotTerminated)?;
        let rendered = render_event_log(events).map_err(|e| LogError::Parse {
            line: 0,
            reason: e.to_string(),
        })?;

        Ok(Self {
            match_id: events[0].match_id.clone(),
            scenario,
            seed,
            agent_ids,
            scores,
            winner,
            turns,
            reason,
            forfeited_by,
            setup_error,
            log_sha256: ContentDigest::from_bytes(rendered.as_bytes()),
            manifest_sha256,
        })
    }

    /// Setup failures carry no score information.
    pub fn counts_for_standings(&self) -> bool {
        self.reason != EndReason::SetupFailed
    }
}
