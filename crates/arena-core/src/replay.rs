//! Event-log codec, well-formedness checks and replay.
//!
//! The log is the only record of a match. Everything here rebuilds state
//! from it by folding events from the start:
//! - [`MatchProjection`]: a pure reducer keyed by event type
//! - [`validate_log`]: structural invariants (gapless seq, single match id)
//! - [`replay_state`]: re-adjudicates every recorded action and checks that
//!   the scenario reproduces every recorded snapshot

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::domain::{
    ActionSource, AgentId, EndReason, EventKind, LogError, MatchEvent, Result, Seed,
};
use crate::scenario::{with_scenario, Scenario, ScenarioSpec};

// ---------------------------------------------------------------------------
// JSONL codec
// ---------------------------------------------------------------------------

/// One event per line, trailing newline.
pub fn render_event_log(events: &[MatchEvent]) -> serde_json::Result<String> {
    let mut out = String::new();
    for event in events {
        out.push_str(&serde_json::to_string(event)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn parse_event_log(text: &str) -> std::result::Result<Vec<MatchEvent>, LogError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| LogError::Parse {
                line: i + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

pub fn read_event_log(path: &Path) -> Result<Vec<MatchEvent>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_event_log(&text)?)
}

// ---------------------------------------------------------------------------
// Structural validation
// ---------------------------------------------------------------------------

/// Check seq is `0..N` with no gaps, every event shares the first event's
/// match id, and the log ends with its only `MatchEnded`.
pub fn validate_log(events: &[MatchEvent]) -> std::result::Result<(), LogError> {
    let first = events.first().ok_or(LogError::Empty)?;
    let mut ended = false;

    for (i, event) in events.iter().enumerate() {
        let expected = i as u64;
        if event.seq != expected {
            return Err(LogError::SequenceGap {
                expected,
                found: event.seq,
            });
        }
        if event.match_id != first.match_id {
            return Err(LogError::MatchIdMismatch {
                seq: event.seq,
                expected: first.match_id.clone(),
                found: event.match_id.clone(),
            });
        }
        if ended {
            return Err(LogError::EventAfterEnd { seq: event.seq });
        }
        if matches!(event.kind, EventKind::MatchEnded { .. }) {
            ended = true;
        }
    }

    if ended {
        Ok(())
    } else {
        Err(LogError::NotTerminated)
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Per-agent counters accumulated by [`MatchProjection`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTally {
    pub observations: u32,
    pub submitted: u32,
    pub invalid: u32,
    pub fallbacks: u32,
    pub valid_adjudications: u32,
    pub rejected_adjudications: u32,
    pub raw_outputs: u32,
}

/// Match state derived purely from events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchProjection {
    pub match_id: String,
    pub scenario: String,
    pub seed: Seed,
    pub agent_ids: Vec<AgentId>,
    pub max_turns: u32,
    pub turn: u32,
    pub agents: BTreeMap<AgentId, AgentTally>,
    pub last_snapshot: Option<Value>,
    pub end_reason: Option<EndReason>,
    pub scores: BTreeMap<AgentId, f64>,
    pub winner: Option<AgentId>,
    pub setup_error: Option<String>,
}

impl MatchProjection {
    pub fn from_events(events: &[MatchEvent]) -> Self {
        events.iter().fold(Self::default(), |mut acc, event| {
            acc.apply(event);
            acc
        })
    }

    fn tally(&mut self, agent_id: &str) -> &mut AgentTally {
        self.agents.entry(agent_id.to_string()).or_default()
    }

    pub fn apply(&mut self, event: &MatchEvent) {
        if self.match_id.is_empty() {
            self.match_id = event.match_id.clone();
        }
        match &event.kind {
            EventKind::MatchStarted {
                scenario,
                seed,
                agent_ids,
                max_turns,
            } => {
                self.scenario = scenario.clone();
                self.seed = *seed;
                self.agent_ids = agent_ids.clone();
                self.max_turns = *max_turns;
                for id in agent_ids {
                    self.tally(id);
                }
            }
            EventKind::TurnStarted { turn } => self.turn = *turn,
            EventKind::ObservationEmitted { agent_id, .. } => {
                self.tally(agent_id).observations += 1
            }
            EventKind::ActionSubmitted {
                agent_id, source, ..
            } => {
                let t = self.tally(agent_id);
                t.submitted += 1;
                if *source == ActionSource::Fallback {
                    t.fallbacks += 1;
                }
            }
            EventKind::InvalidAction { agent_id, .. } => {
                let t = self.tally(agent_id);
                t.invalid += 1;
                t.fallbacks += 1;
            }
            EventKind::ActionAdjudicated {
                agent_id, valid, ..
            } => {
                let t = self.tally(agent_id);
                if *valid {
                    t.valid_adjudications += 1;
                } else {
                    t.rejected_adjudications += 1;
                }
            }
            EventKind::AgentRawOutput { agent_id, .. } => self.tally(agent_id).raw_outputs += 1,
            EventKind::StateUpdated { snapshot, .. } => self.last_snapshot = Some(snapshot.clone()),
            EventKind::MatchEnded {
                reason,
                scores,
                winner,
                ..
            } => {
                self.end_reason = Some(*reason);
                self.scores = scores.clone();
                self.winner = winner.clone();
            }
            EventKind::MatchSetupFailed {
                scenario,
                seed,
                agent_ids,
                error,
                ..
            } => {
                self.scenario = scenario.clone();
                self.seed = *seed;
                self.agent_ids = agent_ids.clone();
                self.setup_error = Some(error.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub match_id: String,
    pub events: usize,
    pub adjudications_checked: usize,
    pub snapshots_checked: usize,
    pub final_snapshot: Option<Value>,
}

fn diverged(seq: u64, reason: impl Into<String>) -> LogError {
    LogError::ReplayDiverged {
        seq,
        reason: reason.into(),
    }
}

/// Re-derive scenario state from the log and check it against every
/// recorded adjudication, snapshot and the final scores.
pub fn replay_state<S: Scenario>(
    scenario: &S,
    events: &[MatchEvent],
) -> std::result::Result<ReplayReport, LogError> {
    validate_log(events)?;
    let mut report = ReplayReport {
        match_id: events[0].match_id.clone(),
        events: events.len(),
        adjudications_checked: 0,
        snapshots_checked: 0,
        final_snapshot: None,
    };
    let mut state: Option<S::State> = None;

    for event in events {
        match &event.kind {
            EventKind::MatchStarted {
                scenario: id,
                seed,
                agent_ids,
                ..
            } => {
                if id != scenario.id() {
                    return Err(diverged(
                        event.seq,
                        format!("log is for scenario {id}, replaying {}", scenario.id()),
                    ));
                }
                let initial = scenario
                    .init(*seed, agent_ids)
                    .map_err(|e| diverged(event.seq, e.to_string()))?;
                state = Some(initial);
            }
            EventKind::ActionAdjudicated {
                agent_id,
                action,
                valid,
                feedback,
                ..
            } => {
                let current = state
                    .as_ref()
                    .ok_or_else(|| diverged(event.seq, "adjudication before MatchStarted"))?;
                let adj = scenario.adjudicate(current, agent_id, action);
                if adj.valid != *valid || adj.feedback != *feedback {
                    return Err(diverged(
                        event.seq,
                        format!(
                            "recorded valid={valid} feedback={feedback}, replayed valid={} feedback={}",
                            adj.valid, adj.feedback
                        ),
                    ));
                }
                state = Some(adj.state);
                report.adjudications_checked += 1;
            }
            EventKind::StateUpdated { snapshot, .. } => {
                let current = state
                    .as_ref()
                    .ok_or_else(|| diverged(event.seq, "snapshot before MatchStarted"))?;
                if scenario.summarize(current) != *snapshot {
                    return Err(diverged(event.seq, "snapshot does not match replayed state"));
                }
                report.snapshots_checked += 1;
            }
            EventKind::MatchEnded { scores, reason, .. } => {
                if let Some(current) = &state {
                    if *reason != EndReason::SetupFailed && scenario.score(current) != *scores {
                        return Err(diverged(event.seq, "final scores do not match replayed state"));
                    }
                    report.final_snapshot = Some(scenario.summarize(current));
                }
            }
            _ => {}
        }
    }
    Ok(report)
}

/// [`replay_state`] for a scenario chosen at runtime.
pub fn replay_spec(
    spec: &ScenarioSpec,
    events: &[MatchEvent],
) -> std::result::Result<ReplayReport, LogError> {
    with_scenario!(spec, |s| replay_state(&s, events))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(seq: u64, kind: EventKind) -> MatchEvent {
        MatchEvent::new(seq, "m", kind)
    }

    fn ended(seq: u64) -> MatchEvent {
        ev(
            seq,
            EventKind::MatchEnded {
                reason: EndReason::MaxTurnsReached,
                turns: 1,
                scores: BTreeMap::new(),
                winner: None,
                forfeited_by: None,
            },
        )
    }

    #[test]
    fn test_validate_accepts_minimal_log() {
        let events = vec![ev(0, EventKind::TurnStarted { turn: 1 }), ended(1)];
        validate_log(&events).expect("valid");
    }

    #[test]
    fn test_validate_rejects_gap() {
        let events = vec![ev(0, EventKind::TurnStarted { turn: 1 }), ended(2)];
        assert!(matches!(
            validate_log(&events),
            Err(LogError::SequenceGap {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn test_validate_rejects_foreign_match_id() {
        let mut events = vec![ev(0, EventKind::TurnStarted { turn: 1 }), ended(1)];
        events[1].match_id = "other".to_string();
        assert!(matches!(
            validate_log(&events),
            Err(LogError::MatchIdMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_trailing_events() {
        let events = vec![ended(0), ev(1, EventKind::TurnStarted { turn: 2 })];
        assert!(matches!(
            validate_log(&events),
            Err(LogError::EventAfterEnd { seq: 1 })
        ));
        assert!(matches!(validate_log(&[]), Err(LogError::Empty)));
    }

    #[test]
    fn test_render_and_parse_agree() {
        let events = vec![ev(0, EventKind::TurnStarted { turn: 1 }), ended(1)];
        let text = render_event_log(&events).expect("render");
        assert!(text.ends_with('\n'));
        assert_eq!(parse_event_log(&text).expect("parse"), events);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = parse_event_log("{\"seq\":0}\nnot json\n").expect_err("bad");
        assert!(matches!(err, LogError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_projection_counts_fallbacks() {
        let events = vec![
            ev(
                0,
                EventKind::InvalidAction {
                    turn: 1,
                    agent_id: "a".to_string(),
                    reason: crate::domain::FailureReason::NoJsonFound,
                    detail: String::new(),
                    fallback_action: serde_json::json!({"noop": true}),
                },
            ),
            ended(1),
        ];
        let p = MatchProjection::from_events(&events);
        assert_eq!(p.agents["a"].invalid, 1);
        assert_eq!(p.agents["a"].fallbacks, 1);
        assert_eq!(p.end_reason, Some(EndReason::MaxTurnsReached));
    }
}
