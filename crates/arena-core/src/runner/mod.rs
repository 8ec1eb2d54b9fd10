//! Match runner: drives one scenario instance through its agents.
//!
//! `NotStarted -> Running -> Ended`. Every transition is an event appended
//! to the sink and kept in memory; the runner never persists a mutable
//! "current match" object. Setup failures short-circuit to a two-event
//! log (`MatchSetupFailed`, `MatchEnded{setupFailed}`).

mod artifacts;
mod sink;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;

use crate::agent::{ActContext, Agent, AgentInit};
use crate::decoder::{ActionDecoder, DecodeLimits};
use crate::domain::{
    AgentId, EndReason, EventKind, MatchEvent, MatchSummary, Result, Seed,
};
use crate::gateway::{AgentGateway, GatewayConfig, TranscriptEntry};
use crate::metrics::METRICS;
use crate::obs;
use crate::scenario::{with_scenario, Scenario, ScenarioSpec};

pub use artifacts::{
    run_match_to_dir, MatchDir, MatchStatus, RunState, EVENTS_FILE, FAILURE_MODES_FILE,
    STATUS_FILE, SUMMARY_FILE, SUMMARY_RECEIPT_FILE, TRANSCRIPT_FILE,
};
pub use sink::{EventSink, JsonlEventSink, MemoryEventSink};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfig {
    pub match_id: String,
    pub seed: Seed,
    /// Defaults to the scenario's own turn budget.
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub decode_limits: DecodeLimits,
}

impl MatchConfig {
    pub fn new(match_id: impl Into<String>, seed: Seed) -> Self {
        Self {
            match_id: match_id.into(),
            seed,
            max_turns: None,
            gateway: GatewayConfig::default(),
            decode_limits: DecodeLimits::default(),
        }
    }
}

/// Everything a finished match produced.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub match_id: String,
    pub events: Vec<MatchEvent>,
    pub transcript: Vec<TranscriptEntry>,
    pub max_turns: u32,
}

impl MatchRecord {
    pub fn summary(&self) -> Result<MatchSummary> {
        Ok(MatchSummary::from_events(&self.events, None)?)
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.events.last().and_then(|e| match &e.kind {
            EventKind::MatchEnded { reason, .. } => Some(*reason),
            _ => None,
        })
    }
}

/// Assigns sequence numbers and fans each event out to the sink.
struct Recorder<'a> {
    match_id: String,
    next_seq: u64,
    events: Vec<MatchEvent>,
    sink: &'a mut dyn EventSink,
}

impl<'a> Recorder<'a> {
    fn new(match_id: &str, sink: &'a mut dyn EventSink) -> Self {
        Self {
            match_id: match_id.to_string(),
            next_seq: 0,
            events: Vec::new(),
            sink,
        }
    }

    async fn emit(&mut self, kind: EventKind) -> Result<()> {
        let event = MatchEvent::new(self.next_seq, self.match_id.clone(), kind);
        self.sink.append(&event).await?;
        obs::emit_event_appended(&self.match_id, event.kind.name(), event.seq);
        METRICS.inc_events_emitted();
        self.next_seq += 1;
        self.events.push(event);
        Ok(())
    }
}

/// Unique top score wins. A lone agent needs a positive score to win.
fn pick_winner(scores: &BTreeMap<AgentId, f64>, excluded: Option<&str>) -> Option<AgentId> {
    let eligible: Vec<(&AgentId, f64)> = scores
        .iter()
        .filter(|(id, _)| Some(id.as_str()) != excluded)
        .map(|(id, s)| (id, *s))
        .collect();

    if excluded.is_some() && eligible.len() == 1 {
        return Some(eligible[0].0.clone());
    }
    let best = eligible
        .iter()
        .map(|(_, s)| *s)
        .max_by(|a, b| a.total_cmp(b))?;
    let mut leaders = eligible.iter().filter(|(_, s)| s.total_cmp(&best).is_eq());
    let (leader, score) = leaders.next()?;
    if leaders.next().is_some() {
        return None;
    }
    if eligible.len() == 1 && *score <= 0.0 {
        return None;
    }
    Some((*leader).clone())
}

/// Why a match could not start.
pub struct SetupFailure<'a> {
    pub scenario: &'a str,
    pub agent_ids: &'a [AgentId],
    /// The agent at fault, when one is.
    pub agent_id: Option<AgentId>,
    pub error: String,
    pub max_turns: u32,
}

/// Write the two-event log of a match that failed before its first turn.
pub async fn record_setup_failure(
    failure: SetupFailure<'_>,
    config: &MatchConfig,
    sink: &mut dyn EventSink,
) -> Result<MatchRecord> {
    obs::emit_match_setup_failed(&config.match_id, failure.agent_id.as_deref(), &failure.error);
    METRICS.inc_setup_failures();

    let mut recorder = Recorder::new(&config.match_id, sink);
    recorder
        .emit(EventKind::MatchSetupFailed {
            scenario: failure.scenario.to_string(),
            seed: config.seed,
            agent_ids: failure.agent_ids.to_vec(),
            error: failure.error,
            agent_id: failure.agent_id,
        })
        .await?;
    recorder
        .emit(EventKind::MatchEnded {
            reason: EndReason::SetupFailed,
            turns: 0,
            scores: BTreeMap::new(),
            winner: None,
            forfeited_by: None,
        })
        .await?;
    obs::emit_match_ended(&config.match_id, EndReason::SetupFailed.as_str(), 0, None);
    METRICS.inc_matches_run();

    Ok(MatchRecord {
        match_id: config.match_id.clone(),
        events: recorder.events,
        transcript: Vec::new(),
        max_turns: failure.max_turns,
    })
}

/// Run one match to completion.
///
/// Returns `Err` only for programmer or configuration mistakes (bad
/// scenario config, bad schema, sink I/O). Agent misbehaviour of any kind
/// is recorded in the log instead.
pub async fn run_match<S: Scenario>(
    scenario: &S,
    agents: Vec<Box<dyn Agent>>,
    config: &MatchConfig,
    sink: &mut dyn EventSink,
) -> Result<MatchRecord> {
    let span = tracing::info_span!("arena.match", match_id = %config.match_id);
    run_match_inner(scenario, agents, config, sink)
        .instrument(span)
        .await
}

async fn run_match_inner<S: Scenario>(
    scenario: &S,
    agents: Vec<Box<dyn Agent>>,
    config: &MatchConfig,
    sink: &mut dyn EventSink,
) -> Result<MatchRecord> {
    let hints = scenario.hints();
    let max_turns = config.max_turns.unwrap_or(hints.default_max_turns);
    let agent_ids: Vec<AgentId> = agents.iter().map(|a| a.id().to_string()).collect();
    let seats: BTreeMap<AgentId, usize> = agent_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();

    // Config mistakes abort before anything is logged.
    let mut state = scenario.init(config.seed, &agent_ids)?;
    let decoder = Arc::new(ActionDecoder::new(
        scenario.action_schema(),
        scenario.fallback_action(),
        config.decode_limits,
    )?);

    let mut gateways: Vec<AgentGateway> = agents
        .into_iter()
        .map(|agent| AgentGateway::new(agent, Arc::clone(&decoder), config.gateway.clone()))
        .collect();

    for (seat, gateway) in gateways.iter_mut().enumerate() {
        let init = AgentInit {
            match_id: config.match_id.clone(),
            scenario: scenario.id().to_string(),
            seat,
            action_schema: scenario.action_schema(),
        };
        if let Err(e) = gateway.init(&init).await {
            let failure = SetupFailure {
                scenario: scenario.id(),
                agent_ids: &agent_ids,
                agent_id: Some(gateway.agent_id().to_string()),
                error: e.to_string(),
                max_turns,
            };
            return record_setup_failure(failure, config, sink).await;
        }
    }

    let mut recorder = Recorder::new(&config.match_id, sink);
    obs::emit_match_started(&config.match_id, scenario.id(), config.seed, agent_ids.len());
    recorder
        .emit(EventKind::MatchStarted {
            scenario: scenario.id().to_string(),
            seed: config.seed,
            agent_ids: agent_ids.clone(),
            max_turns,
        })
        .await?;

    let mut contexts: Vec<ActContext> = (0..agent_ids.len())
        .map(|seat| ActContext::new(config.seed, seat))
        .collect();
    let mut last_snapshot = scenario.summarize(&state);
    let mut turns_played = 0;
    let mut early_end: Option<(EndReason, Option<AgentId>)> = None;

    'turns: for turn in 1..=max_turns {
        if scenario.is_terminal(&state) {
            break;
        }
        turns_played = turn;
        recorder.emit(EventKind::TurnStarted { turn }).await?;

        for agent_id in scenario.turn_order(&state) {
            if scenario.is_terminal(&state) {
                break;
            }
            let Some(&seat) = seats.get(&agent_id) else {
                continue;
            };

            let observation = scenario.observe(&state, &agent_id);
            recorder
                .emit(EventKind::ObservationEmitted {
                    turn,
                    agent_id: agent_id.clone(),
                    observation: observation.clone(),
                })
                .await?;

            let ctx = &mut contexts[seat];
            ctx.turn = turn;
            let outcome = gateways[seat].request_action(&observation, ctx).await;

            if let Some(raw) = &outcome.raw {
                recorder
                    .emit(EventKind::AgentRawOutput {
                        turn,
                        agent_id: agent_id.clone(),
                        text: raw.text.clone(),
                        truncated: raw.truncated,
                    })
                    .await?;
            }

            match outcome.failure {
                Some(reason) if reason.is_rejection() => {
                    recorder
                        .emit(EventKind::InvalidAction {
                            turn,
                            agent_id: agent_id.clone(),
                            reason,
                            detail: outcome.detail.clone().unwrap_or_default(),
                            fallback_action: outcome.action.clone(),
                        })
                        .await?;
                }
                failure => {
                    recorder
                        .emit(EventKind::ActionSubmitted {
                            turn,
                            agent_id: agent_id.clone(),
                            action: outcome.action.clone(),
                            source: outcome.source,
                            method: outcome.method,
                            failure,
                        })
                        .await?;
                }
            }

            let adjudication = scenario.adjudicate(&state, &agent_id, &outcome.action);
            recorder
                .emit(EventKind::ActionAdjudicated {
                    turn,
                    agent_id: agent_id.clone(),
                    action: outcome.action,
                    valid: adjudication.valid,
                    feedback: adjudication.feedback,
                })
                .await?;

            state = adjudication.state;
            let snapshot = scenario.summarize(&state);
            if snapshot != last_snapshot {
                recorder
                    .emit(EventKind::StateUpdated {
                        turn,
                        snapshot: snapshot.clone(),
                    })
                    .await?;
                last_snapshot = snapshot;
            }

            if gateways[seat].should_forfeit() {
                early_end = Some((EndReason::Forfeited, Some(agent_id)));
                break 'turns;
            }
        }

        if !scenario.is_terminal(&state) && gateways.iter().all(AgentGateway::budget_exhausted) {
            early_end = Some((EndReason::BudgetExceeded, None));
            break;
        }
    }

    let scores = scenario.score(&state);
    let (reason, forfeited_by) = match early_end {
        Some(end) => end,
        None if scenario.is_terminal(&state) => (EndReason::Completed, None),
        None => (EndReason::MaxTurnsReached, None),
    };
    let winner = pick_winner(&scores, forfeited_by.as_deref());

    recorder
        .emit(EventKind::MatchEnded {
            reason,
            turns: turns_played,
            scores,
            winner: winner.clone(),
            forfeited_by,
        })
        .await?;
    obs::emit_match_ended(&config.match_id, reason.as_str(), turns_played, winner.as_deref());
    METRICS.inc_matches_run();

    let mut transcript: Vec<TranscriptEntry> = gateways
        .iter()
        .flat_map(|g| g.transcript().iter().cloned())
        .collect();
    transcript.sort_by_key(|t| t.turn);

    Ok(MatchRecord {
        match_id: config.match_id.clone(),
        events: recorder.events,
        transcript,
        max_turns,
    })
}

/// [`run_match`] for a scenario chosen at runtime.
pub async fn run_spec_match(
    spec: &ScenarioSpec,
    agents: Vec<Box<dyn Agent>>,
    config: &MatchConfig,
    sink: &mut dyn EventSink,
) -> Result<MatchRecord> {
    spec.validate()?;
    with_scenario!(spec, |s| run_match(&s, agents, config, sink).await)
}

/// Last snapshot recorded in a log, if any.
pub fn final_snapshot(events: &[MatchEvent]) -> Option<&Value> {
    events.iter().rev().find_map(|e| match &e.kind {
        EventKind::StateUpdated { snapshot, .. } => Some(snapshot),
        _ => None,
    })
}
