//! Individual detection rules.
//!
//! A rule sees the whole log and one agent id and returns at most one hit.
//! Rules never depend on each other.

use std::collections::BTreeSet;

use arena_attest::canonical_json;
use serde_json::Value;

use super::{ClassifierThresholds, FailureMode, FailureModeHit};
use crate::domain::{EndReason, EventKind, FailureReason, MatchEvent};
use crate::scenario::{is_noop, ScenarioHints};

pub(crate) struct RuleInput<'a> {
    events: &'a [MatchEvent],
    hints: &'a ScenarioHints,
    max_turns: Option<u32>,
    thresholds: &'a ClassifierThresholds,
}

impl<'a> RuleInput<'a> {
    pub(crate) fn new(
        events: &'a [MatchEvent],
        hints: &'a ScenarioHints,
        max_turns: Option<u32>,
        thresholds: &'a ClassifierThresholds,
    ) -> Self {
        Self {
            events,
            hints,
            max_turns,
            thresholds,
        }
    }

    fn kinds(&self) -> impl Iterator<Item = &'a EventKind> {
        self.events.iter().map(|e| &e.kind)
    }

    fn ended(&self) -> Option<(EndReason, u32)> {
        self.kinds().find_map(|k| match k {
            EventKind::MatchEnded { reason, turns, .. } => Some((*reason, *turns)),
            _ => None,
        })
    }

    fn turn_budget(&self) -> Option<u32> {
        self.max_turns.or_else(|| {
            self.kinds().find_map(|k| match k {
                EventKind::MatchStarted { max_turns, .. } => Some(*max_turns),
                _ => None,
            })
        })
    }

    /// Adjudicated actions for one agent, in order.
    fn adjudicated(&self, agent_id: &str) -> Vec<&'a Value> {
        self.kinds()
            .filter_map(|k| match k {
                EventKind::ActionAdjudicated {
                    agent_id: a,
                    action,
                    ..
                } if a == agent_id => Some(action),
                _ => None,
            })
            .collect()
    }

    fn is_noop(&self, action: &Value) -> bool {
        is_noop(action) || *action == self.hints.noop_action
    }
}

pub(crate) type Rule = fn(&RuleInput<'_>, &str) -> Option<FailureModeHit>;

pub(crate) const RULES: &[Rule] = &[
    noop_loop,
    invalid_streak,
    format_drift,
    truncated_output,
    timeout_streak,
    budget_exceeded,
    action_storm,
    max_turns_stall,
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Longest run of `true` and total `true` count.
fn runs(flags: impl IntoIterator<Item = bool>) -> (u32, u32) {
    let (mut longest, mut current, mut total) = (0, 0, 0);
    for flag in flags {
        if flag {
            current += 1;
            total += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    (longest, total)
}

fn rate(count: u32, opportunities: usize) -> Option<f64> {
    if opportunities == 0 {
        return None;
    }
    let raw = f64::from(count) / opportunities as f64;
    Some((raw * 10_000.0).round() / 10_000.0)
}

fn hit(code: FailureMode, count: u32, rate: Option<f64>, source: &str) -> FailureModeHit {
    FailureModeHit {
        code,
        count,
        rate,
        detector_source: source.to_string(),
    }
}

/// Every answer-or-fallback the gateway produced for `agent_id`, as the
/// failure reason attached to it (`None` for a clean agent action).
fn attempts<'a>(input: &RuleInput<'a>, agent_id: &str) -> Vec<Option<FailureReason>> {
    input
        .kinds()
        .filter_map(|k| match k {
            EventKind::ActionSubmitted {
                agent_id: a,
                failure,
                ..
            } if a == agent_id => Some(*failure),
            EventKind::InvalidAction {
                agent_id: a,
                reason,
                ..
            } if a == agent_id => Some(Some(*reason)),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Consecutive no-op actions reaching `noop_run`. Count is the longest run.
fn noop_loop(input: &RuleInput<'_>, agent_id: &str) -> Option<FailureModeHit> {
    let actions = input.adjudicated(agent_id);
    let (longest, total) = runs(actions.iter().map(|a| input.is_noop(a)));
    (longest >= input.thresholds.noop_run).then(|| {
        hit(
            FailureMode::NoopLoop,
            longest,
            rate(total, actions.len()),
            "ActionAdjudicated",
        )
    })
}

/// Consecutive rejected outputs reaching `invalid_run`.
fn invalid_streak(input: &RuleInput<'_>, agent_id: &str) -> Option<FailureModeHit> {
    let attempts = attempts(input, agent_id);
    let (longest, total) = runs(
        attempts
            .iter()
            .map(|f| f.is_some_and(|r| r.is_rejection())),
    );
    (longest >= input.thresholds.invalid_run).then(|| {
        hit(
            FailureMode::InvalidStreak,
            longest,
            rate(total, attempts.len()),
            "InvalidAction",
        )
    })
}

/// Valid actions that needed a tolerant decode strategy.
fn format_drift(input: &RuleInput<'_>, agent_id: &str) -> Option<FailureModeHit> {
    let methods: Vec<_> = input
        .kinds()
        .filter_map(|k| match k {
            EventKind::ActionSubmitted {
                agent_id: a,
                method: Some(m),
                ..
            } if a == agent_id => Some(*m),
            _ => None,
        })
        .collect();
    let recovered = methods.iter().filter(|m| m.is_recovery()).count() as u32;
    (recovered >= input.thresholds.drift_min_count.max(1)).then(|| {
        hit(
            FailureMode::FormatDrift,
            recovered,
            rate(recovered, methods.len()),
            "ActionSubmitted",
        )
    })
}

fn truncated_output(input: &RuleInput<'_>, agent_id: &str) -> Option<FailureModeHit> {
    let flags: Vec<bool> = input
        .kinds()
        .filter_map(|k| match k {
            EventKind::AgentRawOutput {
                agent_id: a,
                truncated,
                ..
            } if a == agent_id => Some(*truncated),
            _ => None,
        })
        .collect();
    let count = flags.iter().filter(|t| **t).count() as u32;
    (count > 0).then(|| {
        hit(
            FailureMode::TruncatedOutput,
            count,
            rate(count, flags.len()),
            "AgentRawOutput",
        )
    })
}

fn timeout_streak(input: &RuleInput<'_>, agent_id: &str) -> Option<FailureModeHit> {
    let attempts = attempts(input, agent_id);
    let (longest, total) = runs(
        attempts
            .iter()
            .map(|f| *f == Some(FailureReason::Timeout)),
    );
    (longest >= input.thresholds.timeout_run.max(1)).then(|| {
        hit(
            FailureMode::TimeoutStreak,
            longest,
            rate(total, attempts.len()),
            "ActionSubmitted",
        )
    })
}

/// This agent was refused calls for lack of budget, or the match ended on
/// budget after it spent calls. Count is the refused calls when there are
/// any, otherwise the calls it was charged for.
fn budget_exceeded(input: &RuleInput<'_>, agent_id: &str) -> Option<FailureModeHit> {
    let attempts = attempts(input, agent_id);
    let refused = attempts
        .iter()
        .filter(|f| **f == Some(FailureReason::BudgetExhausted))
        .count() as u32;
    if refused > 0 {
        return Some(hit(FailureMode::BudgetExceeded, refused, None, "ActionSubmitted"));
    }
    let ended_on_budget = matches!(input.ended(), Some((EndReason::BudgetExceeded, _)));
    let charged = attempts.len() as u32;
    (ended_on_budget && charged > 0)
        .then(|| hit(FailureMode::BudgetExceeded, charged, None, "MatchEnded"))
}

/// The trailing `storm_window` non-noop actions use at most
/// `storm_max_distinct` distinct values.
fn action_storm(input: &RuleInput<'_>, agent_id: &str) -> Option<FailureModeHit> {
    let window = input.thresholds.storm_window as usize;
    if window == 0 {
        return None;
    }
    let actions: Vec<&Value> = input
        .adjudicated(agent_id)
        .into_iter()
        .filter(|a| !input.is_noop(a))
        .collect();
    if actions.len() < window {
        return None;
    }
    let distinct: BTreeSet<String> = actions[actions.len() - window..]
        .iter()
        .map(|a| canonical_json(a).unwrap_or_else(|_| a.to_string()))
        .collect();
    (distinct.len() as u32 <= input.thresholds.storm_max_distinct).then(|| {
        hit(
            FailureMode::ActionStorm,
            window as u32,
            rate(distinct.len() as u32, window),
            "ActionAdjudicated",
        )
    })
}

/// The match ran out of turns without reaching a terminal state.
fn max_turns_stall(input: &RuleInput<'_>, _agent_id: &str) -> Option<FailureModeHit> {
    let (reason, turns) = input.ended()?;
    if reason != EndReason::MaxTurnsReached {
        return None;
    }
    let budget = input.turn_budget()?;
    (turns >= budget).then(|| hit(FailureMode::MaxTurnsStall, turns, None, "MatchEnded"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::domain::{ActionSource, DecodeMethod};

    fn hints() -> ScenarioHints {
        ScenarioHints {
            seats: 1,
            noop_action: json!({"noop": true}),
            default_max_turns: 10,
        }
    }

    fn adjudicated(action: Value) -> EventKind {
        EventKind::ActionAdjudicated {
            turn: 1,
            agent_id: "a".to_string(),
            action,
            valid: true,
            feedback: json!("ok"),
        }
    }

    fn submitted(method: Option<DecodeMethod>, failure: Option<FailureReason>) -> EventKind {
        EventKind::ActionSubmitted {
            turn: 1,
            agent_id: "a".to_string(),
            action: json!({"noop": true}),
            source: if failure.is_some() {
                ActionSource::Fallback
            } else {
                ActionSource::Agent
            },
            method,
            failure,
        }
    }

    fn log(kinds: Vec<EventKind>) -> Vec<MatchEvent> {
        kinds
            .into_iter()
            .enumerate()
            .map(|(i, k)| MatchEvent::new(i as u64, "m", k))
            .collect()
    }

    fn run(rule: Rule, events: &[MatchEvent]) -> Option<FailureModeHit> {
        let h = hints();
        let t = ClassifierThresholds::default();
        rule(&RuleInput::new(events, &h, None, &t), "a")
    }

    #[test]
    fn test_runs_tracks_longest_and_total() {
        assert_eq!(runs([true, true, false, true]), (2, 3));
        assert_eq!(runs(Vec::<bool>::new()), (0, 0));
    }

    #[test]
    fn test_rate_rounds_to_four_places() {
        assert_eq!(rate(1, 3), Some(0.3333));
        assert_eq!(rate(1, 0), None);
    }

    #[test]
    fn test_noop_loop_needs_consecutive_run() {
        let broken = log(vec![
            adjudicated(json!({"noop": true})),
            adjudicated(json!({"noop": true})),
            adjudicated(json!({"guess": 5})),
            adjudicated(json!({"noop": true})),
        ]);
        assert!(run(noop_loop, &broken).is_none());

        let looped = log(vec![adjudicated(json!({"noop": true})); 3]);
        let h = run(noop_loop, &looped).expect("hit");
        assert_eq!(h.count, 3);
        assert_eq!(h.rate, Some(1.0));
    }

    #[test]
    fn test_format_drift_counts_recoveries() {
        let events = log(vec![
            submitted(Some(DecodeMethod::Direct), None),
            submitted(Some(DecodeMethod::Fenced), None),
            submitted(Some(DecodeMethod::BraceExtract), None),
        ]);
        let h = run(format_drift, &events).expect("hit");
        assert_eq!(h.count, 2);
        assert_eq!(h.rate, Some(0.6667));
    }

    #[test]
    fn test_timeout_streak() {
        let events = log(vec![
            submitted(None, Some(FailureReason::Timeout)),
            submitted(None, Some(FailureReason::Timeout)),
        ]);
        assert_eq!(run(timeout_streak, &events).expect("hit").count, 2);
    }

    #[test]
    fn test_action_storm_ignores_noops() {
        let mut kinds = vec![adjudicated(json!({"move": "rock"})); 6];
        kinds.insert(2, adjudicated(json!({"noop": true})));
        let h = run(action_storm, &log(kinds)).expect("hit");
        assert_eq!(h.count, 6);

        let varied = log(vec![
            adjudicated(json!({"move": "rock"})),
            adjudicated(json!({"move": "paper"})),
        ]);
        assert!(run(action_storm, &varied).is_none());
    }

    fn ended_on_budget() -> EventKind {
        EventKind::MatchEnded {
            reason: EndReason::BudgetExceeded,
            turns: 2,
            scores: BTreeMap::new(),
            winner: None,
            forfeited_by: None,
        }
    }

    #[test]
    fn test_budget_exceeded_skips_agents_that_spent_nothing() {
        let idle = log(vec![ended_on_budget()]);
        assert!(run(budget_exceeded, &idle).is_none());

        let spent = log(vec![
            submitted(Some(DecodeMethod::Direct), None),
            submitted(Some(DecodeMethod::Direct), None),
            ended_on_budget(),
        ]);
        let h = run(budget_exceeded, &spent).expect("hit");
        assert_eq!(h.count, 2);

        let refused = log(vec![
            submitted(Some(DecodeMethod::Direct), None),
            submitted(None, Some(FailureReason::BudgetExhausted)),
        ]);
        assert_eq!(run(budget_exceeded, &refused).expect("hit").count, 1);
    }

    #[test]
    fn test_max_turns_stall_uses_recorded_budget() {
        let events = log(vec![
            EventKind::MatchStarted {
                scenario: "number-guess".to_string(),
                seed: 1,
                agent_ids: vec!["a".to_string()],
                max_turns: 2,
            },
            EventKind::MatchEnded {
                reason: EndReason::MaxTurnsReached,
                turns: 2,
                scores: BTreeMap::new(),
                winner: None,
                forfeited_by: None,
            },
        ]);
        assert_eq!(run(max_turns_stall, &events).expect("hit").count, 2);
    }
}
