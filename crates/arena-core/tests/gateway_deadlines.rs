//! Deadline races, budgets and forfeits as seen through the event log.

use std::sync::Arc;

use arena_core::agent::{ModelAgent, ScriptedProvider};
use arena_core::{
    build_agent, run_spec_match, ActionSource, Agent, AgentKind, AgentSpec, EndReason, EventKind,
    FailureReason, GatewayConfig, MatchConfig, MemoryEventSink, ScenarioSpec,
};
use serde_json::json;

fn slow_model(id: &str, delay_ms: u64) -> Box<dyn Agent> {
    let provider =
        ScriptedProvider::new(vec![r#"{"take": 1}"#.to_string()]).with_delay_ms(delay_ms);
    Box::new(ModelAgent::new(id, Arc::new(provider)))
}

fn constant(id: &str, action: serde_json::Value) -> Box<dyn Agent> {
    build_agent(&AgentSpec::new(id, AgentKind::Constant { action })).expect("agent")
}

fn failures(events: &[arena_core::MatchEvent], agent: &str) -> Vec<Option<FailureReason>> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ActionSubmitted {
                agent_id, failure, ..
            } if agent_id == agent => Some(*failure),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_timeout_substitutes_fallback_and_match_continues() {
    let spec = ScenarioSpec::Nim { pile: 4, max_take: 3 };
    let mut config = MatchConfig::new("deadline", 3);
    config.gateway.action_timeout_ms = 100;

    let agents = vec![slow_model("slow", 10_000), constant("fast", json!({"take": 1}))];
    let mut sink = MemoryEventSink::new();
    let record = run_spec_match(&spec, agents, &config, &mut sink)
        .await
        .expect("match");

    let slow = failures(&record.events, "slow");
    assert!(!slow.is_empty());
    assert!(slow.iter().all(|f| *f == Some(FailureReason::Timeout)));
    assert!(record.events.iter().any(|e| matches!(
        &e.kind,
        EventKind::ActionSubmitted { agent_id, source: ActionSource::Fallback, action, .. }
            if agent_id == "slow" && *action == json!({"noop": true})
    )));

    // The fast agent takes every object while the slow one passes.
    let summary = record.summary().expect("summary");
    assert_eq!(summary.reason, EndReason::Completed);
    assert_eq!(summary.winner.as_deref(), Some("fast"));
    assert_eq!(sink.events().len(), record.events.len());
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_timeouts_forfeit() {
    let spec = ScenarioSpec::Nim { pile: 15, max_take: 3 };
    let mut config = MatchConfig::new("forfeit", 3);
    config.gateway = GatewayConfig {
        action_timeout_ms: 50,
        forfeit_after_timeouts: Some(2),
        ..GatewayConfig::default()
    };

    let agents = vec![slow_model("slow", 5_000), constant("fast", json!({"take": 1}))];
    let mut sink = MemoryEventSink::new();
    let record = run_spec_match(&spec, agents, &config, &mut sink)
        .await
        .expect("match");

    match &record.events.last().expect("events").kind {
        EventKind::MatchEnded {
            reason,
            winner,
            forfeited_by,
            ..
        } => {
            assert_eq!(*reason, EndReason::Forfeited);
            assert_eq!(forfeited_by.as_deref(), Some("slow"));
            assert_eq!(winner.as_deref(), Some("fast"));
        }
        other => panic!("expected MatchEnded, got {other:?}"),
    }
    assert_eq!(failures(&record.events, "slow").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reply_inside_deadline_is_used() {
    let spec = ScenarioSpec::Nim { pile: 3, max_take: 3 };
    let mut config = MatchConfig::new("quick", 3);
    config.gateway.action_timeout_ms = 1_000;

    let agents = vec![slow_model("model", 10), constant("other", json!({"take": 1}))];
    let mut sink = MemoryEventSink::new();
    let record = run_spec_match(&spec, agents, &config, &mut sink)
        .await
        .expect("match");

    assert_eq!(failures(&record.events, "model").first(), Some(&None));
    assert!(record.events.iter().any(|e| matches!(
        &e.kind,
        EventKind::AgentRawOutput { agent_id, truncated: false, .. } if agent_id == "model"
    )));
}

#[tokio::test]
async fn test_call_budget_ends_match() {
    let spec = ScenarioSpec::NumberGuess { min: 1, max: 1000 };
    let mut config = MatchConfig::new("budget", 8);
    config.gateway.max_calls = Some(2);

    let agents = vec![constant("stubborn", json!({"guess": 0}))];
    let mut sink = MemoryEventSink::new();
    let record = run_spec_match(&spec, agents, &config, &mut sink)
        .await
        .expect("match");

    let summary = record.summary().expect("summary");
    assert_eq!(summary.reason, EndReason::BudgetExceeded);
    assert_eq!(summary.turns, 2);
    assert_eq!(summary.winner, None);
}
