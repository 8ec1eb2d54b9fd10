//! Determinism and log well-formedness of complete matches.

use arena_core::replay::{render_event_log, replay_spec, validate_log, MatchProjection};
use arena_core::runner::final_snapshot;
use arena_core::{
    build_agent, run_spec_match, Agent, AgentKind, AgentSpec, EndReason, EventKind, MatchConfig,
    MatchRecord, MemoryEventSink, ScenarioSpec,
};
use serde_json::json;

fn agents(specs: &[AgentSpec]) -> Vec<Box<dyn Agent>> {
    specs
        .iter()
        .map(|s| build_agent(s).expect("agent"))
        .collect()
}

async fn play(spec: &ScenarioSpec, roster: &[AgentSpec], match_id: &str, seed: u32) -> MatchRecord {
    let mut sink = MemoryEventSink::new();
    let config = MatchConfig::new(match_id, seed);
    run_spec_match(spec, agents(roster), &config, &mut sink)
        .await
        .expect("match")
}

fn rps_roster() -> Vec<AgentSpec> {
    let moves = vec![
        json!({"move": "rock"}),
        json!({"move": "paper"}),
        json!({"move": "scissors"}),
    ];
    vec![
        AgentSpec::new("alice", AgentKind::Random { choices: moves.clone() }),
        AgentSpec::new("bob", AgentKind::Random { choices: moves }),
    ]
}

#[tokio::test]
async fn test_identical_inputs_produce_identical_logs() {
    let spec = ScenarioSpec::from_kind("rock-paper-scissors").expect("kind");
    let a = play(&spec, &rps_roster(), "m1", 1234).await;
    let b = play(&spec, &rps_roster(), "m1", 1234).await;

    let log_a = render_event_log(&a.events).expect("render");
    let log_b = render_event_log(&b.events).expect("render");
    assert_eq!(log_a, log_b);
}

#[tokio::test]
async fn test_seed_changes_random_agents() {
    let spec = ScenarioSpec::RockPaperScissors { rounds: 20 };
    let a = play(&spec, &rps_roster(), "m1", 1).await;
    let b = play(&spec, &rps_roster(), "m1", 2).await;
    assert_ne!(
        render_event_log(&a.events).expect("render"),
        render_event_log(&b.events).expect("render")
    );
}

#[tokio::test]
async fn test_logs_are_well_formed() {
    let spec = ScenarioSpec::from_kind("nim").expect("kind");
    let roster = vec![
        AgentSpec::new("a", AgentKind::Constant { action: json!({"take": 2}) }),
        AgentSpec::new("b", AgentKind::Constant { action: json!({"take": 1}) }),
    ];
    let record = play(&spec, &roster, "nim-1", 5).await;

    validate_log(&record.events).expect("valid log");
    for (i, event) in record.events.iter().enumerate() {
        assert_eq!(event.seq, i as u64);
        assert_eq!(event.match_id, "nim-1");
    }
    assert!(matches!(record.events[0].kind, EventKind::MatchStarted { .. }));
    assert!(matches!(
        record.events.last().map(|e| &e.kind),
        Some(EventKind::MatchEnded { .. })
    ));
}

#[tokio::test]
async fn test_number_guess_binary_search_converges() {
    let spec = ScenarioSpec::NumberGuess { min: 1, max: 100 };
    let roster = vec![AgentSpec::new("solver", AgentKind::BinarySearch)];
    let record = play(&spec, &roster, "ng-42", 42).await;

    let summary = record.summary().expect("summary");
    assert_eq!(summary.reason, EndReason::Completed);
    assert!(summary.turns <= 7, "took {} turns", summary.turns);
    assert_eq!(summary.winner.as_deref(), Some("solver"));

    let feedback: Vec<_> = record
        .events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ActionAdjudicated { feedback, .. } => Some(feedback.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(feedback.last(), Some(&json!("correct")));
}

#[tokio::test]
async fn test_replay_reproduces_every_snapshot() {
    let spec = ScenarioSpec::from_kind("rock-paper-scissors").expect("kind");
    let record = play(&spec, &rps_roster(), "rps-replay", 77).await;

    let report = replay_spec(&spec, &record.events).expect("replay");
    assert!(report.snapshots_checked > 0);
    assert_eq!(report.final_snapshot.as_ref(), final_snapshot(&record.events));

    let projection = MatchProjection::from_events(&record.events);
    assert_eq!(projection.end_reason, Some(EndReason::Completed));
    assert_eq!(projection.agents["alice"].valid_adjudications, 5);
}

#[tokio::test]
async fn test_replay_detects_tampered_feedback() {
    let spec = ScenarioSpec::NumberGuess { min: 1, max: 100 };
    let roster = vec![AgentSpec::new("solver", AgentKind::BinarySearch)];
    let mut record = play(&spec, &roster, "ng-tamper", 42).await;

    for event in &mut record.events {
        if let EventKind::ActionAdjudicated { feedback, .. } = &mut event.kind {
            *feedback = json!("lower-but-lying");
            break;
        }
    }
    assert!(replay_spec(&spec, &record.events).is_err());
}
