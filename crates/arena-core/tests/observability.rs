//! Tracing emitted while matches and tournaments run.

use arena_core::obs::{
    emit_bundle_verified, emit_decoder_recovered, emit_tournament_finished,
    emit_tournament_started, MatchSpan,
};
use arena_core::metrics::METRICS;
use arena_core::{
    build_agent, run_spec_match, AgentKind, AgentSpec, MatchConfig, MemoryEventSink, ScenarioSpec,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_tournament_emitters() {
    emit_tournament_started("cup", 6, 2);
    emit_tournament_finished("cup", 6, 1, Some("alice"));
    emit_tournament_finished("empty", 0, 0, None);
}

#[traced_test]
#[test]
fn test_match_span_scopes_events() {
    let _span = MatchSpan::enter("r01-p00-a-vs-b");
    emit_decoder_recovered("a", 3, "fenced");
    emit_bundle_verified("/tmp/out", 0, 1);
}

#[traced_test]
#[tokio::test]
async fn test_match_run_counts_events() {
    let before = METRICS.events_emitted();
    let spec = ScenarioSpec::NumberGuess { min: 1, max: 10 };
    let agents = vec![build_agent(&AgentSpec::new("s", AgentKind::BinarySearch)).expect("agent")];
    let mut sink = MemoryEventSink::new();
    let record = run_spec_match(&spec, agents, &MatchConfig::new("obs", 3), &mut sink)
        .await
        .expect("match");

    // Other tests in this binary may run matches concurrently.
    assert!(METRICS.events_emitted() - before >= record.events.len() as u64);
}
