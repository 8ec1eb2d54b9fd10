//! Runs a schedule with bounded concurrency.
//!
//! Matches share nothing but the output directory; each writes only under
//! its own `matches/<id>/`. Results arrive in completion order and are put
//! back into schedule order before anything is folded, so standings do
//! not depend on timing.

use std::fs;
use std::path::{Path, PathBuf};

use arena_attest::ReceiptSigner;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};

use super::bundle::{write_bundle, MATCHES_DIR};
use super::config::{schedule, ScheduledMatch, TournamentConfig};
use super::standings::{compute_standings, StandingsRow};
use crate::agent::AgentSpec;
use crate::domain::{ArenaError, EndReason, MatchSummary, Result};
use crate::obs;
use crate::runner::{run_match_to_dir, MatchConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentOutcome {
    pub name: String,
    pub root: PathBuf,
    /// Schedule order.
    pub summaries: Vec<MatchSummary>,
    pub standings: Vec<StandingsRow>,
}

impl TournamentOutcome {
    pub fn setup_failures(&self) -> usize {
        self.summaries
            .iter()
            .filter(|s| s.reason == EndReason::SetupFailed)
            .count()
    }

    pub fn leader(&self) -> Option<&str> {
        self.standings
            .first()
            .filter(|row| row.played > 0)
            .map(|row| row.agent_id.as_str())
    }
}

async fn play(
    config: &TournamentConfig,
    entry: &ScheduledMatch,
    matches_dir: &Path,
    signer: &ReceiptSigner,
) -> Result<MatchSummary> {
    let roster: Vec<AgentSpec> = entry
        .agents
        .iter()
        .filter_map(|id| config.agent(id).cloned())
        .collect();
    let match_config = MatchConfig {
        match_id: entry.match_id.clone(),
        seed: entry.seed,
        max_turns: config.max_turns,
        gateway: config.gateway.clone(),
        decode_limits: Default::default(),
    };
    run_match_to_dir(
        &config.scenario,
        &roster,
        &match_config,
        matches_dir,
        Some(signer),
        &config.classifier,
    )
    .await
}

/// Run every scheduled match and write the signed bundle under `out`.
pub async fn run_tournament(
    config: &TournamentConfig,
    out: &Path,
    signer: &ReceiptSigner,
) -> Result<TournamentOutcome> {
    let plan = schedule(config)?;
    let matches_dir = out.join(MATCHES_DIR);
    fs::create_dir_all(&matches_dir)?;
    obs::emit_tournament_started(&config.name, plan.len(), config.concurrency);

    let span = tracing::info_span!("arena.tournament", tournament = %config.name);
    let mut results: Vec<(usize, MatchSummary)> = async {
        let mut runs = stream::iter(plan.iter())
            .map(|entry| {
                let matches_dir = &matches_dir;
                async move { (entry, play(config, entry, matches_dir, signer).await) }
            })
            .buffer_unordered(config.concurrency);

        let mut results = Vec::with_capacity(plan.len());
        while let Some((entry, played)) = runs.next().await {
            let summary = played?;
            debug!(match_id = %entry.match_id, reason = %summary.reason, "match finished");
            if config.abort_on_setup_failure && summary.reason == EndReason::SetupFailed {
                return Err(ArenaError::SetupAborted {
                    match_id: entry.match_id.clone(),
                    reason: summary.setup_error.clone().unwrap_or_default(),
                });
            }
            results.push((entry.index, summary));
        }
        Ok::<_, ArenaError>(results)
    }
    .instrument(span)
    .await?;

    results.sort_by_key(|(index, _)| *index);
    let summaries: Vec<MatchSummary> = results.into_iter().map(|(_, s)| s).collect();
    let standings = compute_standings(&config.roster_ids(), &summaries);
    write_bundle(out, config, &standings, &summaries, signer)?;

    let outcome = TournamentOutcome {
        name: config.name.clone(),
        root: out.to_path_buf(),
        summaries,
        standings,
    };
    obs::emit_tournament_finished(
        &config.name,
        outcome.summaries.len(),
        outcome.setup_failures(),
        outcome.leader(),
    );
    Ok(outcome)
}
