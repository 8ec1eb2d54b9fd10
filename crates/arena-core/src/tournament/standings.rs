//! Standings: win = 3, draw = 1, loss = 0.
//!
//! Rows sort by points desc, score diff desc, then agent id asc, which is
//! a total order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{AgentId, MatchSummary};

pub const WIN_POINTS: u32 = 3;
pub const DRAW_POINTS: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingsRow {
    pub agent_id: AgentId,
    pub played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub points: u32,
    pub score_for: f64,
    pub score_against: f64,
    pub score_diff: f64,
}

impl StandingsRow {
    fn empty(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            played: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            points: 0,
            score_for: 0.0,
            score_against: 0.0,
            score_diff: 0.0,
        }
    }
}

fn rank(a: &StandingsRow, b: &StandingsRow) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.score_diff.total_cmp(&a.score_diff))
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}

/// Fold `summaries` into one row per agent. Every roster agent gets a row
/// even if it never played; setup failures are skipped entirely.
pub fn compute_standings(roster: &[AgentId], summaries: &[MatchSummary]) -> Vec<StandingsRow> {
    let mut rows: BTreeMap<AgentId, StandingsRow> = roster
        .iter()
        .map(|id| (id.clone(), StandingsRow::empty(id)))
        .collect();

    for summary in summaries.iter().filter(|s| s.counts_for_standings()) {
        let total: f64 = summary.scores.values().sum();
        for agent_id in &summary.agent_ids {
            let own = summary.scores.get(agent_id).copied().unwrap_or(0.0);
            let row = rows
                .entry(agent_id.clone())
                .or_insert_with(|| StandingsRow::empty(agent_id));
            row.played += 1;
            row.score_for += own;
            row.score_against += total - own;
            match summary.winner.as_deref() {
                Some(w) if w == agent_id => row.wins += 1,
                Some(_) => row.losses += 1,
                None if summary.agent_ids.len() >= 2 => row.draws += 1,
                None => row.losses += 1,
            }
        }
    }

    let mut out: Vec<StandingsRow> = rows
        .into_values()
        .map(|mut row| {
            row.points = row.wins * WIN_POINTS + row.draws * DRAW_POINTS;
            row.score_diff = row.score_for - row.score_against;
            row
        })
        .collect();
    out.sort_by(rank);
    out
}
