//! Tournament configuration and schedule expansion.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::agent::AgentSpec;
use crate::classifier::ClassifierThresholds;
use crate::domain::{is_safe_id, AgentId, ArenaError, Result, Seed};
use crate::gateway::GatewayConfig;
use crate::scenario::ScenarioSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentConfig {
    pub name: String,
    pub scenario: ScenarioSpec,
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub seed: Seed,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    /// Defaults to the scenario's own turn budget.
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub classifier: ClassifierThresholds,
    /// Stop the whole tournament on the first setup failure instead of
    /// recording it and moving on.
    #[serde(default)]
    pub abort_on_setup_failure: bool,
}

fn default_rounds() -> u32 {
    1
}

fn default_concurrency() -> usize {
    1
}

impl TournamentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ArenaError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scenario.validate()?;
        if !is_safe_id(&self.name) {
            return Err(ArenaError::InvalidConfig(format!(
                "tournament name {:?} must be non-empty [A-Za-z0-9_-]",
                self.name
            )));
        }
        if self.rounds == 0 {
            return Err(ArenaError::InvalidConfig("rounds must be >= 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ArenaError::InvalidConfig("concurrency must be >= 1".to_string()));
        }
        let mut seen = BTreeSet::new();
        for agent in &self.agents {
            if !is_safe_id(&agent.id) {
                return Err(ArenaError::InvalidConfig(format!(
                    "agent id {:?} must be non-empty [A-Za-z0-9_-]",
                    agent.id
                )));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(ArenaError::InvalidConfig(format!(
                    "duplicate agent id: {}",
                    agent.id
                )));
            }
        }
        let seats = self.scenario.hints().seats;
        if self.agents.len() < seats {
            return Err(ArenaError::InvalidConfig(format!(
                "{} needs at least {seats} agents, roster has {}",
                self.scenario.id(),
                self.agents.len()
            )));
        }
        if seats > 2 {
            return Err(ArenaError::InvalidConfig(format!(
                "no pairing scheme for {seats}-seat scenarios"
            )));
        }
        Ok(())
    }

    pub fn roster_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.id.clone()).collect()
    }

    pub fn agent(&self, id: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.id == id)
    }
}

/// One entry of the expanded schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMatch {
    /// Position in schedule order; results are folded in this order.
    pub index: usize,
    pub round: u32,
    pub pairing: usize,
    pub match_id: String,
    pub seed: Seed,
    /// Seat order for this match.
    pub agents: Vec<AgentId>,
}

/// First four bytes (big-endian) of `sha256("{base}:{round}:{pairing}")`.
pub fn derive_seed(base: Seed, round: u32, pairing: usize) -> Seed {
    let digest = Sha256::digest(format!("{base}:{round}:{pairing}").as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Expand the config into one match per round and pairing.
///
/// Single-seat scenarios give every agent its own match per round.
/// Two-seat scenarios play a round robin; seats swap on even rounds.
pub fn schedule(config: &TournamentConfig) -> Result<Vec<ScheduledMatch>> {
    config.validate()?;
    let ids = config.roster_ids();
    let seats = config.scenario.hints().seats;

    let pairings: Vec<Vec<AgentId>> = if seats == 1 {
        ids.iter().map(|id| vec![id.clone()]).collect()
    } else {
        let mut pairs = Vec::new();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                pairs.push(vec![a.clone(), b.clone()]);
            }
        }
        pairs
    };

    let mut out = Vec::with_capacity(pairings.len() * config.rounds as usize);
    for round in 1..=config.rounds {
        for (pairing, agents) in pairings.iter().enumerate() {
            let mut agents = agents.clone();
            if round % 2 == 0 {
                agents.reverse();
            }
            let match_id = format!("r{round:02}-p{pairing:02}-{}", agents.join("-vs-"));
            out.push(ScheduledMatch {
                index: out.len(),
                round,
                pairing,
                match_id,
                seed: derive_seed(config.seed, round, pairing),
                agents,
            });
        }
    }
    Ok(out)
}
