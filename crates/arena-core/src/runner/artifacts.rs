//! On-disk layout of one match.
//!
//! ```text
//! <match-id>/
//!   events.jsonl          system of record, streamed while the match runs
//!   status.json           running | completed | crashed | setupFailed
//!   transcript.jsonl      gateway diagnostics (timings, decode notes)
//!   failure_modes.json    classifier profile
//!   manifest.json         hashes of the files above
//!   summary.json          MatchSummary, includes the manifest hash
//!   summary.receipt.json  signed summary (when a key is supplied)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use arena_attest::{
    atomic_write, write_json_atomic, BundleManifest, ContentDigest, ReceiptSigner, MANIFEST_FILE,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    record_setup_failure, run_spec_match, JsonlEventSink, MatchConfig, MatchRecord, SetupFailure,
};
use crate::agent::{build_agent, Agent, AgentSpec};
use crate::classifier::{classify, ClassifierThresholds, FailureModeProfile};
use crate::domain::{
    is_safe_id, AgentId, ArenaError, EndReason, MatchEvent, MatchSummary, Result,
};
use crate::gateway::TranscriptEntry;
use crate::scenario::ScenarioSpec;

pub const EVENTS_FILE: &str = "events.jsonl";
pub const STATUS_FILE: &str = "status.json";
pub const TRANSCRIPT_FILE: &str = "transcript.jsonl";
pub const FAILURE_MODES_FILE: &str = "failure_modes.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const SUMMARY_RECEIPT_FILE: &str = "summary.receipt.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Running,
    Completed,
    Crashed,
    SetupFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatus {
    pub match_id: String,
    pub status: RunState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MatchStatus {
    fn running(match_id: &str) -> Self {
        Self {
            match_id: match_id.to_string(),
            status: RunState::Running,
            started_at: Utc::now(),
            ended_at: None,
            error: None,
        }
    }

    fn end(&self, status: RunState, error: Option<String>) -> Self {
        Self {
            status,
            ended_at: Some(Utc::now()),
            error,
            ..self.clone()
        }
    }
}

/// A freshly created, exclusively owned match directory.
#[derive(Debug, Clone)]
pub struct MatchDir {
    root: PathBuf,
    match_id: String,
}

impl MatchDir {
    /// Create `<parent>/<match_id>`. An existing directory means two
    /// matches were given the same id, which is a bug.
    pub fn create(parent: &Path, match_id: &str) -> Result<Self> {
        if !is_safe_id(match_id) {
            return Err(ArenaError::InvalidConfig(format!(
                "match id {match_id:?} must be non-empty [A-Za-z0-9_-]"
            )));
        }
        fs::create_dir_all(parent)?;
        let root = parent.join(match_id);
        match fs::create_dir(&root) {
            Ok(()) => Ok(Self {
                root,
                match_id: match_id.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(ArenaError::MatchIdCollision {
                    match_id: match_id.to_string(),
                    path: root,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn events_path(&self) -> PathBuf {
        self.root.join(EVENTS_FILE)
    }

    pub fn write_status(&self, status: &MatchStatus) -> Result<()> {
        Ok(write_json_atomic(&self.root.join(STATUS_FILE), status)?)
    }

    pub fn write_transcript(&self, entries: &[TranscriptEntry]) -> Result<()> {
        let mut out = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut out, entry)?;
            out.push(b'\n');
        }
        Ok(atomic_write(&self.root.join(TRANSCRIPT_FILE), &out)?)
    }

    pub fn write_failure_modes(&self, profile: &FailureModeProfile) -> Result<()> {
        Ok(write_json_atomic(&self.root.join(FAILURE_MODES_FILE), profile)?)
    }

    /// Hash the directory into `manifest.json`, then derive and write the
    /// summary (and its receipt when a signer is given).
    pub fn seal(
        &self,
        events: &[MatchEvent],
        signer: Option<&ReceiptSigner>,
    ) -> Result<MatchSummary> {
        let manifest = BundleManifest::scan(&self.root)?;
        manifest.write(&self.root)?;
        let manifest_sha = ContentDigest::from_file(&self.root.join(MANIFEST_FILE))?;

        let summary = MatchSummary::from_events(events, Some(manifest_sha))?;
        write_json_atomic(&self.root.join(SUMMARY_FILE), &summary)?;
        if let Some(signer) = signer {
            let receipt = signer.sign_serialize(&summary)?;
            write_json_atomic(&self.root.join(SUMMARY_RECEIPT_FILE), &receipt)?;
        }
        Ok(summary)
    }
}

/// Build every roster entry, or name the first one whose config is unusable.
fn build_roster(
    roster: &[AgentSpec],
) -> std::result::Result<Vec<Box<dyn Agent>>, (AgentId, String)> {
    roster
        .iter()
        .map(|spec| build_agent(spec).map_err(|e| (spec.id.clone(), e.to_string())))
        .collect()
}

/// Run one match and write its full artifact directory under `parent`.
///
/// A roster entry that cannot be built is a setup failure of this match
/// only: the directory still gets its two-event log, summary and receipt.
pub async fn run_match_to_dir(
    scenario: &ScenarioSpec,
    roster: &[AgentSpec],
    config: &MatchConfig,
    parent: &Path,
    signer: Option<&ReceiptSigner>,
    thresholds: &ClassifierThresholds,
) -> Result<MatchSummary> {
    let dir = MatchDir::create(parent, &config.match_id)?;
    let status = MatchStatus::running(&config.match_id);
    dir.write_status(&status)?;

    let played: Result<MatchRecord> = async {
        scenario.validate()?;
        let mut sink = JsonlEventSink::create(&dir.events_path()).await?;
        match build_roster(roster) {
            Ok(agents) => run_spec_match(scenario, agents, config, &mut sink).await,
            Err((agent_id, error)) => {
                let agent_ids: Vec<AgentId> = roster.iter().map(|a| a.id.clone()).collect();
                let failure = SetupFailure {
                    scenario: scenario.id(),
                    agent_ids: &agent_ids,
                    agent_id: Some(agent_id),
                    error,
                    max_turns: config.max_turns.unwrap_or(scenario.hints().default_max_turns),
                };
                record_setup_failure(failure, config, &mut sink).await
            }
        }
    }
    .await;

    let record = match played {
        Ok(record) => record,
        Err(e) => {
            dir.write_status(&status.end(RunState::Crashed, Some(e.to_string())))?;
            return Err(e);
        }
    };

    dir.write_transcript(&record.transcript)?;
    let agent_ids: Vec<AgentId> = roster.iter().map(|a| a.id.clone()).collect();
    let profile = classify(
        &record.events,
        &scenario.hints(),
        &agent_ids,
        Some(record.max_turns),
        thresholds,
    );
    dir.write_failure_modes(&profile)?;

    let final_state = match record.end_reason() {
        Some(EndReason::SetupFailed) => RunState::SetupFailed,
        _ => RunState::Completed,
    };
    dir.write_status(&status.end(final_state, None))?;

    dir.seal(&record.events, signer)
}
