//! Tournament bundle layout.
//!
//! ```text
//! <out>/
//!   tournament.json          the config that was run
//!   standings.json           StandingsDoc
//!   standings.receipt.json   signed StandingsDoc
//!   signer.pub               hex public key every receipt must match
//!   matches/<match-id>/...   one MatchDir per scheduled match
//!   manifest.json            hashes of everything above
//!   manifest.receipt.json    signed manifest
//! ```

use std::path::Path;

use arena_attest::{
    atomic_write, write_json_atomic, BundleManifest, ContentDigest, ReceiptSigner,
    MANIFEST_RECEIPT_FILE, SIGNER_PUBLIC_KEY_FILE,
};
use serde::{Deserialize, Serialize};

use super::config::TournamentConfig;
use super::standings::StandingsRow;
use crate::classifier::CLASSIFIER_VERSION;
use crate::domain::{AgentId, EndReason, MatchSummary, Result};

pub const TOURNAMENT_FILE: &str = "tournament.json";
pub const STANDINGS_FILE: &str = "standings.json";
pub const STANDINGS_RECEIPT_FILE: &str = "standings.receipt.json";
pub const MATCHES_DIR: &str = "matches";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRef {
    pub match_id: String,
    pub reason: EndReason,
    pub winner: Option<AgentId>,
    pub log_sha256: ContentDigest,
}

impl From<&MatchSummary> for MatchRef {
    fn from(s: &MatchSummary) -> Self {
        Self {
            match_id: s.match_id.clone(),
            reason: s.reason,
            winner: s.winner.clone(),
            log_sha256: s.log_sha256.clone(),
        }
    }
}

/// The signed tournament-level fact set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingsDoc {
    pub tournament: String,
    pub scenario: String,
    pub classifier_version: String,
    pub rows: Vec<StandingsRow>,
    /// Schedule order.
    pub matches: Vec<MatchRef>,
}

/// Write the top-level files, then hash and sign the whole tree. Match
/// directories must already be sealed.
pub fn write_bundle(
    root: &Path,
    config: &TournamentConfig,
    rows: &[StandingsRow],
    summaries: &[MatchSummary],
    signer: &ReceiptSigner,
) -> Result<BundleManifest> {
    write_json_atomic(&root.join(TOURNAMENT_FILE), config)?;

    let doc = StandingsDoc {
        tournament: config.name.clone(),
        scenario: config.scenario.id().to_string(),
        classifier_version: CLASSIFIER_VERSION.to_string(),
        rows: rows.to_vec(),
        matches: summaries.iter().map(MatchRef::from).collect(),
    };
    write_json_atomic(&root.join(STANDINGS_FILE), &doc)?;
    let receipt = signer.sign_serialize(&doc)?;
    write_json_atomic(&root.join(STANDINGS_RECEIPT_FILE), &receipt)?;
    atomic_write(
        &root.join(SIGNER_PUBLIC_KEY_FILE),
        format!("{}\n", signer.public_key_hex()).as_bytes(),
    )?;

    let manifest = BundleManifest::scan(root)?;
    manifest.write(root)?;
    let manifest_receipt = signer.sign_serialize(&manifest)?;
    write_json_atomic(&root.join(MANIFEST_RECEIPT_FILE), &manifest_receipt)?;
    Ok(manifest)
}
