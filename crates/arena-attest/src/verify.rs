//! Bundle re-verification.
//!
//! Every check produces an itemised [`BundleIssue`] instead of stopping at
//! the first failure, so a reviewer sees the full damage in one pass.
//! Only I/O failures that prevent walking the bundle are returned as `Err`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canonical::to_canonical_value;
use crate::digest::ContentDigest;
use crate::manifest::{
    is_bundle_relative, is_manifest_file, list_files, BundleManifest, MANIFEST_FILE,
    MANIFEST_RECEIPT_FILE,
};
use crate::receipt::{verify_receipt, verify_receipt_with_key, Receipt};
use crate::Result;

/// Public key file a bundle may carry to pin its receipts to one signer.
pub const SIGNER_PUBLIC_KEY_FILE: &str = "signer.pub";

const RECEIPT_SUFFIX: &str = ".receipt.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    MissingManifest,
    MalformedManifest,
    MissingFile,
    HashMismatch,
    SizeMismatch,
    UnlistedFile,
    InvalidReceipt,
    MissingManifestReceipt,
    ManifestReceiptMismatch,
    UnsafePath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleIssue {
    pub path: String,
    pub kind: IssueKind,
    pub severity: Severity,
    pub detail: String,
}

impl fmt::Display for BundleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "[{level}] {}: {}", self.path, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReport {
    pub root: PathBuf,
    pub files_checked: usize,
    pub receipts_checked: usize,
    pub errors: Vec<BundleIssue>,
    pub warnings: Vec<BundleIssue>,
}

impl BundleReport {
    /// Warnings never fail a bundle.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(
        &mut self,
        path: impl Into<String>,
        kind: IssueKind,
        severity: Severity,
        detail: String,
    ) {
        let issue = BundleIssue {
            path: path.into(),
            kind,
            severity,
            detail,
        };
        match severity {
            Severity::Error => self.errors.push(issue),
            Severity::Warning => self.warnings.push(issue),
        }
    }

    fn error(&mut self, path: impl Into<String>, kind: IssueKind, detail: String) {
        self.push(path, kind, Severity::Error, detail);
    }

    fn warn(&mut self, path: impl Into<String>, kind: IssueKind, detail: String) {
        self.push(path, kind, Severity::Warning, detail);
    }
}

/// Re-hash every manifest entry and re-check every receipt under `root`.
pub fn verify_bundle(root: &Path) -> Result<BundleReport> {
    let mut report = BundleReport {
        root: root.to_path_buf(),
        files_checked: 0,
        receipts_checked: 0,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    let manifest = if root.join(MANIFEST_FILE).is_file() {
        match BundleManifest::load(root) {
            Ok(m) => Some(m),
            Err(e) => {
                report.error(MANIFEST_FILE, IssueKind::MalformedManifest, e.to_string());
                None
            }
        }
    } else {
        report.error(
            MANIFEST_FILE,
            IssueKind::MissingManifest,
            "bundle has no manifest".to_string(),
        );
        None
    };

    let on_disk = list_files(root)?;

    if let Some(manifest) = &manifest {
        check_manifest_entries(root, manifest, &mut report)?;
        for (rel, _) in &on_disk {
            if !is_manifest_file(rel) && manifest.get(rel).is_none() {
                report.warn(
                    rel.as_str(),
                    IssueKind::UnlistedFile,
                    "file is not listed in the manifest".to_string(),
                );
            }
        }
    }

    let pinned_key = match fs::read_to_string(root.join(SIGNER_PUBLIC_KEY_FILE)) {
        Ok(text) => Some(text.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    for (rel, abs) in &on_disk {
        if rel.ends_with(RECEIPT_SUFFIX) {
            check_receipt(rel, abs, pinned_key.as_deref(), &mut report);
        }
    }

    match (&manifest, root.join(MANIFEST_RECEIPT_FILE).is_file()) {
        (Some(manifest), true) => check_manifest_receipt(root, manifest, &mut report)?,
        (Some(_), false) => report.warn(
            MANIFEST_RECEIPT_FILE,
            IssueKind::MissingManifestReceipt,
            "manifest is not signed".to_string(),
        ),
        (None, _) => {}
    }

    debug!(
        root = %root.display(),
        files = report.files_checked,
        receipts = report.receipts_checked,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "bundle verification finished"
    );
    Ok(report)
}

fn check_manifest_entries(
    root: &Path,
    manifest: &BundleManifest,
    report: &mut BundleReport,
) -> Result<()> {
    for entry in &manifest.artifacts {
        if !is_bundle_relative(&entry.path) {
            report.error(
                entry.path.as_str(),
                IssueKind::UnsafePath,
                "manifest path escapes the bundle root".to_string(),
            );
            continue;
        }
        let abs = root.join(&entry.path);
        let bytes = match fs::read(&abs) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                report.error(
                    entry.path.as_str(),
                    IssueKind::MissingFile,
                    "listed in manifest but not present".to_string(),
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        report.files_checked += 1;

        if bytes.len() as u64 != entry.bytes {
            report.error(
                entry.path.as_str(),
                IssueKind::SizeMismatch,
                format!("expected {} bytes, found {}", entry.bytes, bytes.len()),
            );
        }
        let actual = ContentDigest::from_bytes(&bytes);
        if actual != entry.sha256 {
            report.error(
                entry.path.as_str(),
                IssueKind::HashMismatch,
                format!("expected sha256 {}, found {}", entry.sha256, actual),
            );
        }
    }
    Ok(())
}

fn check_receipt(rel: &str, abs: &Path, pinned_key: Option<&str>, report: &mut BundleReport) {
    report.receipts_checked += 1;
    let receipt = match Receipt::load(abs) {
        Ok(r) => r,
        Err(e) => {
            report.error(rel, IssueKind::InvalidReceipt, format!("unreadable receipt: {e}"));
            return;
        }
    };
    let outcome = match pinned_key {
        Some(key) => verify_receipt_with_key(&receipt, key),
        None => verify_receipt(&receipt),
    };
    if let Err(e) = outcome {
        report.error(rel, IssueKind::InvalidReceipt, e.to_string());
    }
}

fn check_manifest_receipt(
    root: &Path,
    manifest: &BundleManifest,
    report: &mut BundleReport,
) -> Result<()> {
    let receipt = match Receipt::load(&root.join(MANIFEST_RECEIPT_FILE)) {
        Ok(r) => r,
        // Already reported by the per-receipt pass.
        Err(_) => return Ok(()),
    };
    let expected = to_canonical_value(manifest)?;
    if to_canonical_value(&receipt.payload)? != expected {
        report.error(
            MANIFEST_RECEIPT_FILE,
            IssueKind::ManifestReceiptMismatch,
            "signed payload does not match manifest.json".to_string(),
        );
    }
    Ok(())
}
