//! End-to-end bundle verification over a temp directory.

use std::fs;
use std::path::Path;

use arena_attest::{
    verify_bundle, write_json_atomic, BundleManifest, IssueKind, ReceiptSigner, Severity,
    MANIFEST_RECEIPT_FILE, SIGNER_PUBLIC_KEY_FILE,
};
use serde_json::json;

fn signer() -> ReceiptSigner {
    ReceiptSigner::from_seed(&[21u8; 32])
}

/// Lay out a small tournament-shaped bundle and seal it.
fn build_bundle(root: &Path) {
    let s = signer();
    let match_dir = root.join("matches/r01-p00-a-vs-b");
    fs::create_dir_all(&match_dir).expect("mkdir");
    fs::write(match_dir.join("events.jsonl"), b"{\"seq\":0}\n").expect("events");

    let summary = json!({"matchId": "r01-p00-a-vs-b", "winner": "a"});
    write_json_atomic(&match_dir.join("summary.json"), &summary).expect("summary");
    let receipt = s.sign(&summary).expect("sign summary");
    write_json_atomic(&match_dir.join("summary.receipt.json"), &receipt).expect("receipt");

    fs::write(
        root.join(SIGNER_PUBLIC_KEY_FILE),
        format!("{}\n", s.public_key_hex()),
    )
    .expect("pub");

    let manifest = BundleManifest::scan(root).expect("scan");
    manifest.write(root).expect("manifest");
    let manifest_receipt = s.sign_serialize(&manifest).expect("sign manifest");
    write_json_atomic(&root.join(MANIFEST_RECEIPT_FILE), &manifest_receipt).expect("write");
}

#[test]
fn sealed_bundle_verifies_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    build_bundle(dir.path());

    let report = verify_bundle(dir.path()).expect("verify");
    assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.receipts_checked, 2);
}

#[test]
fn modified_artifact_is_a_hash_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    build_bundle(dir.path());
    fs::write(
        dir.path().join("matches/r01-p00-a-vs-b/events.jsonl"),
        b"{\"seq\":9}\n",
    )
    .expect("tamper");

    let report = verify_bundle(dir.path()).expect("verify");
    assert!(!report.is_ok());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, IssueKind::HashMismatch);
    assert_eq!(report.errors[0].path, "matches/r01-p00-a-vs-b/events.jsonl");
}

#[test]
fn missing_artifact_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    build_bundle(dir.path());
    fs::remove_file(dir.path().join("matches/r01-p00-a-vs-b/events.jsonl")).expect("rm");

    let report = verify_bundle(dir.path()).expect("verify");
    assert!(report
        .errors
        .iter()
        .any(|e| e.kind == IssueKind::MissingFile && e.severity == Severity::Error));
}

#[test]
fn extra_file_is_only_a_warning_and_noise_is_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    build_bundle(dir.path());
    fs::write(dir.path().join("notes.txt"), b"hand-written").expect("extra");
    fs::write(dir.path().join(".DS_Store"), b"noise").expect("noise");
    fs::write(dir.path().join("Thumbs.db"), b"noise").expect("noise");

    let report = verify_bundle(dir.path()).expect("verify");
    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, IssueKind::UnlistedFile);
    assert_eq!(report.warnings[0].path, "notes.txt");
}

#[test]
fn tampered_summary_receipt_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    build_bundle(dir.path());

    let path = dir.path().join("matches/r01-p00-a-vs-b/summary.receipt.json");
    let mut receipt: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
    receipt["payload"]["winner"] = json!("b");
    write_json_atomic(&path, &receipt).expect("rewrite");

    let report = verify_bundle(dir.path()).expect("verify");
    let kinds: Vec<IssueKind> = report.errors.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&IssueKind::InvalidReceipt));
    assert!(kinds.contains(&IssueKind::HashMismatch));
}

#[test]
fn receipt_from_foreign_key_fails_when_signer_is_pinned() {
    let dir = tempfile::tempdir().expect("tempdir");
    build_bundle(dir.path());

    let foreign = ReceiptSigner::from_seed(&[99u8; 32]);
    let extra = foreign.sign(&json!({"claim": "forged"})).expect("sign");
    write_json_atomic(&dir.path().join("forged.receipt.json"), &extra).expect("write");

    let report = verify_bundle(dir.path()).expect("verify");
    assert!(report
        .errors
        .iter()
        .any(|e| e.path == "forged.receipt.json" && e.kind == IssueKind::InvalidReceipt));
}

#[test]
fn manifest_receipt_must_match_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    build_bundle(dir.path());

    let stale = BundleManifest {
        schema_version: 1,
        artifacts: Vec::new(),
    };
    let receipt = signer().sign_serialize(&stale).expect("sign");
    write_json_atomic(&dir.path().join(MANIFEST_RECEIPT_FILE), &receipt).expect("write");

    let report = verify_bundle(dir.path()).expect("verify");
    assert!(report
        .errors
        .iter()
        .any(|e| e.kind == IssueKind::ManifestReceiptMismatch));
}

#[test]
fn manifest_entry_outside_the_bundle_is_rejected() {
    let parent = tempfile::tempdir().expect("tempdir");
    let root = parent.path().join("bundle");
    fs::create_dir_all(&root).expect("mkdir");
    build_bundle(&root);
    fs::write(parent.path().join("secret.txt"), b"not yours").expect("write");

    let mut manifest = BundleManifest::load(&root).expect("load");
    let mut escaped = manifest.artifacts[0].clone();
    escaped.path = "../secret.txt".to_string();
    manifest.artifacts.push(escaped);
    manifest.write(&root).expect("rewrite");

    let report = verify_bundle(&root).expect("verify");
    let issue = report
        .errors
        .iter()
        .find(|e| e.kind == IssueKind::UnsafePath)
        .expect("unsafe path reported");
    assert_eq!(issue.path, "../secret.txt");
}

#[test]
fn unsorted_manifest_raises_no_false_unlisted_warnings() {
    let dir = tempfile::tempdir().expect("tempdir");
    build_bundle(dir.path());

    let mut manifest = BundleManifest::load(dir.path()).expect("load");
    manifest.artifacts.reverse();
    manifest.write(dir.path()).expect("rewrite");

    let report = verify_bundle(dir.path()).expect("verify");
    assert!(report
        .warnings
        .iter()
        .all(|w| w.kind != IssueKind::UnlistedFile));
}
