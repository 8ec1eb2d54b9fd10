//! Arena-Attest: tamper evidence for Agent Arena artifacts
//!
//! This crate owns everything that makes a match or tournament result
//! verifiable after the fact. It has no knowledge of scenarios or agents;
//! it only sees JSON payloads and files on disk.
//!
//! ## Layer 0 - Integrity
//!
//! Focus: byte-stable encoding, hashing, signing and re-verification.
//!
//! ## Key Components
//!
//! - `canonical_json`: recursive key-sorted, number-normalised JSON encoding
//! - `ContentDigest`: SHA-256 content address for bytes and files
//! - `atomic_write`: temp-file-then-rename writes for concurrently polled files
//! - `ReceiptSigner` / `Receipt`: detached ed25519 signatures over canonical payloads
//! - `BundleManifest` / `verify_bundle`: artifact index and itemised re-verification

pub mod canonical;
mod digest;
mod error;
pub mod fsio;
pub mod manifest;
pub mod receipt;
pub mod verify;

pub use canonical::{canonical_bytes, canonical_json, to_canonical_value};
pub use digest::ContentDigest;
pub use error::AttestError;
pub use fsio::{atomic_write, write_json_atomic};
pub use manifest::{ArtifactEntry, BundleManifest, MANIFEST_FILE, MANIFEST_RECEIPT_FILE};
pub use receipt::{
    verify_receipt, verify_receipt_with_key, Receipt, ReceiptSigner, RECEIPT_DOMAIN,
};
pub use verify::{
    verify_bundle, BundleIssue, BundleReport, IssueKind, Severity, SIGNER_PUBLIC_KEY_FILE,
};

/// Result type for arena-attest operations
pub type Result<T> = std::result::Result<T, AttestError>;
