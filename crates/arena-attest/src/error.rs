//! Error types for arena-attest

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while encoding, hashing, signing or verifying artifacts
#[derive(Error, Debug)]
pub enum AttestError {
    /// NaN or infinite numbers cannot be canonicalised
    #[error("non-finite number is not permitted in canonical JSON")]
    NonFiniteNumber,

    /// Digest string is not 64 lowercase hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Key material could not be parsed
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signature is malformed or does not verify
    #[error("signature verification failed: {0}")]
    InvalidSignature(String),

    /// Receipt was signed by a different key than the one expected
    #[error("receipt signed by {actual}, expected {expected}")]
    KeyMismatch { expected: String, actual: String },

    /// Manifest file could not be read or parsed
    #[error("malformed manifest {path}: {reason}")]
    MalformedManifest { path: PathBuf, reason: String },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_mismatch_names_both_keys() {
        let err = AttestError::KeyMismatch {
            expected: "aaaa".to_string(),
            actual: "bbbb".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aaaa"));
        assert!(msg.contains("bbbb"));
    }

    #[test]
    fn invalid_digest_display() {
        let err = AttestError::InvalidDigest {
            digest: "xyz".to_string(),
        };
        assert!(err.to_string().contains("invalid digest"));
    }
}
