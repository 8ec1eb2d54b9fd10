//! Detached ed25519 receipts over canonical JSON payloads.
//!
//! The signed message is `RECEIPT_DOMAIN ‖ canonical_bytes(payload)`.
//! `signedAt` lives outside the signed bytes, so re-signing the same payload
//! always yields the same signature (ed25519 is deterministic).

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::{canonical_bytes, to_canonical_value};
use crate::error::AttestError;
use crate::fsio::atomic_write;
use crate::Result;

/// Domain separation tag prepended to every signed message.
pub const RECEIPT_DOMAIN: &str = "arena.receipt.v1\n";

/// A signed attestation over a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub payload: Value,
    /// Hex-encoded 64-byte ed25519 signature.
    pub signature: String,
    pub signed_at: DateTime<Utc>,
    /// Hex-encoded 32-byte ed25519 public key.
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_id: Option<String>,
}

impl Receipt {
    /// True when the signature verifies against the embedded key.
    pub fn is_valid(&self) -> bool {
        verify_receipt(self).is_ok()
    }

    /// Read a receipt from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Holds the private half of a receipt key.
pub struct ReceiptSigner {
    key: SigningKey,
}

impl std::fmt::Debug for ReceiptSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptSigner")
            .field("key_id", &self.key_id())
            .finish()
    }
}

impl ReceiptSigner {
    /// Fresh key from the thread RNG.
    pub fn generate() -> Self {
        let seed: [u8; 32] = rand::random();
        Self::from_seed(&seed)
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse a 64-char hex secret key.
    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| AttestError::InvalidKey(format!("secret key is not hex: {e}")))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            AttestError::InvalidKey(format!("secret key must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Self::from_seed(&seed))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    /// Load a hex key file written by [`ReceiptSigner::save`].
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_hex(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, format!("{}\n", self.to_hex()).as_bytes())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    /// First 16 hex chars of SHA-256 over the raw public key.
    pub fn key_id(&self) -> String {
        key_id_for(&self.key.verifying_key())
    }

    /// Sign `payload` and stamp the receipt with the current time.
    pub fn sign(&self, payload: &Value) -> Result<Receipt> {
        let message = signed_message(payload)?;
        let signature = self.key.sign(&message);
        Ok(Receipt {
            payload: to_canonical_value(payload)?,
            signature: hex::encode(signature.to_bytes()),
            signed_at: Utc::now(),
            public_key: self.public_key_hex(),
            public_key_id: Some(self.key_id()),
        })
    }

    /// Serialize `payload` and sign it.
    pub fn sign_serialize<T: Serialize>(&self, payload: &T) -> Result<Receipt> {
        self.sign(&serde_json::to_value(payload)?)
    }
}

fn key_id_for(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.to_bytes());
    hex::encode(digest)[..16].to_string()
}

fn signed_message(payload: &Value) -> Result<Vec<u8>> {
    let mut message = RECEIPT_DOMAIN.as_bytes().to_vec();
    message.extend(canonical_bytes(payload)?);
    Ok(message)
}

fn parse_public_key(public_hex: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(public_hex.trim())
        .map_err(|e| AttestError::InvalidKey(format!("public key is not hex: {e}")))?;
    let raw: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        AttestError::InvalidKey(format!("public key must be 32 bytes, got {}", b.len()))
    })?;
    VerifyingKey::from_bytes(&raw).map_err(|e| AttestError::InvalidKey(e.to_string()))
}

/// Verify a receipt against the public key it carries.
pub fn verify_receipt(receipt: &Receipt) -> Result<()> {
    let key = parse_public_key(&receipt.public_key)?;

    if let Some(declared) = &receipt.public_key_id {
        let actual = key_id_for(&key);
        if declared != &actual {
            return Err(AttestError::KeyMismatch {
                expected: declared.clone(),
                actual,
            });
        }
    }

    let sig_bytes = hex::decode(&receipt.signature)
        .map_err(|e| AttestError::InvalidSignature(format!("signature is not hex: {e}")))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| AttestError::InvalidSignature(e.to_string()))?;

    let message = signed_message(&receipt.payload)?;
    key.verify_strict(&message, &signature)
        .map_err(|e| AttestError::InvalidSignature(e.to_string()))
}

/// Verify a receipt and require it to be signed by `expected_public_hex`.
pub fn verify_receipt_with_key(receipt: &Receipt, expected_public_hex: &str) -> Result<()> {
    let expected = expected_public_hex.trim().to_ascii_lowercase();
    let actual = receipt.public_key.trim().to_ascii_lowercase();
    if expected != actual {
        return Err(AttestError::KeyMismatch { expected, actual });
    }
    verify_receipt(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signer() -> ReceiptSigner {
        ReceiptSigner::from_seed(&[7u8; 32])
    }

    #[test]
    fn sign_then_verify() {
        let receipt = signer()
            .sign(&json!({"matchId": "m1", "scores": {"a": 1}}))
            .expect("sign");
        assert!(receipt.is_valid());
        assert_eq!(receipt.public_key_id.as_deref(), Some(signer().key_id().as_str()));
    }

    #[test]
    fn key_order_does_not_change_signature() {
        let a = signer().sign(&json!({"x": 1, "y": 2})).expect("a");
        let b = signer().sign(&json!({"y": 2, "x": 1})).expect("b");
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn hex_round_trip_preserves_identity() {
        let original = ReceiptSigner::generate();
        let restored = ReceiptSigner::from_hex(&original.to_hex()).expect("from_hex");
        assert_eq!(original.public_key_hex(), restored.public_key_hex());
        assert_eq!(original.key_id().len(), 16);
    }

    #[test]
    fn from_hex_rejects_short_keys() {
        let err = ReceiptSigner::from_hex("abcd").expect_err("short key");
        assert!(matches!(err, AttestError::InvalidKey(_)));
    }

    #[test]
    fn wrong_expected_key_is_a_mismatch() {
        let receipt = signer().sign(&json!({"a": 1})).expect("sign");
        let other = ReceiptSigner::from_seed(&[9u8; 32]);
        let err = verify_receipt_with_key(&receipt, &other.public_key_hex())
            .expect_err("mismatch");
        assert!(matches!(err, AttestError::KeyMismatch { .. }));
        verify_receipt_with_key(&receipt, &signer().public_key_hex()).expect("same key");
    }

    #[test]
    fn save_and_load_key_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("arena.key");
        let s = signer();
        s.save(&path).expect("save");
        let loaded = ReceiptSigner::load(&path).expect("load");
        assert_eq!(loaded.public_key_hex(), s.public_key_hex());
    }
}
