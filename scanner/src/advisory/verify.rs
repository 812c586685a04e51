//! Bundle signature verification.
//!
//! Every bundle's signature is checked against a fixed, externally
//! provisioned trust anchor before any of its content is parsed.
//! Verification failure excludes the bundle entirely — a bundle is never
//! partially trusted.

use std::path::Path;

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use stratum_core::error::{Result, ScanError};

/// The provisioned ECDSA P-256 public key bundles are verified against.
#[derive(Debug)]
pub struct TrustAnchor {
    key: VerifyingKey,
}

impl TrustAnchor {
    /// Build a trust anchor from a hex-encoded SEC1 public key point.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| ScanError::Config(format!("trust anchor is not valid hex: {}", e)))?;

        let key = VerifyingKey::from_sec1_bytes(&bytes)
            .map_err(|e| ScanError::Config(format!("trust anchor is not a P-256 key: {}", e)))?;

        Ok(Self { key })
    }

    /// Load the trust anchor from its provisioned key file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScanError::Config(format!(
                "failed to read trust anchor {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_hex(&content)
    }

    /// Verify a detached hex-encoded signature over the full bundle bytes.
    pub fn verify(&self, bundle_name: &str, payload: &[u8], signature_hex: &str) -> Result<()> {
        let sig_bytes = hex::decode(signature_hex.trim()).map_err(|e| {
            ScanError::SignatureVerification {
                bundle: bundle_name.to_string(),
                message: format!("signature is not valid hex: {}", e),
            }
        })?;

        let signature =
            Signature::from_slice(&sig_bytes).map_err(|e| ScanError::SignatureVerification {
                bundle: bundle_name.to_string(),
                message: format!("malformed signature: {}", e),
            })?;

        self.key
            .verify(payload, &signature)
            .map_err(|_| ScanError::SignatureVerification {
                bundle: bundle_name.to_string(),
                message: "signature does not match payload".to_string(),
            })
    }
}

/// Deterministic signing helpers shared by advisory tests.
#[cfg(test)]
pub(crate) mod testkey {
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{Signature, SigningKey};

    /// Deterministic test key; the scalar is a valid P-256 private key.
    pub(crate) fn test_signing_key() -> SigningKey {
        SigningKey::from_slice(&[0x17; 32]).unwrap()
    }

    pub(crate) fn anchor_hex(key: &SigningKey) -> String {
        hex::encode(key.verifying_key().to_sec1_bytes())
    }

    pub(crate) fn sign_hex(key: &SigningKey, payload: &[u8]) -> String {
        let signature: Signature = key.sign(payload);
        hex::encode(signature.to_bytes())
    }
}
