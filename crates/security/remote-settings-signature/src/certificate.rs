//! Certificate chain model.
//!
//! Chains are JSON documents served from the `x5u` location, leaf first:
//!
//! ```json
//! {"certificates": [
//!   {"subject": "remote-settings.content-signature.mozilla.org",
//!    "issuer": "Intermediate", "public_key": "<base64>",
//!    "not_before": "2024-01-01T00:00:00Z", "not_after": "2025-01-01T00:00:00Z",
//!    "signature": "<base64url>"}
//! ]}
//! ```

use crate::canonical::canonical_json;
use crate::error::{Result, SignatureError};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

/// Domain separator for certificate signatures
pub const CERTIFICATE_PREFIX: &[u8] = b"Remote-Settings-Certificate:\x00";

/// One certificate of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Who the key belongs to
    pub subject: String,
    /// Who signed this certificate
    pub issuer: String,
    /// Ed25519 public key, base64
    pub public_key: String,
    /// Start of validity
    pub not_before: DateTime<Utc>,
    /// End of validity
    pub not_after: DateTime<Utc>,
    /// Issuer's signature over [`Certificate::tbs_bytes`], base64url
    pub signature: String,
}

impl Certificate {
    /// The bytes the issuer signs: every field except the signature
    pub fn tbs_bytes(&self) -> Vec<u8> {
        let body = canonical_json(&json!({
            "subject": self.subject,
            "issuer": self.issuer,
            "public_key": self.public_key,
            "not_before": self.not_before.to_rfc3339_opts(SecondsFormat::Secs, true),
            "not_after": self.not_after.to_rfc3339_opts(SecondsFormat::Secs, true),
        }));
        let mut bytes = CERTIFICATE_PREFIX.to_vec();
        bytes.extend_from_slice(body.as_bytes());
        bytes
    }

    /// Decode the public key
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let raw = decode_base64(&self.public_key)?;
        let bytes: [u8; PUBLIC_KEY_LENGTH] = raw.as_slice().try_into().map_err(|_| {
            SignatureError::malformed(format!(
                "public key of '{}' is {} bytes, expected {PUBLIC_KEY_LENGTH}",
                self.subject,
                raw.len()
            ))
        })?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| SignatureError::malformed(format!("invalid public key of '{}': {e}", self.subject)))
    }

    /// SHA-256 fingerprint (hex) of the raw public key
    pub fn fingerprint(&self) -> Result<String> {
        Ok(key_fingerprint(&self.verifying_key()?))
    }

    /// Whether subject and issuer are the same
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    /// Check the validity window against `now`
    pub fn check_validity(&self, now: DateTime<Utc>) -> Result<()> {
        if now < self.not_before {
            return Err(SignatureError::NotYetValid {
                subject: self.subject.clone(),
                not_before: self.not_before.to_rfc3339(),
            });
        }
        if now > self.not_after {
            return Err(SignatureError::Expired {
                subject: self.subject.clone(),
                not_after: self.not_after.to_rfc3339(),
            });
        }
        Ok(())
    }

    /// Check that `issuer` signed this certificate
    pub fn verify_issued_by(&self, issuer: &Certificate) -> Result<()> {
        let broken = |reason: String| SignatureError::BrokenChain {
            subject: self.subject.clone(),
            reason,
        };
        if self.issuer != issuer.subject {
            return Err(broken(format!(
                "issuer '{}' does not match next subject '{}'",
                self.issuer, issuer.subject
            )));
        }
        let signature = decode_signature(&self.signature)?;
        issuer
            .verifying_key()?
            .verify(&self.tbs_bytes(), &signature)
            .map_err(|_| broken(format!("signature by '{}' does not verify", issuer.subject)))
    }
}

/// A certificate chain, leaf first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateChain {
    /// Certificates from leaf to root
    pub certificates: Vec<Certificate>,
}

impl CertificateChain {
    /// Parse a chain document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| SignatureError::malformed(format!("invalid certificate chain: {e}")))
    }

    /// Render as a chain document
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// The signing certificate
    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificates.first()
    }

    /// The certificate that must match the trust anchor
    pub fn root(&self) -> Option<&Certificate> {
        self.certificates.last()
    }
}

/// SHA-256 fingerprint (hex) of a public key
pub fn key_fingerprint(key: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Decode base64 in either alphabet, with or without padding
pub fn decode_base64(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim().trim_end_matches('=');
    let decoded = if trimmed.contains(['+', '/']) {
        STANDARD_NO_PAD.decode(trimmed)
    } else {
        URL_SAFE_NO_PAD.decode(trimmed)
    };
    decoded.map_err(|e| SignatureError::malformed(format!("invalid base64: {e}")))
}

/// Decode an Ed25519 signature value
pub fn decode_signature(value: &str) -> Result<Signature> {
    let raw = decode_base64(value)?;
    let bytes: [u8; SIGNATURE_LENGTH] = raw.as_slice().try_into().map_err(|_| {
        SignatureError::malformed(format!(
            "signature is {} bytes, expected {SIGNATURE_LENGTH}",
            raw.len()
        ))
    })?;
    Ok(Signature::from_bytes(&bytes))
}

/// Encode a public key the way chains carry it
pub fn encode_public_key(key: &VerifyingKey) -> String {
    STANDARD.encode(key.as_bytes())
}
