//! Pinned trust anchor

use crate::certificate::key_fingerprint;
use crate::error::{Result, SignatureError};
use ed25519_dalek::VerifyingKey;
use std::fmt;

/// SHA-256 fingerprint of the only root key the client trusts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustAnchor([u8; 32]);

impl TrustAnchor {
    /// Parse a hex fingerprint
    pub fn from_hex(fingerprint: &str) -> Result<Self> {
        let raw = hex::decode(fingerprint.trim())
            .map_err(|e| SignatureError::malformed(format!("invalid trust anchor: {e}")))?;
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::malformed("trust anchor must be a SHA-256 fingerprint"))?;
        Ok(Self(bytes))
    }

    /// Anchor pinning `key`
    pub fn for_key(key: &VerifyingKey) -> Self {
        use sha2::{Digest, Sha256};
        Self(Sha256::digest(key.as_bytes()).into())
    }

    /// Whether `key` is the pinned root key
    pub fn matches(&self, key: &VerifyingKey) -> bool {
        key_fingerprint(key) == self.to_string()
    }
}

impl fmt::Display for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
