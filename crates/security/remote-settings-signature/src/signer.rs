//! Signing side, for test fixtures, mirrors and dump tooling.
//!
//! Keys are derived from caller-provided 32-byte seeds.

use crate::anchor::TrustAnchor;
use crate::canonical::signed_message;
use crate::certificate::{encode_public_key, Certificate, CertificateChain};
use crate::metadata::{SignatureMetadata, MODE_ED25519};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use remote_settings_core::Record;

/// Signs collection content with the leaf key of a chain
#[derive(Clone)]
pub struct ContentSigner {
    key: SigningKey,
    x5u: String,
}

impl ContentSigner {
    /// Signer for `seed`, advertising the chain at `x5u`
    pub fn from_seed(seed: [u8; 32], x5u: impl Into<String>) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
            x5u: x5u.into(),
        }
    }

    /// Public half of the signing key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Sign raw content bytes, returning base64url
    pub fn sign_message(&self, message: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(self.key.sign(message).to_bytes())
    }

    /// Sign a record set at `timestamp`
    pub fn sign(&self, records: &[Record], timestamp: u64) -> SignatureMetadata {
        SignatureMetadata {
            signature: self.sign_message(&signed_message(records, timestamp)),
            x5u: self.x5u.clone(),
            mode: MODE_ED25519.to_string(),
        }
    }
}

struct Authority {
    subject: String,
    key: SigningKey,
}

impl Authority {
    fn new(subject: impl Into<String>, seed: [u8; 32]) -> Self {
        Self {
            subject: subject.into(),
            key: SigningKey::from_bytes(&seed),
        }
    }
}

/// Builds a certificate chain from a self-signed root down to a leaf
pub struct ChainBuilder {
    root: Authority,
    intermediates: Vec<Authority>,
    leaf: Authority,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl ChainBuilder {
    /// Chain with a root and a leaf, valid from yesterday for a year
    pub fn new(
        root_subject: impl Into<String>,
        root_seed: [u8; 32],
        leaf_subject: impl Into<String>,
        leaf_seed: [u8; 32],
    ) -> Self {
        let now = Utc::now();
        Self {
            root: Authority::new(root_subject, root_seed),
            intermediates: Vec::new(),
            leaf: Authority::new(leaf_subject, leaf_seed),
            not_before: now - Duration::days(1),
            not_after: now + Duration::days(365),
        }
    }

    /// Add an intermediate below the previous one (or below the root)
    pub fn intermediate(mut self, subject: impl Into<String>, seed: [u8; 32]) -> Self {
        self.intermediates.push(Authority::new(subject, seed));
        self
    }

    /// Validity window of every certificate
    pub fn validity(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    /// Anchor pinning this chain's root
    pub fn trust_anchor(&self) -> TrustAnchor {
        TrustAnchor::for_key(&self.root.key.verifying_key())
    }

    /// Signer holding the leaf key
    pub fn signer(&self, x5u: impl Into<String>) -> ContentSigner {
        ContentSigner {
            key: self.leaf.key.clone(),
            x5u: x5u.into(),
        }
    }

    /// Issue every certificate, leaf first
    pub fn build(&self) -> CertificateChain {
        // Top-down order: root, intermediates, leaf
        let mut authorities: Vec<&Authority> = vec![&self.root];
        authorities.extend(self.intermediates.iter());
        authorities.push(&self.leaf);

        let mut certificates: Vec<Certificate> = authorities
            .iter()
            .enumerate()
            .map(|(i, subject)| {
                let issuer = if i == 0 { subject } else { &authorities[i - 1] };
                self.issue(subject, issuer)
            })
            .collect();
        certificates.reverse();
        CertificateChain { certificates }
    }

    fn issue(&self, subject: &Authority, issuer: &Authority) -> Certificate {
        let mut cert = Certificate {
            subject: subject.subject.clone(),
            issuer: issuer.subject.clone(),
            public_key: encode_public_key(&subject.key.verifying_key()),
            not_before: self.not_before,
            not_after: self.not_after,
            signature: String::new(),
        };
        cert.signature = URL_SAFE_NO_PAD.encode(issuer.key.sign(&cert.tbs_bytes()).to_bytes());
        cert
    }
}
