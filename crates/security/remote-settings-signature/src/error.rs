//! Signature verification errors

use thiserror::Error;

/// Result alias for signature operations
pub type Result<T> = std::result::Result<T, SignatureError>;

/// Why a record set or certificate chain was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Only `ed25519` signatures are understood
    #[error("unsupported signature mode: {0}")]
    UnsupportedMode(String),

    /// The certificate chain URL is not https or not on an allowed host
    #[error("untrusted certificate chain location: {0}")]
    UntrustedX5u(String),

    /// The certificate chain has no certificates
    #[error("certificate chain is empty")]
    EmptyChain,

    /// A certificate is past its validity window
    #[error("certificate '{subject}' expired at {not_after}")]
    Expired {
        /// Certificate subject
        subject: String,
        /// End of validity (RFC 3339)
        not_after: String,
    },

    /// A certificate is not valid yet
    #[error("certificate '{subject}' not valid before {not_before}")]
    NotYetValid {
        /// Certificate subject
        subject: String,
        /// Start of validity (RFC 3339)
        not_before: String,
    },

    /// The leaf certificate was issued to someone else
    #[error("leaf subject '{found}' does not match expected '{expected}'")]
    SubjectMismatch {
        /// Subject the client expects
        expected: String,
        /// Subject found on the leaf
        found: String,
    },

    /// A certificate is not signed by the next one in the chain
    #[error("broken certificate chain at '{subject}': {reason}")]
    BrokenChain {
        /// Subject of the offending certificate
        subject: String,
        /// What went wrong
        reason: String,
    },

    /// The root key does not match the pinned trust anchor
    #[error("root certificate fingerprint {0} is not trusted")]
    UntrustedRoot(String),

    /// The content signature does not verify
    #[error("content signature does not match")]
    BadSignature,

    /// Undecodable key, signature or chain document
    #[error("malformed signature data: {0}")]
    Malformed(String),
}

impl SignatureError {
    /// Create a malformed-data error
    pub fn malformed<T: std::fmt::Display>(msg: T) -> Self {
        Self::Malformed(msg.to_string())
    }

    /// Short label for telemetry
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnsupportedMode(_) => "unsupported_mode",
            Self::UntrustedX5u(_) => "untrusted_x5u",
            Self::EmptyChain => "empty_chain",
            Self::Expired { .. } => "expired",
            Self::NotYetValid { .. } => "not_yet_valid",
            Self::SubjectMismatch { .. } => "subject_mismatch",
            Self::BrokenChain { .. } => "broken_chain",
            Self::UntrustedRoot(_) => "untrusted_root",
            Self::BadSignature => "bad_signature",
            Self::Malformed(_) => "malformed",
        }
    }
}
