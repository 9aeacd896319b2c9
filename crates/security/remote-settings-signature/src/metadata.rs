//! Signature metadata attached to a collection

use serde::{Deserialize, Serialize};

/// Signature mode this client verifies
pub const MODE_ED25519: &str = "ed25519";

/// Signature of a collection as published by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureMetadata {
    /// Signature value, base64url
    pub signature: String,
    /// Location of the certificate chain
    pub x5u: String,
    /// Signature mode
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    MODE_ED25519.to_string()
}
