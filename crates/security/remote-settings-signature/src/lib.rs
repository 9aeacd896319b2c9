//! # Remote Settings Signature
//!
//! Content signatures for remote settings collections. A collection is
//! canonically serialized, prefixed with `Content-Signature:\0` and signed
//! with Ed25519 by the leaf of a certificate chain whose root is pinned by
//! fingerprint.
//!
//! ```rust
//! use remote_settings_signature::{ChainBuilder, SignatureVerifier};
//! use remote_settings_core::{Record, SignerSettings};
//! use serde_json::json;
//!
//! let builder = ChainBuilder::new("root", [1; 32], "signer.example.com", [2; 32]);
//! let chain = builder.build();
//! let signer = builder.signer("https://certs.example.com/chain.json");
//!
//! let records = vec![Record::new("a", 1, json!({"value": 1}))];
//! let metadata = signer.sign(&records, 1);
//!
//! let verifier = SignatureVerifier::new(&SignerSettings {
//!     trust_anchor: builder.trust_anchor().to_string(),
//!     signer_subject: "signer.example.com".to_string(),
//!     allowed_x5u_hosts: vec!["certs.example.com".to_string()],
//! })
//! .unwrap();
//! assert!(verifier.verify(&records, 1, &metadata, &chain, chrono::Utc::now()).is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod anchor;
pub mod canonical;
pub mod certificate;
pub mod error;
pub mod metadata;
pub mod signer;
pub mod verifier;

pub use anchor::TrustAnchor;
pub use canonical::{canonical_json, serialize_records, signed_message};
pub use certificate::{Certificate, CertificateChain};
pub use error::{Result, SignatureError};
pub use metadata::SignatureMetadata;
pub use signer::{ChainBuilder, ContentSigner};
pub use verifier::SignatureVerifier;
