//! Error types shared by every remote settings crate.
//!
//! All variants carry owned strings so the error is `Clone`: a single sync
//! result is handed to every caller waiting on the same in-flight cycle.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result alias used across the remote settings crates.
pub type Result<T> = std::result::Result<T, RemoteSettingsError>;

/// The main error type for the remote settings client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteSettingsError {
    /// Fetching from the server failed. Recovered locally by serving the cache.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// The signature of a record set did not verify.
    #[error("Invalid signature for {collection}: {reason}")]
    InvalidSignature {
        /// Collection whose records failed verification
        collection: String,
        /// Why verification failed
        reason: String,
    },

    /// Local Store read or write failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// The persisted store uses a schema this build does not understand
    #[error("Schema version mismatch: found {found}, expected {expected}")]
    SchemaVersionMismatch {
        /// Version found on disk
        found: u32,
        /// Version this build writes
        expected: u32,
    },

    /// Invalid or unloadable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A bundled dump could not be read or parsed
    #[error("Bundled dump error: {0}")]
    Dump(String),

    /// The service has been shut down
    #[error("Service is shut down")]
    Shutdown,
}

/// Network failures. None of these are fatal to readers of the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkError {
    /// The request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Connection refused, DNS failure, TLS failure...
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered with a non-2xx status
    #[error("unexpected status {status} from {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// The response body could not be decoded
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The server asked clients to back off
    #[error("server requested backoff for {seconds}s")]
    Backoff {
        /// Remaining backoff in seconds
        seconds: u64,
    },
}

impl RemoteSettingsError {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Create a new storage error
    pub fn storage<T: fmt::Display>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Create a new serialization error
    pub fn serialization<T: fmt::Display>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Create a new dump error
    pub fn dump<T: fmt::Display>(msg: T) -> Self {
        Self::Dump(msg.to_string())
    }

    /// Create a new signature error for `collection`
    pub fn invalid_signature<C: fmt::Display, R: fmt::Display>(collection: C, reason: R) -> Self {
        Self::InvalidSignature {
            collection: collection.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check if the error is a signature verification failure
    #[must_use]
    pub fn is_signature(&self) -> bool {
        matches!(self, Self::InvalidSignature { .. })
    }

    /// Short, stable label for telemetry
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Network(NetworkError::Timeout) => "timeout",
            Self::Network(NetworkError::Backoff { .. }) => "backoff",
            Self::Network(_) => "network",
            Self::InvalidSignature { .. } => "signature",
            Self::Storage(_) => "storage",
            Self::SchemaVersionMismatch { .. } => "schema",
            Self::Configuration(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Dump(_) => "dump",
            Self::Shutdown => "shutdown",
        }
    }
}

impl From<serde_json::Error> for RemoteSettingsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = RemoteSettingsError::from(NetworkError::Timeout);
        assert!(matches!(err, RemoteSettingsError::Network(NetworkError::Timeout)));
        assert!(!err.is_signature());
        assert_eq!(err.label(), "timeout");

        let err = RemoteSettingsError::invalid_signature("main/cfr", "bad signature");
        assert!(err.is_signature());
        assert_eq!(
            err.to_string(),
            "Invalid signature for main/cfr: bad signature"
        );
    }

    #[test]
    fn test_status_display() {
        let err = NetworkError::Status {
            status: 503,
            url: "https://example.com/v1".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected status 503 from https://example.com/v1");
    }
}
