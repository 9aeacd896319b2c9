//! Error types for the storage module

use thiserror::Error;

/// Type alias for Results using StorageError
pub type Result<T> = std::result::Result<T, StorageError>;

/// Main error type for storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The store file was written by an incompatible schema
    #[error("Schema version mismatch: found {found}, expected {expected}")]
    SchemaMismatch {
        /// Version found on disk
        found: u32,
        /// Version this build writes
        expected: u32,
    },

    /// Other error with custom message
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Check if the error came from the filesystem
    pub fn is_io(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }

    /// Short label used for telemetry
    pub fn label(&self) -> &'static str {
        match self {
            StorageError::Io(_) => "io",
            StorageError::Serialization(_) => "serialization",
            StorageError::Deserialization(_) => "deserialization",
            StorageError::SchemaMismatch { .. } => "schema",
            StorageError::Other(_) => "other",
        }
    }
}

impl From<String> for StorageError {
    fn from(s: String) -> Self {
        StorageError::Other(s)
    }
}

impl From<&str> for StorageError {
    fn from(s: &str) -> Self {
        StorageError::Other(s.to_string())
    }
}
