//! Persisted collection state

use chrono::{DateTime, Utc};
use remote_settings_core::{sort_records, Record};
use serde::{Deserialize, Serialize};

/// Schema version written into every store file.
///
/// Bump whenever [`StoredCollection`] or the store document changes shape.
/// A store file carrying any other version is discarded on open.
pub const SCHEMA_VERSION: u32 = 3;

/// Where the stored records came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Loaded from the dump bundled with the application
    Dump,
    /// Fetched from the server and verified
    Network,
}

/// Last known-good state of one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCollection {
    /// Full record set, sorted by id, never containing tombstones
    pub records: Vec<Record>,
    /// Collection timestamp (`last_modified` cursor)
    pub timestamp: u64,
    /// Digest of the last verified signature; `None` for dump data
    pub signature_digest: Option<String>,
    /// When this state was written
    pub synced_at: DateTime<Utc>,
    /// Origin of the records
    pub source: DataSource,
}

impl StoredCollection {
    /// State freshly verified from the network
    pub fn verified(mut records: Vec<Record>, timestamp: u64, digest: impl Into<String>) -> Self {
        sort_records(&mut records);
        Self {
            records,
            timestamp,
            signature_digest: Some(digest.into()),
            synced_at: Utc::now(),
            source: DataSource::Network,
        }
    }

    /// State loaded from a bundled dump
    pub fn from_dump(mut records: Vec<Record>, timestamp: u64) -> Self {
        records.retain(|r| !r.deleted);
        sort_records(&mut records);
        Self {
            records,
            timestamp,
            signature_digest: None,
            synced_at: Utc::now(),
            source: DataSource::Dump,
        }
    }
}
