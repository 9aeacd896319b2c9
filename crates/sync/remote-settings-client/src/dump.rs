//! Bundled dumps used for cold start.
//!
//! A dump is a build-time snapshot of one collection shipped with the
//! application, stored as `<dir>/<bucket>/<collection>.json`:
//!
//! ```json
//! {"data": [{"id": "a", "last_modified": 1, "value": 1}], "timestamp": 1}
//! ```
//!
//! Dumps are trusted as shipped and never signature-checked.

use async_trait::async_trait;
use remote_settings_core::{CollectionKey, Record, RemoteSettingsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Snapshot of one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dump {
    /// Records of the collection
    #[serde(rename = "data")]
    pub records: Vec<Record>,
    /// Collection timestamp; the highest record timestamp when absent
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl Dump {
    /// Build a dump
    pub fn new(records: Vec<Record>, timestamp: u64) -> Self {
        Self {
            records,
            timestamp: Some(timestamp),
        }
    }

    /// Collection timestamp of the snapshot
    pub fn timestamp(&self) -> u64 {
        self.timestamp
            .unwrap_or_else(|| self.records.iter().map(|r| r.last_modified).max().unwrap_or(0))
    }
}

/// Source of bundled dumps
#[async_trait]
pub trait DumpProvider: Send + Sync {
    /// The dump of `key`, if one is bundled
    async fn load(&self, key: &CollectionKey) -> Result<Option<Dump>>;
}

/// Dumps read from a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryDumps {
    root: PathBuf,
}

impl DirectoryDumps {
    /// Read dumps below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of the dump for `key`
    pub fn path_for(&self, key: &CollectionKey) -> PathBuf {
        self.root
            .join(&key.bucket)
            .join(format!("{}.json", key.collection))
    }
}

#[async_trait]
impl DumpProvider for DirectoryDumps {
    async fn load(&self, key: &CollectionKey) -> Result<Option<Dump>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RemoteSettingsError::dump(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RemoteSettingsError::dump(format!("invalid dump {}: {e}", path.display())))
    }
}

/// Dumps held in memory, e.g. compiled into the binary
#[derive(Debug, Clone, Default)]
pub struct StaticDumps {
    dumps: HashMap<CollectionKey, Dump>,
}

impl StaticDumps {
    /// No dumps at all
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the dump of `key`
    pub fn with(mut self, key: CollectionKey, dump: Dump) -> Self {
        self.dumps.insert(key, dump);
        self
    }
}

#[async_trait]
impl DumpProvider for StaticDumps {
    async fn load(&self, key: &CollectionKey) -> Result<Option<Dump>> {
        Ok(self.dumps.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_directory_dumps() {
        let dir = tempfile::TempDir::new().unwrap();
        let key = CollectionKey::new("main", "search-config");
        let dumps = DirectoryDumps::new(dir.path());

        assert_eq!(dumps.load(&key).await.unwrap(), None);

        std::fs::create_dir_all(dir.path().join("main")).unwrap();
        std::fs::write(
            dumps.path_for(&key),
            json!({"data": [{"id": "a", "last_modified": 7, "value": 1}]}).to_string(),
        )
        .unwrap();
        let dump = dumps.load(&key).await.unwrap().unwrap();
        assert_eq!(dump.records.len(), 1);
        assert_eq!(dump.timestamp(), 7);

        std::fs::write(dumps.path_for(&key), "not json").unwrap();
        assert!(matches!(dumps.load(&key).await, Err(RemoteSettingsError::Dump(_))));
    }

    #[tokio::test]
    async fn test_static_dumps() {
        let key = CollectionKey::new("main", "a");
        let dumps = StaticDumps::new().with(key.clone(), Dump::new(Vec::new(), 5));
        assert_eq!(dumps.load(&key).await.unwrap().map(|d| d.timestamp()), Some(5));
        assert!(dumps.load(&CollectionKey::new("main", "b")).await.unwrap().is_none());
    }
}
