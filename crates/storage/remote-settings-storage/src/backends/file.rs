//! File-backed store: one JSON document per profile.
//!
//! The whole store lives in memory and is rewritten on every change. Writes
//! go to `<file>.tmp`, are fsynced and then renamed over the store file, so a
//! reader (or a restarted process) only ever sees a complete document.

use crate::{
    entry::{StoredCollection, SCHEMA_VERSION},
    error::{Result, StorageError},
    traits::LocalStore,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use remote_settings_core::CollectionKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Why an existing store file was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// The file could not be read or parsed
    Corrupt,
    /// The file was written with another schema version
    SchemaMismatch {
        /// Version found on disk (`0` when absent)
        found: u32,
    },
}

impl ResetReason {
    fn label(self) -> &'static str {
        match self {
            ResetReason::Corrupt => "corrupt",
            ResetReason::SchemaMismatch { .. } => "schema_mismatch",
        }
    }
}

/// Outcome of opening the store file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// No store file existed
    Fresh,
    /// The existing file was loaded
    Loaded,
    /// The existing file was discarded and the store starts empty
    Reset(ResetReason),
}

/// On disk, collections nest under their bucket so that no key ever has to
/// be parsed back out of a joined string.
#[derive(Serialize)]
struct DocumentRef<'a> {
    schema_version: u32,
    collections: BTreeMap<&'a str, BTreeMap<&'a str, &'a StoredCollection>>,
}

impl<'a> DocumentRef<'a> {
    fn new(cache: &'a BTreeMap<CollectionKey, StoredCollection>) -> Self {
        let mut collections: BTreeMap<&str, BTreeMap<&str, &StoredCollection>> = BTreeMap::new();
        for (key, entry) in cache {
            collections
                .entry(key.bucket.as_str())
                .or_default()
                .insert(key.collection.as_str(), entry);
        }
        Self {
            schema_version: SCHEMA_VERSION,
            collections,
        }
    }
}

#[derive(Deserialize)]
struct Document {
    collections: BTreeMap<String, BTreeMap<String, StoredCollection>>,
}

impl Document {
    fn into_cache(self) -> BTreeMap<CollectionKey, StoredCollection> {
        self.collections
            .into_iter()
            .flat_map(|(bucket, collections)| {
                collections
                    .into_iter()
                    .map(move |(collection, entry)| (CollectionKey::new(bucket.clone(), collection), entry))
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    schema_version: u32,
}

/// Store persisted as a single JSON file
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    cache: Arc<RwLock<BTreeMap<CollectionKey, StoredCollection>>>,
    write_lock: Arc<Mutex<()>>,
    status: StoreStatus,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// Never fails: an unreadable file, a corrupt document or a schema
    /// mismatch all yield an empty store, reported through [`Self::status`].
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent).await {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create store directory");
            }
        }

        let (collections, status) = match fs::read(&path).await {
            Ok(bytes) => load_document(&path, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (BTreeMap::new(), StoreStatus::Fresh),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Store file unreadable, starting empty");
                (BTreeMap::new(), StoreStatus::Reset(ResetReason::Corrupt))
            }
        };

        let store = Self {
            path,
            cache: Arc::new(RwLock::new(collections)),
            write_lock: Arc::new(Mutex::new(())),
            status,
        };

        if let StoreStatus::Reset(reason) = status {
            metrics::counter!("remote_settings_store_resets_total", "reason" => reason.label())
                .increment(1);
            if let Err(e) = store.persist().await {
                tracing::warn!(path = %store.path.display(), error = %e, "Failed to rewrite reset store");
            }
        }

        tracing::debug!(
            path = %store.path.display(),
            status = ?store.status,
            collections = store.cache.read().len(),
            "Opened local store"
        );
        store
    }

    /// How the store file was found when opened
    pub fn status(&self) -> StoreStatus {
        self.status
    }

    /// Location of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current in-memory state to disk
    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let bytes = {
            let cache = self.cache.read();
            serde_json::to_vec(&DocumentRef::new(&cache))
            .map_err(|e| StorageError::Serialization(e.to_string()))?
        };

        write_atomic(&self.path, &bytes).await
    }
}

fn load_document(path: &Path, bytes: &[u8]) -> (BTreeMap<CollectionKey, StoredCollection>, StoreStatus) {
    let found = match serde_json::from_slice::<VersionProbe>(bytes) {
        Ok(probe) => probe.schema_version,
        Err(e) => {
            let err = StorageError::Deserialization(e.to_string());
            tracing::warn!(path = %path.display(), error = %err, "Store file corrupt, starting empty");
            return (BTreeMap::new(), StoreStatus::Reset(ResetReason::Corrupt));
        }
    };

    if found != SCHEMA_VERSION {
        let err = StorageError::SchemaMismatch {
            found,
            expected: SCHEMA_VERSION,
        };
        tracing::warn!(path = %path.display(), error = %err, "Resetting local store");
        return (BTreeMap::new(), StoreStatus::Reset(ResetReason::SchemaMismatch { found }));
    }

    match serde_json::from_slice::<Document>(bytes) {
        Ok(document) => (document.into_cache(), StoreStatus::Loaded),
        Err(e) => {
            let err = StorageError::Deserialization(e.to_string());
            tracing::warn!(path = %path.display(), error = %err, "Store entries corrupt, starting empty");
            (BTreeMap::new(), StoreStatus::Reset(ResetReason::Corrupt))
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    let written = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp).await;
        return Err(StorageError::Io(e));
    }
    Ok(())
}

#[async_trait]
impl LocalStore for FileStore {
    async fn get(&self, key: &CollectionKey) -> Result<Option<StoredCollection>> {
        Ok(self.cache.read().get(key).cloned())
    }

    async fn put(&self, key: &CollectionKey, entry: StoredCollection) -> Result<()> {
        self.cache.write().insert(key.clone(), entry);
        self.persist().await
    }

    async fn clear(&self, key: &CollectionKey) -> Result<()> {
        let removed = self.cache.write().remove(key).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<CollectionKey>> {
        Ok(self.cache.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_settings_core::Record;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_tmp_path() {
        assert_eq!(
            tmp_path(Path::new("/profile/remote-settings.json")),
            PathBuf::from("/profile/remote-settings.json.tmp")
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_fresh() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("nested/store.json")).await;
        assert_eq!(store.status(), StoreStatus::Fresh);
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path).await;

        // A directory where the temp file should go makes the write fail.
        std::fs::create_dir(tmp_path(&path)).unwrap();

        let key = CollectionKey::new("main", "a");
        let entry = StoredCollection::from_dump(vec![Record::new("x", 1, json!({}))], 1);
        assert!(store.put(&key, entry.clone()).await.unwrap_err().is_io());
        assert_eq!(store.get(&key).await.unwrap(), Some(entry));
    }
}
