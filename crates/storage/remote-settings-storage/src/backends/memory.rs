//! In-memory store for tests and ephemeral profiles

use crate::{entry::StoredCollection, error::Result, traits::LocalStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use remote_settings_core::CollectionKey;
use std::collections::HashMap;
use std::sync::Arc;

/// Store that keeps everything in a map and forgets it on drop
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<CollectionKey, StoredCollection>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored collections
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &CollectionKey) -> Result<Option<StoredCollection>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &CollectionKey, entry: StoredCollection) -> Result<()> {
        self.data.write().insert(key.clone(), entry);
        Ok(())
    }

    async fn clear(&self, key: &CollectionKey) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<CollectionKey>> {
        let mut keys: Vec<_> = self.data.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
