//! The Local Store abstraction

use crate::{entry::StoredCollection, error::Result};
use async_trait::async_trait;
use remote_settings_core::CollectionKey;

/// Persistent state of every synced collection.
///
/// `put` replaces a collection's state as a whole; implementations must never
/// expose a partially written state, even across a crash.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Last known-good state of `key`
    async fn get(&self, key: &CollectionKey) -> Result<Option<StoredCollection>>;

    /// Replace the state of `key`
    async fn put(&self, key: &CollectionKey, entry: StoredCollection) -> Result<()>;

    /// Forget everything about `key`
    async fn clear(&self, key: &CollectionKey) -> Result<()>;

    /// Every collection with stored state
    async fn keys(&self) -> Result<Vec<CollectionKey>>;

    /// Check if `key` has stored state
    async fn contains(&self, key: &CollectionKey) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
