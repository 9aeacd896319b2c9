//! # Remote Settings Storage
//!
//! The Local Store: last known-good state of every synced collection, keyed
//! by `(bucket, collection)` and persisted in one versioned store file per
//! profile.
//!
//! ```rust,no_run
//! use remote_settings_storage::{FileStore, LocalStore, StoredCollection};
//! use remote_settings_core::{CollectionKey, Record};
//!
//! # async fn example() -> remote_settings_storage::Result<()> {
//! let store = FileStore::open("/tmp/remote-settings.json").await;
//! let key = CollectionKey::new("main", "search-config");
//! store.put(&key, StoredCollection::from_dump(Vec::<Record>::new(), 0)).await?;
//! assert!(store.get(&key).await?.is_some());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backends;
pub mod entry;
pub mod error;
pub mod traits;

pub use backends::{FileStore, MemoryStore, ResetReason, StoreStatus};
pub use entry::{DataSource, StoredCollection, SCHEMA_VERSION};
pub use error::{Result, StorageError};
pub use traits::LocalStore;

use remote_settings_core::RemoteSettingsError;

// Map StorageError to RemoteSettingsError
impl From<StorageError> for RemoteSettingsError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SchemaMismatch { found, expected } => {
                RemoteSettingsError::SchemaVersionMismatch { found, expected }
            }
            StorageError::Serialization(msg) | StorageError::Deserialization(msg) => {
                RemoteSettingsError::Serialization(msg)
            }
            StorageError::Io(e) => RemoteSettingsError::Storage(e.to_string()),
            StorageError::Other(msg) => RemoteSettingsError::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: RemoteSettingsError = StorageError::SchemaMismatch { found: 1, expected: 2 }.into();
        assert_eq!(err, RemoteSettingsError::SchemaVersionMismatch { found: 1, expected: 2 });

        let err: RemoteSettingsError = StorageError::from("disk full").into();
        assert_eq!(err, RemoteSettingsError::Storage("disk full".to_string()));
    }
}
