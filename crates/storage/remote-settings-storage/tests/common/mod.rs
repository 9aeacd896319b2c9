//! Common test utilities and fixtures for remote-settings-storage

#![allow(dead_code)]

use remote_settings_core::{CollectionKey, Record};
use remote_settings_storage::{FileStore, StoredCollection};
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

/// Test fixture owning a temporary profile directory
pub struct StoreFixture {
    pub dir: TempDir,
}

impl StoreFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Path of the store file inside the profile
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("remote-settings.json")
    }

    /// Open (or reopen, simulating a restart) the store
    pub async fn open(&self) -> FileStore {
        FileStore::open(self.path()).await
    }
}

pub fn key(collection: &str) -> CollectionKey {
    CollectionKey::new("main", collection)
}

/// A verified entry with `count` records
pub fn sample_entry(count: u64) -> StoredCollection {
    let records = (1..=count)
        .map(|i| Record::new(format!("record-{i:03}"), i * 10, json!({"value": i, "tags": ["a", "b"]})))
        .collect();
    StoredCollection::verified(records, count * 10, "c0ffee")
}
