//! Applying changesets to the cached record set

use remote_settings_core::Record;
use serde::Serialize;
use std::collections::BTreeMap;

/// How a changeset relates to the local records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// The changeset lists the whole collection: anything absent is removed
    Full,
    /// The changeset lists only changes since the local cursor
    Incremental,
}

/// A record that changed content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordUpdate {
    /// Previous version
    pub old: Record,
    /// New version
    pub new: Record,
}

/// Difference between two record sets
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Changes {
    /// Records that did not exist before
    pub created: Vec<Record>,
    /// Records whose content changed
    pub updated: Vec<RecordUpdate>,
    /// Records that no longer exist
    pub deleted: Vec<Record>,
}

impl Changes {
    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Merge `changes` into `local`.
///
/// Returns the resulting record set sorted by id, without tombstones. When
/// the same id appears several times in `changes`, the version with the
/// highest `last_modified` wins.
pub fn apply_changes(local: &[Record], changes: &[Record], mode: MergeMode) -> Vec<Record> {
    let mut latest: BTreeMap<&str, &Record> = BTreeMap::new();
    for change in changes {
        match latest.get(change.id.as_str()) {
            Some(existing) if existing.last_modified > change.last_modified => {}
            _ => {
                latest.insert(change.id.as_str(), change);
            }
        }
    }

    let mut merged: BTreeMap<&str, &Record> = match mode {
        MergeMode::Full => BTreeMap::new(),
        MergeMode::Incremental => local.iter().map(|r| (r.id.as_str(), r)).collect(),
    };
    for (id, change) in latest {
        if change.deleted {
            merged.remove(id);
        } else {
            merged.insert(id, change);
        }
    }
    merged.into_values().cloned().collect()
}

/// Difference between `old` and `new`, both without tombstones
pub fn diff(old: &[Record], new: &[Record]) -> Changes {
    let before: BTreeMap<&str, &Record> = old.iter().map(|r| (r.id.as_str(), r)).collect();
    let after: BTreeMap<&str, &Record> = new.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut changes = Changes::default();
    for (id, record) in &after {
        match before.get(id) {
            None => changes.created.push((*record).clone()),
            Some(previous) if *previous != *record => changes.updated.push(RecordUpdate {
                old: (*previous).clone(),
                new: (*record).clone(),
            }),
            Some(_) => {}
        }
    }
    for (id, record) in &before {
        if !after.contains_key(id) {
            changes.deleted.push((*record).clone());
        }
    }
    changes
}
