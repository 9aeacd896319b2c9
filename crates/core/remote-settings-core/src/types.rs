//! Record and collection types

use crate::error::RemoteSettingsError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Field carrying a record's targeting expression.
pub const FILTER_EXPRESSION_FIELD: &str = "filter_expression";

/// A single JSON document in a collection.
///
/// `id` and `last_modified` are lifted out of the document; everything else
/// stays in [`Record::fields`]. `deleted` is only ever set on tombstones
/// inside an incremental changeset and is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique id within the collection
    pub id: String,

    /// Server timestamp of this record version, in milliseconds
    #[serde(default)]
    pub last_modified: u64,

    /// Tombstone marker
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,

    /// Arbitrary record fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl Record {
    /// Build a record from an id, a timestamp and a JSON object of fields.
    ///
    /// Non-object `fields` values are ignored.
    pub fn new(id: impl Into<String>, last_modified: u64, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            last_modified,
            deleted: false,
            fields,
        }
    }

    /// Build a tombstone for `id`
    pub fn tombstone(id: impl Into<String>, last_modified: u64) -> Self {
        Self {
            id: id.into(),
            last_modified,
            deleted: true,
            fields: Map::new(),
        }
    }

    /// Look up a field
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The record's targeting expression, if it has a non-empty one
    #[must_use]
    pub fn filter_expression(&self) -> Option<&str> {
        self.fields
            .get(FILTER_EXPRESSION_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
    }
}

/// Identifies one collection: `(bucket, collection)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionKey {
    /// Bucket name, e.g. `main`
    pub bucket: String,
    /// Collection id, e.g. `hijack-blocklists`
    pub collection: String,
}

impl CollectionKey {
    /// Create a key
    pub fn new(bucket: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            collection: collection.into(),
        }
    }

    /// Create a key, rejecting ids [`CollectionKey::validate_id`] refuses
    pub fn try_new(bucket: &str, collection: &str) -> Result<Self, RemoteSettingsError> {
        Self::validate_id("bucket", bucket)?;
        Self::validate_id("collection", collection)?;
        Ok(Self::new(bucket, collection))
    }

    /// Check that a bucket or collection id can be used as one path segment.
    ///
    /// Ids must be non-empty, must not contain `/` and must not carry
    /// whitespace or control characters.
    pub fn validate_id(what: &str, id: &str) -> Result<(), RemoteSettingsError> {
        if id.is_empty() {
            return Err(RemoteSettingsError::config(format!("{what} id must not be empty")));
        }
        if let Some(c) = id.chars().find(|c| *c == '/' || c.is_whitespace() || c.is_control()) {
            return Err(RemoteSettingsError::config(format!(
                "{what} id '{id}' contains invalid character {c:?}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.collection)
    }
}

impl FromStr for CollectionKey {
    type Err = RemoteSettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((bucket, collection)) => Self::try_new(bucket, collection),
            None => Err(RemoteSettingsError::config(format!(
                "invalid collection key '{s}', expected 'bucket/collection'"
            ))),
        }
    }
}

impl Serialize for CollectionKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CollectionKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What consumers see for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Which collection this is
    pub key: CollectionKey,
    /// Records sorted by id, filtered for the current application context
    pub records: Vec<Record>,
    /// Collection timestamp, `0` when nothing has been loaded
    pub timestamp: u64,
}

impl Collection {
    /// An empty collection
    #[must_use]
    pub fn empty(key: CollectionKey) -> Self {
        Self {
            key,
            records: Vec::new(),
            timestamp: 0,
        }
    }

    /// Find a record by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records
            .binary_search_by(|r| r.id.as_str().cmp(id))
            .ok()
            .map(|idx| &self.records[idx])
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection has no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Sort records by id, the canonical order everywhere in the client.
pub fn sort_records(records: &mut [Record]) {
    records.sort_by(|a, b| a.id.cmp(&b.id));
}
