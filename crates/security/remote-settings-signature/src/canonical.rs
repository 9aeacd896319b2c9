//! Canonical serialization of record sets.
//!
//! Signer and verifier must agree on the exact bytes, so object keys are
//! sorted at every depth here instead of relying on map ordering, and no
//! whitespace is emitted.

use remote_settings_core::Record;
use serde_json::{Map, Value};

/// Prefix of every signed content message
pub const CONTENT_SIGNATURE_PREFIX: &[u8] = b"Content-Signature:\x00";

/// Canonical JSON text of `value`
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key.as_str()]);
            }
            out.push('}');
        }
        // Scalars: serde_json's compact form is already canonical
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push_str(&Value::String(s.to_string()).to_string());
}

fn record_value(record: &Record) -> Value {
    let mut map: Map<String, Value> = record.fields.clone();
    map.insert("id".to_string(), Value::String(record.id.clone()));
    map.insert("last_modified".to_string(), Value::from(record.last_modified));
    Value::Object(map)
}

/// Canonical serialization of a record set at `timestamp`.
///
/// Tombstones are excluded and records are ordered by id, whatever the
/// input order.
pub fn serialize_records(records: &[Record], timestamp: u64) -> String {
    let mut live: Vec<&Record> = records.iter().filter(|r| !r.deleted).collect();
    live.sort_by(|a, b| a.id.cmp(&b.id));

    let mut envelope = Map::new();
    envelope.insert(
        "data".to_string(),
        Value::Array(live.into_iter().map(record_value).collect()),
    );
    envelope.insert("last_modified".to_string(), Value::String(timestamp.to_string()));
    canonical_json(&Value::Object(envelope))
}

/// Bytes covered by the content signature
pub fn signed_message(records: &[Record], timestamp: u64) -> Vec<u8> {
    let body = serialize_records(records, timestamp);
    let mut message = Vec::with_capacity(CONTENT_SIGNATURE_PREFIX.len() + body.len());
    message.extend_from_slice(CONTENT_SIGNATURE_PREFIX);
    message.extend_from_slice(body.as_bytes());
    message
}
