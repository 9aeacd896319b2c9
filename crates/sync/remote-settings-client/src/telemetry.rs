//! Metric names and recording helpers

use remote_settings_core::CollectionKey;
use std::time::Duration;

/// Sync cycles by collection and outcome
pub const SYNC_TOTAL: &str = "remote_settings_sync_total";
/// Signature verification failures
pub const SIGNATURE_FAILURES_TOTAL: &str = "remote_settings_signature_failures_total";
/// Store-clear-and-retry recovery attempts
pub const RECOVERIES_TOTAL: &str = "remote_settings_recoveries_total";
/// Local Store read and write failures
pub const STORAGE_ERRORS_TOTAL: &str = "remote_settings_storage_errors_total";
/// Duration of sync cycles
pub const SYNC_DURATION_SECONDS: &str = "remote_settings_sync_duration_seconds";

pub(crate) fn record_sync(key: &CollectionKey, outcome: &'static str, elapsed: Duration) {
    metrics::counter!(SYNC_TOTAL, "collection" => key.to_string(), "outcome" => outcome).increment(1);
    metrics::histogram!(SYNC_DURATION_SECONDS, "collection" => key.to_string())
        .record(elapsed.as_secs_f64());
}

pub(crate) fn record_signature_failure(key: &CollectionKey, kind: &'static str) {
    metrics::counter!(SIGNATURE_FAILURES_TOTAL, "collection" => key.to_string(), "kind" => kind)
        .increment(1);
}

pub(crate) fn record_recovery(key: &CollectionKey) {
    metrics::counter!(RECOVERIES_TOTAL, "collection" => key.to_string()).increment(1);
}

pub(crate) fn record_storage_error(op: &'static str, kind: &'static str) {
    metrics::counter!(STORAGE_ERRORS_TOTAL, "op" => op, "kind" => kind).increment(1);
}
