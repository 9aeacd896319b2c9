//! The sync engine: fetch, merge, verify, persist, notify.
//!
//! Each collection moves through [`CollectionState`]s. Cycles of one
//! collection are single-flight: a sync requested while another is running
//! for the same collection joins it and receives the same outcome. Cycles of
//! different collections run concurrently.
//!
//! Merge results are committed (memory and Local Store) only after the full
//! merged record set verified, so an abandoned cycle leaves the previous
//! state in place.

use crate::dump::DumpProvider;
use crate::http::RemoteTransport;
use crate::merge::{apply_changes, diff, MergeMode};
use crate::protocol::{Changeset, ChangesetRequest};
use crate::subscription::{Subscriptions, SyncEvent};
use crate::telemetry;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use remote_settings_core::{
    filter_records, ClientConfig, Collection, CollectionKey, NetworkError, Record,
    RemoteSettingsError, Result,
};
use remote_settings_signature::{
    CertificateChain, SignatureError, SignatureMetadata, SignatureVerifier,
};
use remote_settings_storage::{LocalStore, StoredCollection};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle state of one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionState {
    /// Never read nor synced in this process
    #[default]
    Uninitialized,
    /// Loading the bundled dump
    Bootstrapping,
    /// Changeset request in flight
    Syncing,
    /// Checking the signature of the merged record set
    Verifying,
    /// Serving the merged cache
    Settled,
    /// Retrying after a signature failure
    Recovering,
}

/// Result of one sync cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The server had nothing new
    Unchanged {
        /// Collection timestamp
        timestamp: u64,
    },
    /// New records were verified and committed
    Updated {
        /// New collection timestamp
        timestamp: u64,
        /// Number of created records
        created: usize,
        /// Number of updated records
        updated: usize,
        /// Number of deleted records
        deleted: usize,
        /// Whether a store-clear-and-retry recovery was needed
        recovered: bool,
    },
    /// The server could not be reached; the cached state is still served
    NetworkFailed {
        /// What went wrong
        error: NetworkError,
    },
}

impl SyncOutcome {
    /// Telemetry label
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Unchanged { .. } => "unchanged",
            SyncOutcome::Updated { recovered: false, .. } => "updated",
            SyncOutcome::Updated { recovered: true, .. } => "recovered",
            SyncOutcome::NetworkFailed { error } => {
                RemoteSettingsError::Network(error.clone()).label()
            }
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    state: CollectionState,
    loaded: bool,
    entry: Option<StoredCollection>,
}

/// Why a record set was not accepted
struct Rejection {
    kind: &'static str,
    reason: String,
}

impl Rejection {
    fn new(kind: &'static str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<SignatureError> for Rejection {
    fn from(err: SignatureError) -> Self {
        Self::new(err.label(), err.to_string())
    }
}

enum VerifyFailure {
    Network(NetworkError),
    Signature(Rejection),
}

impl From<SignatureError> for VerifyFailure {
    fn from(err: SignatureError) -> Self {
        Self::Signature(err.into())
    }
}

type SharedSync = Shared<BoxFuture<'static, Result<SyncOutcome>>>;

struct EngineInner {
    config: RwLock<Arc<ClientConfig>>,
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn RemoteTransport>,
    dumps: Arc<dyn DumpProvider>,
    subscriptions: Arc<Subscriptions>,
    slots: RwLock<HashMap<CollectionKey, Slot>>,
    in_flight: Mutex<HashMap<CollectionKey, SharedSync>>,
    chains: RwLock<HashMap<String, Arc<CertificateChain>>>,
}

/// Drives sync cycles for every collection of one client
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Create an engine
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn RemoteTransport>,
        dumps: Arc<dyn DumpProvider>,
        subscriptions: Arc<Subscriptions>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config: RwLock::new(Arc::new(config)),
                store,
                transport,
                dumps,
                subscriptions,
                slots: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                chains: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Arc<ClientConfig> {
        self.inner.config()
    }

    /// Replace the configuration as a whole. Cycles already running keep
    /// their snapshot.
    pub fn replace_config(&self, config: ClientConfig) {
        *self.inner.config.write() = Arc::new(config);
    }

    /// Apply `update` to a copy of the configuration and install it if
    /// `update` reports a change.
    pub fn update_config(&self, update: impl FnOnce(&mut ClientConfig) -> bool) -> bool {
        let mut current = self.inner.config.write();
        let mut next = ClientConfig::clone(&current);
        if update(&mut next) {
            *current = Arc::new(next);
            true
        } else {
            false
        }
    }

    /// Current state of `key`
    pub fn state(&self, key: &CollectionKey) -> CollectionState {
        self.inner
            .slots
            .read()
            .get(key)
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    /// Records of `key` visible to the current application context.
    ///
    /// Loads the Local Store entry, or the bundled dump, on first access.
    /// Never fails: without any data the collection is empty.
    pub async fn get(&self, key: &CollectionKey) -> Collection {
        let entry = self.inner.ensure_loaded(key).await;
        let config = self.inner.config();
        match entry {
            Some(entry) => Collection {
                key: key.clone(),
                records: filter_records(&entry.records, &config.app_context),
                timestamp: entry.timestamp,
            },
            None => Collection::empty(key.clone()),
        }
    }

    /// Run a sync cycle for `key`, or join the one already running.
    ///
    /// Network failures are reported in the outcome; only a signature failure
    /// that survived recovery is an error.
    pub async fn sync_collection(&self, key: &CollectionKey) -> Result<SyncOutcome> {
        let cycle = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(key) {
                Some(running) => {
                    tracing::debug!(collection = %key, "Joining in-flight sync");
                    running.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let task_key = key.clone();
                    let handle = tokio::spawn(async move {
                        let result = inner.run_cycle(&task_key).await;
                        inner.in_flight.lock().remove(&task_key);
                        result
                    });
                    let cycle = async move {
                        handle.await.unwrap_or_else(|e| {
                            tracing::error!(error = %e, "Sync task did not complete");
                            Err(RemoteSettingsError::Shutdown)
                        })
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key.clone(), cycle.clone());
                    cycle
                }
            }
        };
        cycle.await
    }
}

impl EngineInner {
    fn config(&self) -> Arc<ClientConfig> {
        self.config.read().clone()
    }

    fn set_state(&self, key: &CollectionKey, state: CollectionState) {
        self.slots.write().entry(key.clone()).or_default().state = state;
    }

    fn install(&self, key: &CollectionKey, entry: Option<StoredCollection>) {
        let mut slots = self.slots.write();
        let slot = slots.entry(key.clone()).or_default();
        slot.entry = entry;
        slot.loaded = true;
        slot.state = CollectionState::Settled;
    }

    async fn persist(&self, key: &CollectionKey, entry: StoredCollection) {
        if let Err(e) = self.store.put(key, entry).await {
            telemetry::record_storage_error("write", e.label());
            tracing::warn!(collection = %key, error = %e, "Failed to persist collection, keeping in-memory state");
        }
    }

    async fn load_dump(&self, key: &CollectionKey) -> Option<StoredCollection> {
        match self.dumps.load(key).await {
            Ok(Some(dump)) => {
                let timestamp = dump.timestamp();
                tracing::debug!(collection = %key, timestamp, records = dump.records.len(), "Loaded bundled dump");
                Some(StoredCollection::from_dump(dump.records, timestamp))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(collection = %key, error = %e, "Ignoring unreadable bundled dump");
                None
            }
        }
    }

    /// Memory, then Local Store, then bundled dump
    async fn ensure_loaded(&self, key: &CollectionKey) -> Option<StoredCollection> {
        if let Some(slot) = self.slots.read().get(key).filter(|slot| slot.loaded) {
            return slot.entry.clone();
        }

        let stored = match self.store.get(key).await {
            Ok(stored) => stored,
            Err(e) => {
                telemetry::record_storage_error("read", e.label());
                tracing::warn!(collection = %key, error = %e, "Local Store read failed, treating as cache miss");
                None
            }
        };

        let entry = match stored {
            Some(entry) => Some(entry),
            None => {
                self.set_state(key, CollectionState::Bootstrapping);
                let dump = self.load_dump(key).await;
                if let Some(dump) = &dump {
                    self.persist(key, dump.clone()).await;
                }
                dump
            }
        };

        let mut slots = self.slots.write();
        let slot = slots.entry(key.clone()).or_default();
        if !slot.loaded {
            slot.loaded = true;
            slot.entry = entry;
            slot.state = CollectionState::Settled;
        }
        slot.entry.clone()
    }

    async fn fetch(
        &self,
        config: &ClientConfig,
        key: &CollectionKey,
        since: Option<u64>,
    ) -> std::result::Result<Changeset, NetworkError> {
        let request = ChangesetRequest {
            key: key.clone(),
            expected: since.unwrap_or(0),
            since,
        };
        let server = config.server.url();
        tokio::time::timeout(
            config.request_timeout(),
            self.transport.fetch_changeset(&server, &request),
        )
        .await
        .map_err(|_| NetworkError::Timeout)?
    }

    async fn chain_for(
        &self,
        config: &ClientConfig,
        x5u: &str,
    ) -> std::result::Result<Arc<CertificateChain>, VerifyFailure> {
        if let Some(chain) = self.chains.read().get(x5u) {
            return Ok(chain.clone());
        }
        let bytes = tokio::time::timeout(config.request_timeout(), self.transport.fetch_chain(x5u))
            .await
            .map_err(|_| VerifyFailure::Network(NetworkError::Timeout))?
            .map_err(VerifyFailure::Network)?;
        let chain = Arc::new(CertificateChain::from_json(&bytes)?);
        self.chains.write().insert(x5u.to_string(), chain.clone());
        Ok(chain)
    }

    async fn verify(
        &self,
        config: &ClientConfig,
        records: &[Record],
        timestamp: u64,
        metadata: Option<&SignatureMetadata>,
    ) -> std::result::Result<String, VerifyFailure> {
        let metadata = metadata
            .ok_or_else(|| {
                VerifyFailure::Signature(Rejection::new("missing", "changeset has no signature"))
            })?
            .clone();
        let verifier = SignatureVerifier::new(&config.signer)?;
        verifier.check_metadata(&metadata)?;

        let chain = self.chain_for(config, &metadata.x5u).await?;
        let records = records.to_vec();
        let x5u = metadata.x5u.clone();
        let verified = tokio::task::spawn_blocking(move || {
            verifier.verify(&records, timestamp, &metadata, &chain, Utc::now())
        })
        .await
        .map_err(|e| {
            VerifyFailure::Signature(Rejection::new("task", format!("verification task failed: {e}")))
        })?;

        verified.map_err(|e| {
            // A rotated chain may be cached under the same location
            self.chains.write().remove(&x5u);
            VerifyFailure::from(e)
        })
    }

    async fn run_cycle(&self, key: &CollectionKey) -> Result<SyncOutcome> {
        let started = Instant::now();
        let config = self.config();
        let result = self.cycle(&config, key).await;

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) => e.label(),
        };
        telemetry::record_sync(key, label, started.elapsed());
        match &result {
            Ok(SyncOutcome::NetworkFailed { error }) => {
                tracing::warn!(collection = %key, %error, "Sync failed, serving cached data");
            }
            Ok(outcome) => {
                tracing::info!(collection = %key, outcome = label, elapsed_ms = started.elapsed().as_millis() as u64, "Sync finished");
                tracing::debug!(collection = %key, ?outcome, "Sync outcome");
            }
            Err(e) => {
                tracing::error!(collection = %key, error = %e, "Sync failed");
            }
        }
        result
    }

    async fn cycle(&self, config: &ClientConfig, key: &CollectionKey) -> Result<SyncOutcome> {
        let baseline = self.ensure_loaded(key).await;
        let local_records = baseline.as_ref().map(|e| e.records.clone()).unwrap_or_default();
        let local_timestamp = baseline.as_ref().map_or(0, |e| e.timestamp);
        let since = Some(local_timestamp).filter(|ts| *ts > 0);

        self.set_state(key, CollectionState::Syncing);
        let changeset = match self.fetch(config, key, since).await {
            Ok(changeset) => changeset,
            Err(error) => {
                self.set_state(key, CollectionState::Settled);
                return Ok(SyncOutcome::NetworkFailed { error });
            }
        };

        if changeset.timestamp == local_timestamp && changeset.changes.is_empty() {
            tracing::debug!(collection = %key, timestamp = local_timestamp, "Collection up to date");
            self.set_state(key, CollectionState::Settled);
            return Ok(SyncOutcome::Unchanged {
                timestamp: local_timestamp,
            });
        }

        let mode = if since.is_some() { MergeMode::Incremental } else { MergeMode::Full };
        let merged = apply_changes(&local_records, &changeset.changes, mode);

        self.set_state(key, CollectionState::Verifying);
        match self
            .verify(config, &merged, changeset.timestamp, changeset.signature())
            .await
        {
            Ok(digest) => Ok(self
                .commit(key, &local_records, merged, changeset.timestamp, digest, false)
                .await),
            Err(VerifyFailure::Network(error)) => {
                self.set_state(key, CollectionState::Settled);
                Ok(SyncOutcome::NetworkFailed { error })
            }
            Err(VerifyFailure::Signature(rejection)) => {
                self.recover(config, key, baseline, rejection).await
            }
        }
    }

    /// Bounded store-clear-and-retry: at most `max_signature_retries`
    /// attempts, each starting again from the bundled dump.
    async fn recover(
        &self,
        config: &ClientConfig,
        key: &CollectionKey,
        baseline: Option<StoredCollection>,
        rejection: Rejection,
    ) -> Result<SyncOutcome> {
        let previous = baseline.as_ref().map(|e| e.records.clone()).unwrap_or_default();
        telemetry::record_signature_failure(key, rejection.kind);
        let mut reason = rejection.reason;

        for attempt in 1..=config.max_signature_retries {
            self.set_state(key, CollectionState::Recovering);
            telemetry::record_recovery(key);
            tracing::warn!(collection = %key, attempt, %reason, "Signature verification failed, retrying from bundled dump");

            if let Err(e) = self.store.clear(key).await {
                telemetry::record_storage_error("clear", e.label());
                tracing::warn!(collection = %key, error = %e, "Failed to clear collection");
            }

            self.set_state(key, CollectionState::Bootstrapping);
            let dump = self.load_dump(key).await;
            if let Some(dump) = &dump {
                self.persist(key, dump.clone()).await;
            }
            let base_records = dump.as_ref().map(|d| d.records.clone()).unwrap_or_default();
            let since = dump.as_ref().map(|d| d.timestamp).filter(|ts| *ts > 0);

            self.set_state(key, CollectionState::Syncing);
            let changeset = match self.fetch(config, key, since).await {
                Ok(changeset) => changeset,
                Err(error) => {
                    self.restore(key, baseline).await;
                    return Ok(SyncOutcome::NetworkFailed { error });
                }
            };

            let mode = if since.is_some() { MergeMode::Incremental } else { MergeMode::Full };
            let merged = apply_changes(&base_records, &changeset.changes, mode);

            self.set_state(key, CollectionState::Verifying);
            match self
                .verify(config, &merged, changeset.timestamp, changeset.signature())
                .await
            {
                Ok(digest) => {
                    tracing::info!(collection = %key, attempt, "Recovered from signature failure");
                    return Ok(self
                        .commit(key, &previous, merged, changeset.timestamp, digest, true)
                        .await);
                }
                Err(VerifyFailure::Network(error)) => {
                    self.restore(key, baseline).await;
                    return Ok(SyncOutcome::NetworkFailed { error });
                }
                Err(VerifyFailure::Signature(next)) => {
                    telemetry::record_signature_failure(key, next.kind);
                    reason = next.reason;
                }
            }
        }

        self.restore(key, baseline).await;
        Err(RemoteSettingsError::invalid_signature(key, reason))
    }

    /// Put the pre-failure state back in memory and in the Local Store
    async fn restore(&self, key: &CollectionKey, baseline: Option<StoredCollection>) {
        match &baseline {
            Some(entry) => self.persist(key, entry.clone()).await,
            None => {
                if let Err(e) = self.store.clear(key).await {
                    telemetry::record_storage_error("clear", e.label());
                    tracing::warn!(collection = %key, error = %e, "Failed to clear collection");
                }
            }
        }
        self.install(key, baseline);
    }

    async fn commit(
        &self,
        key: &CollectionKey,
        previous: &[Record],
        records: Vec<Record>,
        timestamp: u64,
        digest: String,
        recovered: bool,
    ) -> SyncOutcome {
        let changes = diff(previous, &records);
        let outcome = SyncOutcome::Updated {
            timestamp,
            created: changes.created.len(),
            updated: changes.updated.len(),
            deleted: changes.deleted.len(),
            recovered,
        };

        let entry = StoredCollection::verified(records, timestamp, digest);
        self.persist(key, entry.clone()).await;
        let current = entry.records.clone();
        self.install(key, Some(entry));

        if !changes.is_empty() {
            // Listeners see the change through the current targeting context
            let config = self.config();
            let visible_before = filter_records(previous, &config.app_context);
            let visible_now = filter_records(&current, &config.app_context);
            let visible_changes = diff(&visible_before, &visible_now);
            if !visible_changes.is_empty() {
                self.subscriptions
                    .dispatch(SyncEvent::new(key.clone(), visible_now, visible_changes));
            }
        }
        outcome
    }
}
