//! Shared fixtures for client tests: an in-process server publishing signed
//! changesets and instrumented stores.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use remote_settings_client::{
    Changeset, ChangesetRequest, CollectionMetadata, ListenerHandle, RemoteSettingsService,
    RemoteTransport, StaticDumps, SyncEvent,
};
use remote_settings_core::{ClientConfig, CollectionKey, NetworkError, Record, SignerSettings};
use remote_settings_signature::{ChainBuilder, ContentSigner};
use remote_settings_storage::{LocalStore, MemoryStore, StorageError, StoredCollection};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const X5U: &str = "https://content-signature.example.net/chains/remote-settings.json";
pub const SUBJECT: &str = "remote-settings.content-signature.example.net";

pub fn key(collection: &str) -> CollectionKey {
    CollectionKey::new("main", collection)
}

pub fn rec(id: &str, last_modified: u64, value: Value) -> Record {
    Record::new(id, last_modified, json!({ "value": value }))
}

#[derive(Default)]
struct Published {
    /// Every record ever published, tombstones included
    records: BTreeMap<String, Record>,
    timestamp: u64,
}

/// In-process remote settings server.
///
/// Signs every changeset with a freshly built chain, serves `_since`
/// requests incrementally and records what it was asked.
pub struct FakeServer {
    builder: ChainBuilder,
    signer: ContentSigner,
    collections: Mutex<HashMap<CollectionKey, Published>>,
    failure: Mutex<Option<NetworkError>>,
    delay: Mutex<Option<Duration>>,
    tampered: Mutex<bool>,
    requests: Mutex<Vec<ChangesetRequest>>,
    chain_fetches: AtomicUsize,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        let builder = ChainBuilder::new("Example Root CA", [11; 32], SUBJECT, [33; 32])
            .intermediate("Example Content Signing Intermediate", [22; 32]);
        let signer = builder.signer(X5U);
        Arc::new(Self {
            builder,
            signer,
            collections: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            delay: Mutex::new(None),
            tampered: Mutex::new(false),
            requests: Mutex::new(Vec::new()),
            chain_fetches: AtomicUsize::new(0),
        })
    }

    pub fn signer_settings(&self) -> SignerSettings {
        SignerSettings {
            trust_anchor: self.builder.trust_anchor().to_string(),
            signer_subject: SUBJECT.to_string(),
            allowed_x5u_hosts: vec!["content-signature.example.net".to_string()],
        }
    }

    /// Publish `records` at `timestamp`; their `last_modified` is set to it
    pub fn publish(&self, collection: &str, timestamp: u64, records: Vec<Record>) {
        let mut collections = self.collections.lock();
        let published = collections.entry(key(collection)).or_default();
        for mut record in records {
            record.last_modified = timestamp;
            published.records.insert(record.id.clone(), record);
        }
        published.timestamp = timestamp;
    }

    pub fn delete(&self, collection: &str, timestamp: u64, id: &str) {
        let mut collections = self.collections.lock();
        let published = collections.entry(key(collection)).or_default();
        published.records.insert(id.to_string(), Record::tombstone(id, timestamp));
        published.timestamp = timestamp;
    }

    /// Live records of `collection`, as the server signs them
    pub fn live(&self, collection: &str) -> Vec<Record> {
        self.collections
            .lock()
            .get(&key(collection))
            .map(|p| p.records.values().filter(|r| !r.deleted).cloned().collect())
            .unwrap_or_default()
    }

    pub fn timestamp(&self, collection: &str) -> u64 {
        self.collections.lock().get(&key(collection)).map_or(0, |p| p.timestamp)
    }

    pub fn fail_with(&self, error: Option<NetworkError>) {
        *self.failure.lock() = error;
    }

    pub fn delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Publish signatures that never verify
    pub fn tamper(&self, tampered: bool) {
        *self.tampered.lock() = tampered;
    }

    pub fn fetches(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<ChangesetRequest> {
        self.requests.lock().clone()
    }

    pub fn chain_fetches(&self) -> usize {
        self.chain_fetches.load(Ordering::SeqCst)
    }

    fn changeset(&self, request: &ChangesetRequest) -> Changeset {
        let collections = self.collections.lock();
        let Some(published) = collections.get(&request.key) else {
            return Changeset {
                metadata: CollectionMetadata {
                    signature: Some(self.signer.sign(&[], 0)),
                    signatures: Vec::new(),
                },
                changes: Vec::new(),
                timestamp: 0,
            };
        };

        let changes = match request.since {
            Some(since) => published
                .records
                .values()
                .filter(|r| r.last_modified > since)
                .cloned()
                .collect(),
            None => published.records.values().filter(|r| !r.deleted).cloned().collect(),
        };
        let live: Vec<Record> = published.records.values().filter(|r| !r.deleted).cloned().collect();
        let signature = if *self.tampered.lock() {
            self.signer.sign(&live, published.timestamp + 1)
        } else {
            self.signer.sign(&live, published.timestamp)
        };

        Changeset {
            metadata: CollectionMetadata {
                signature: Some(signature),
                signatures: Vec::new(),
            },
            changes,
            timestamp: published.timestamp,
        }
    }
}

#[async_trait]
impl RemoteTransport for FakeServer {
    async fn fetch_changeset(
        &self,
        _server_url: &str,
        request: &ChangesetRequest,
    ) -> Result<Changeset, NetworkError> {
        self.requests.lock().push(request.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        Ok(self.changeset(request))
    }

    async fn fetch_chain(&self, x5u: &str) -> Result<Vec<u8>, NetworkError> {
        self.chain_fetches.fetch_add(1, Ordering::SeqCst);
        if x5u != X5U {
            return Err(NetworkError::Status {
                status: 404,
                url: x5u.to_string(),
            });
        }
        Ok(self.builder.build().to_json().into_bytes())
    }
}

/// [`MemoryStore`] counting calls, optionally failing writes
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    puts: AtomicUsize,
    clears: AtomicUsize,
    fail_writes: Mutex<bool>,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Seed state without going through the counters
    pub async fn seed(&self, key: &CollectionKey, entry: StoredCollection) {
        self.inner.put(key, entry).await.expect("seeding memory store");
    }

    pub async fn stored(&self, key: &CollectionKey) -> Option<StoredCollection> {
        self.inner.get(key).await.expect("reading memory store")
    }
}

#[async_trait]
impl LocalStore for CountingStore {
    async fn get(&self, key: &CollectionKey) -> remote_settings_storage::Result<Option<StoredCollection>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &CollectionKey, entry: StoredCollection) -> remote_settings_storage::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if *self.fail_writes.lock() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only profile",
            )));
        }
        self.inner.put(key, entry).await
    }

    async fn clear(&self, key: &CollectionKey) -> remote_settings_storage::Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(key).await
    }

    async fn keys(&self) -> remote_settings_storage::Result<Vec<CollectionKey>> {
        self.inner.keys().await
    }
}

/// Listener recording every event it receives
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<SyncEvent>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn listener(self: &Arc<Self>) -> ListenerHandle {
        let recorder = self.clone();
        Arc::new(move |event: &SyncEvent| recorder.events.lock().push(event.clone()))
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

pub fn config_for(server: &FakeServer) -> ClientConfig {
    ClientConfig {
        signer: server.signer_settings(),
        ..ClientConfig::default()
    }
}

pub struct Harness {
    pub server: Arc<FakeServer>,
    pub store: Arc<CountingStore>,
    pub service: Arc<RemoteSettingsService>,
}

pub fn harness_with(
    server: Arc<FakeServer>,
    store: Arc<CountingStore>,
    dumps: StaticDumps,
    tweak: impl FnOnce(&mut ClientConfig),
) -> Harness {
    remote_settings_core::logging::init_test_tracing();
    let mut config = config_for(&server);
    tweak(&mut config);
    let service = RemoteSettingsService::new(config, store.clone(), server.clone(), Arc::new(dumps))
        .expect("valid test configuration");
    Harness {
        server,
        store,
        service: Arc::new(service),
    }
}

pub fn harness() -> Harness {
    harness_with(FakeServer::new(), CountingStore::new(), StaticDumps::new(), |_| {})
}
