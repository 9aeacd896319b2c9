//! The service object consumers hold.
//!
//! One [`RemoteSettingsService`] is constructed at startup and shared by
//! `Arc`. It owns the configuration, the Local Store and the sync engine.

use crate::dump::{DirectoryDumps, DumpProvider, StaticDumps};
use crate::engine::{CollectionState, SyncEngine, SyncOutcome};
use crate::http::{HttpTransport, RemoteTransport};
use crate::subscription::{ListenerHandle, Subscriptions};
use futures::future::join_all;
use parking_lot::Mutex;
use remote_settings_core::{
    AppContext, ClientConfig, Collection, CollectionKey, NetworkError, RemoteSettingsError, Result,
    Server,
};
use remote_settings_storage::{FileStore, LocalStore};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Outcome of a [`RemoteSettingsService::sync`] run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Outcome per synced collection
    pub outcomes: BTreeMap<CollectionKey, SyncOutcome>,
}

impl SyncReport {
    /// Collections that could not reach the server
    pub fn network_failures(&self) -> impl Iterator<Item = (&CollectionKey, &NetworkError)> {
        self.outcomes.iter().filter_map(|(key, outcome)| match outcome {
            SyncOutcome::NetworkFailed { error } => Some((key, error)),
            _ => None,
        })
    }

    /// Whether every collection synced
    pub fn is_clean(&self) -> bool {
        self.network_failures().next().is_none()
    }
}

/// Remote settings client service
pub struct RemoteSettingsService {
    engine: SyncEngine,
    subscriptions: Arc<Subscriptions>,
    shutdown: watch::Sender<bool>,
    is_shut_down: AtomicBool,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteSettingsService {
    /// Create a service from its collaborators
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn RemoteTransport>,
        dumps: Arc<dyn DumpProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let subscriptions = Arc::new(Subscriptions::new());
        let engine = SyncEngine::new(config, store, transport, dumps, subscriptions.clone());
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            engine,
            subscriptions,
            shutdown,
            is_shut_down: AtomicBool::new(false),
            poller: Mutex::new(None),
        })
    }

    /// Builder with production collaborators as defaults
    pub fn builder(config: ClientConfig) -> RemoteSettingsServiceBuilder {
        RemoteSettingsServiceBuilder::new(config)
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Arc<ClientConfig> {
        self.engine.config()
    }

    fn key(&self, collection_id: &str) -> Result<CollectionKey> {
        self.engine.config().key_for(collection_id)
    }

    /// Current records of `collection_id`, local first.
    ///
    /// Never fails and never touches the network. An id that cannot name a
    /// collection yields an empty collection.
    pub async fn get(&self, collection_id: &str) -> Collection {
        match self.key(collection_id) {
            Ok(key) => self.engine.get(&key).await,
            Err(e) => {
                tracing::warn!(collection = collection_id, error = %e, "Invalid collection id");
                let bucket = self.engine.config().bucket_name.clone();
                Collection::empty(CollectionKey::new(bucket, collection_id))
            }
        }
    }

    /// Current records of `collection_id`; `listener` is then called after
    /// every sync that changes them.
    ///
    /// The listener is registered before the read, so a sync committing in
    /// between is either part of the returned state or delivered to it.
    pub async fn get_and_subscribe(
        &self,
        collection_id: &str,
        listener: ListenerHandle,
    ) -> Result<Collection> {
        let key = self.key(collection_id)?;
        self.subscriptions.subscribe(collection_id, listener);
        Ok(self.engine.get(&key).await)
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, collection_id: &str, listener: &ListenerHandle) -> bool {
        self.subscriptions.unsubscribe(collection_id, listener)
    }

    /// Collections `sync` covers: every subscribed collection plus the
    /// configured ones
    pub fn active_collections(&self) -> Vec<String> {
        let mut ids: BTreeSet<String> = self.subscriptions.collections().into_iter().collect();
        ids.extend(self.engine.config().collections.iter().cloned());
        ids.into_iter().collect()
    }

    /// Sync every active collection.
    ///
    /// Returns once changes are committed and listener notifications are
    /// queued. Network failures are listed in the report; a signature failure
    /// that recovery could not fix is returned as an error after every
    /// collection finished.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.ensure_running()?;
        let keys = self
            .active_collections()
            .iter()
            .map(|id| self.key(id))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(collections = keys.len(), "Starting sync");

        let results = join_all(keys.iter().map(|key| self.engine.sync_collection(key))).await;

        let mut report = SyncReport::default();
        let mut hard_error = None;
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(outcome) => {
                    report.outcomes.insert(key, outcome);
                }
                Err(e) => {
                    hard_error.get_or_insert(e);
                }
            }
        }
        match hard_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Sync one collection
    pub async fn sync_collection(&self, collection_id: &str) -> Result<SyncOutcome> {
        self.ensure_running()?;
        let key = self.key(collection_id)?;
        self.engine.sync_collection(&key).await
    }

    /// Lifecycle state of `collection_id`
    pub fn collection_state(&self, collection_id: &str) -> CollectionState {
        self.key(collection_id)
            .map(|key| self.engine.state(&key))
            .unwrap_or_default()
    }

    /// Switch server and bucket. Takes effect on the next cycle.
    pub fn update_server(&self, server: Server, bucket_name: impl Into<String>) -> Result<()> {
        let bucket_name = bucket_name.into();
        let mut next = ClientConfig::clone(&self.engine.config());
        next.server = server;
        next.bucket_name = bucket_name;
        next.validate()?;
        tracing::info!(server = %next.server.url(), bucket = %next.bucket_name, "Updating server");
        self.engine.replace_config(next);
        Ok(())
    }

    /// The home region changed. Returns whether the configuration changed.
    pub fn on_region_changed(&self, country: Option<String>) -> bool {
        let changed = self.engine.update_config(|config| {
            if config.app_context.country == country {
                return false;
            }
            config.app_context.country = country.clone();
            true
        });
        if changed {
            tracing::info!(country = ?country, "Region changed");
        }
        changed
    }

    /// Replace the application context. Returns whether it changed.
    pub fn update_app_context(&self, context: AppContext) -> bool {
        self.engine.update_config(|config| {
            if config.app_context == context {
                return false;
            }
            config.app_context = context;
            true
        })
    }

    /// Wait until every queued listener notification was delivered
    pub async fn flush_notifications(&self) {
        self.subscriptions.flush().await;
    }

    /// Sync active collections every `poll_interval` until shutdown
    pub fn start_polling(self: &Arc<Self>) {
        let mut poller = self.poller.lock();
        if poller.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let interval = self.engine.config().poll_interval();
        let service: Weak<Self> = Arc::downgrade(self);
        let mut shutdown = self.shutdown.subscribe();
        tracing::info!(interval_secs = interval.as_secs(), "Starting scheduled sync");

        *poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }
                let Some(service) = service.upgrade() else {
                    break;
                };
                if let Err(e) = service.sync().await {
                    tracing::error!(error = %e, "Scheduled sync failed");
                }
            }
            tracing::debug!("Scheduled sync stopped");
        }));
    }

    /// Stop polling and deliver pending notifications. Reads keep working;
    /// further syncs fail with [`RemoteSettingsError::Shutdown`].
    pub async fn shutdown(&self) {
        if self.is_shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        let poller = self.poller.lock().take();
        if let Some(handle) = poller {
            let _ = handle.await;
        }
        self.subscriptions.flush().await;
        tracing::info!("Remote settings service shut down");
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down.load(Ordering::SeqCst) {
            return Err(RemoteSettingsError::Shutdown);
        }
        Ok(())
    }
}

/// Builds a [`RemoteSettingsService`]
pub struct RemoteSettingsServiceBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn LocalStore>>,
    transport: Option<Arc<dyn RemoteTransport>>,
    dumps: Option<Arc<dyn DumpProvider>>,
}

impl RemoteSettingsServiceBuilder {
    /// Start from `config`
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            store: None,
            transport: None,
            dumps: None,
        }
    }

    /// Use `store` instead of a file store at `storage_path`
    pub fn store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `transport` instead of HTTPS
    pub fn transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use `dumps` instead of the configured dump directory
    pub fn dumps(mut self, dumps: Arc<dyn DumpProvider>) -> Self {
        self.dumps = Some(dumps);
        self
    }

    /// Build the service, opening the Local Store if needed
    pub async fn build(self) -> Result<RemoteSettingsService> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::open(&self.config.storage_path).await),
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.request_timeout())?),
        };
        let dumps = match (self.dumps, &self.config.dump_dir) {
            (Some(dumps), _) => dumps,
            (None, Some(dir)) => Arc::new(DirectoryDumps::new(dir)),
            (None, None) => Arc::new(StaticDumps::new()),
        };

        RemoteSettingsService::new(self.config, store, transport, dumps)
    }
}
