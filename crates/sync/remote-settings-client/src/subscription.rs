//! Per-collection listeners and their dispatcher.
//!
//! Listeners of a collection run in subscription order, one after another.
//! A dedicated dispatcher task hands each batch to the blocking pool, so a
//! slow or blocking listener never holds up the sync engine nor a runtime
//! worker. Queuing an event never waits for listeners.

use crate::merge::{Changes, RecordUpdate};
use parking_lot::{Mutex, RwLock};
use remote_settings_core::{CollectionKey, Record};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Delivered to listeners after a sync changed what they can see
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEvent {
    /// Collection that changed
    pub key: CollectionKey,
    /// All records now visible to this client
    pub current: Vec<Record>,
    /// Newly visible records
    pub created: Vec<Record>,
    /// Records whose content changed
    pub updated: Vec<RecordUpdate>,
    /// Records no longer visible
    pub deleted: Vec<Record>,
}

impl SyncEvent {
    pub(crate) fn new(key: CollectionKey, current: Vec<Record>, changes: Changes) -> Self {
        Self {
            key,
            current,
            created: changes.created,
            updated: changes.updated,
            deleted: changes.deleted,
        }
    }
}

/// Receives [`SyncEvent`]s for the collections it subscribed to
pub trait SyncListener: Send + Sync + 'static {
    /// Called once per sync that changed the collection
    fn on_sync(&self, event: &SyncEvent);
}

impl<F> SyncListener for F
where
    F: Fn(&SyncEvent) + Send + Sync + 'static,
{
    fn on_sync(&self, event: &SyncEvent) {
        self(event)
    }
}

/// Shared handle to a listener; used again to unsubscribe
pub type ListenerHandle = Arc<dyn SyncListener>;

fn same_listener(a: &ListenerHandle, b: &ListenerHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

enum Dispatch {
    Event {
        event: Arc<SyncEvent>,
        listeners: Vec<ListenerHandle>,
    },
    Flush(oneshot::Sender<()>),
}

/// Listener registry keyed by collection id, plus the dispatcher feeding them
#[derive(Default)]
pub struct Subscriptions {
    listeners: RwLock<HashMap<String, Vec<ListenerHandle>>>,
    sender: Mutex<Option<mpsc::UnboundedSender<Dispatch>>>,
}

impl Subscriptions {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener` after the existing listeners of `collection_id`
    pub fn subscribe(&self, collection_id: &str, listener: ListenerHandle) {
        self.listeners
            .write()
            .entry(collection_id.to_string())
            .or_default()
            .push(listener);
    }

    /// Remove `listener`; returns whether it was registered
    pub fn unsubscribe(&self, collection_id: &str, listener: &ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let Some(registered) = listeners.get_mut(collection_id) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|l| !same_listener(l, listener));
        let removed = registered.len() != before;
        if registered.is_empty() {
            listeners.remove(collection_id);
        }
        removed
    }

    /// Listeners of `collection_id`, in subscription order
    pub fn listeners(&self, collection_id: &str) -> Vec<ListenerHandle> {
        self.listeners
            .read()
            .get(collection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Collection ids with at least one listener, sorted
    pub fn collections(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.listeners.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Queue `event` for the listeners of its collection
    pub fn dispatch(&self, event: SyncEvent) {
        let listeners = self.listeners(&event.key.collection);
        if listeners.is_empty() {
            return;
        }
        tracing::debug!(collection = %event.key, listeners = listeners.len(), "Queueing sync event");
        let message = Dispatch::Event {
            event: Arc::new(event),
            listeners,
        };
        if self.sender().send(message).is_err() {
            tracing::warn!("Listener dispatcher is gone, dropping sync event");
        }
    }

    /// Wait until every event queued so far has been delivered
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender().send(Dispatch::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    fn sender(&self) -> mpsc::UnboundedSender<Dispatch> {
        let mut sender = self.sender.lock();
        if let Some(existing) = sender.as_ref().filter(|s| !s.is_closed()) {
            return existing.clone();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatcher(rx));
        *sender = Some(tx.clone());
        tx
    }
}

async fn run_dispatcher(mut receiver: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(message) = receiver.recv().await {
        match message {
            Dispatch::Event { event, listeners } => {
                let key = event.key.clone();
                let batch = tokio::task::spawn_blocking(move || notify(&event, &listeners));
                if let Err(e) = batch.await {
                    tracing::error!(collection = %key, error = %e, "Listener batch did not complete");
                }
            }
            Dispatch::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn notify(event: &SyncEvent, listeners: &[ListenerHandle]) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener.on_sync(event))).is_err() {
            tracing::error!(collection = %event.key, "Listener panicked");
            metrics::counter!("remote_settings_listener_panics_total").increment(1);
        }
    }
}
