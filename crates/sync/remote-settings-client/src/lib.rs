//! # Remote Settings Client
//!
//! Keeps local copies of remote settings collections in sync with the
//! server. Reads are always served locally, from the Local Store or a bundled
//! dump, and never wait on the network. Syncs fetch changesets, verify the
//! content signature of the merged collection and notify subscribers of what
//! changed.
//!
//! ```rust,no_run
//! use remote_settings_client::{ListenerHandle, RemoteSettingsService, SyncEvent};
//! use remote_settings_core::ClientConfig;
//! use std::sync::Arc;
//!
//! # async fn run() -> remote_settings_core::Result<()> {
//! let config = ClientConfig::from_file("remote-settings.toml")?;
//! let service = Arc::new(RemoteSettingsService::builder(config).build().await?);
//!
//! let listener: ListenerHandle = Arc::new(|event: &SyncEvent| {
//!     println!("{} now has {} records", event.key, event.current.len());
//! });
//! let current = service.get_and_subscribe("search-config", listener).await?;
//! println!("{} records cached", current.len());
//!
//! service.start_polling();
//! service.sync().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dump;
pub mod engine;
pub mod http;
pub mod merge;
pub mod protocol;
pub mod service;
pub mod subscription;
pub mod telemetry;

pub use dump::{DirectoryDumps, Dump, DumpProvider, StaticDumps};
pub use engine::{CollectionState, SyncEngine, SyncOutcome};
pub use http::{HttpTransport, RemoteTransport};
pub use merge::{Changes, RecordUpdate};
pub use protocol::{Changeset, ChangesetRequest, CollectionMetadata};
pub use service::{RemoteSettingsService, RemoteSettingsServiceBuilder, SyncReport};
pub use subscription::{ListenerHandle, Subscriptions, SyncEvent, SyncListener};
