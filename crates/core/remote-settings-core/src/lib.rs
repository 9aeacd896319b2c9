//! # Remote Settings Core
//!
//! Shared foundation of the remote settings client: record and collection
//! types, the configuration model, the error taxonomy and targeting
//! expressions.
//!
//! ## Quick Start
//!
//! ```rust
//! use remote_settings_core::{ClientConfig, CollectionKey};
//!
//! let config = ClientConfig::default();
//! assert_eq!(config.key_for("cfr")?, CollectionKey::new("main", "cfr"));
//! # Ok::<(), remote_settings_core::RemoteSettingsError>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod types;

// Re-export commonly used items
pub use config::{AppContext, ClientConfig, Server, SignerSettings};
pub use error::{NetworkError, RemoteSettingsError, Result};
pub use filter::{evaluate, filter_records, FilterError};
pub use types::{sort_records, Collection, CollectionKey, Record};

/// Version information for the remote settings crates
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
