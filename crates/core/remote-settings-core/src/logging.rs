//! Tracing bootstrap for binaries and tests.

use crate::error::{RemoteSettingsError, Result};
use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter` when it is set. Fails
/// if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| RemoteSettingsError::config(format!("invalid log filter: {e}")))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| RemoteSettingsError::config(format!("failed to install subscriber: {e}")))
}

/// Install a subscriber writing through the test harness. Safe to call from
/// every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("remote_settings=debug")),
        )
        .with_test_writer()
        .try_init();
}
