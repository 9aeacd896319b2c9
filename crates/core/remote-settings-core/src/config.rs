//! Configuration model for the remote settings client.
//!
//! [`ClientConfig`] is the single source of truth for where records come
//! from (server, bucket), who is asking (application context) and how their
//! signatures are trusted. The service owns one instance and replaces it as a
//! whole; the sync engine takes a snapshot at the start of every cycle.

use crate::{
    error::{RemoteSettingsError, Result},
    types::CollectionKey,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Production server endpoint
pub const PRODUCTION_URL: &str = "https://firefox.settings.services.mozilla.com/v1";

/// Staging server endpoint
pub const STAGING_URL: &str = "https://firefox.settings.services.allizom.org/v1";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "REMOTE_SETTINGS";

/// Which server to talk to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Server {
    /// The production server
    #[default]
    Production,
    /// The staging server
    Staging,
    /// Any other server, e.g. a local mirror
    Custom(String),
}

impl Server {
    /// Base URL, without a trailing slash
    #[must_use]
    pub fn url(&self) -> String {
        match self {
            Server::Production => PRODUCTION_URL.to_string(),
            Server::Staging => STAGING_URL.to_string(),
            Server::Custom(url) => url.trim_end_matches('/').to_string(),
        }
    }
}

/// Application context used to select which records apply to this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppContext {
    /// Application id
    pub app_id: String,
    /// Release channel, e.g. `release`, `beta`, `nightly`
    pub channel: String,
    /// Application version, e.g. `128.0.1`
    pub version: String,
    /// Locale, e.g. `en-US`
    pub locale: String,
    /// Operating system, e.g. `Linux`
    pub os: String,
    /// Operating system version
    pub os_version: Option<String>,
    /// Home region, as an ISO 3166 alpha-2 code
    pub country: Option<String>,
}

impl Default for AppContext {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            channel: "release".to_string(),
            version: String::new(),
            locale: "en-US".to_string(),
            os: std::env::consts::OS.to_string(),
            os_version: None,
            country: None,
        }
    }
}

/// How content signatures are trusted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerSettings {
    /// SHA-256 fingerprint (hex) of the pinned root public key
    pub trust_anchor: String,
    /// Subject the leaf certificate must carry
    pub signer_subject: String,
    /// Hosts certificate chains may be downloaded from
    pub allowed_x5u_hosts: Vec<String>,
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self {
            trust_anchor: String::new(),
            signer_subject: "remote-settings.content-signature.mozilla.org".to_string(),
            allowed_x5u_hosts: vec!["content-signature-2.cdn.mozilla.net".to_string()],
        }
    }
}

/// Complete client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Bucket collections are read from
    #[serde(default = "default_bucket")]
    pub bucket_name: String,

    /// Local Store file
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Directory holding bundled dumps (`<bucket>/<collection>.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_dir: Option<PathBuf>,

    /// Timeout for each network request
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How many recovery attempts follow a signature failure
    #[serde(default = "default_max_signature_retries")]
    pub max_signature_retries: u32,

    /// Interval between scheduled syncs
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Collections to sync eagerly (used by the command line tool)
    #[serde(default)]
    pub collections: Vec<String>,

    /// Server to sync from
    #[serde(default)]
    pub server: Server,

    /// Application context for targeting
    #[serde(default)]
    pub app_context: AppContext,

    /// Signature trust settings
    #[serde(default)]
    pub signer: SignerSettings,
}

fn default_bucket() -> String {
    "main".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("remote-settings.json")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_signature_retries() -> u32 {
    1
}

fn default_poll_interval_secs() -> u64 {
    24 * 60 * 60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bucket_name: default_bucket(),
            storage_path: default_storage_path(),
            dump_dir: None,
            request_timeout_secs: default_timeout_secs(),
            max_signature_retries: default_max_signature_retries(),
            poll_interval_secs: default_poll_interval_secs(),
            collections: Vec::new(),
            server: Server::default(),
            app_context: AppContext::default(),
            signer: SignerSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Network request timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Interval between scheduled syncs
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Key of `collection_id` in the configured bucket
    pub fn key_for(&self, collection_id: &str) -> Result<CollectionKey> {
        CollectionKey::try_new(&self.bucket_name, collection_id)
    }

    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> Result<()> {
        CollectionKey::validate_id("bucket", &self.bucket_name)?;
        for collection in &self.collections {
            CollectionKey::validate_id("collection", collection)?;
        }
        if let Server::Custom(raw) = &self.server {
            let parsed = Url::parse(raw).map_err(|e| {
                RemoteSettingsError::config(format!("invalid custom server url '{raw}': {e}"))
            })?;
            if !matches!(parsed.scheme(), "https" | "http") || parsed.host_str().is_none() {
                return Err(RemoteSettingsError::config(format!(
                    "custom server url must be http(s) with a host: {raw}"
                )));
            }
            if parsed.query().is_some() || parsed.fragment().is_some() {
                return Err(RemoteSettingsError::config(format!(
                    "custom server url must not carry a query or fragment: {raw}"
                )));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(RemoteSettingsError::config("request_timeout_secs must be positive"));
        }
        if self.poll_interval_secs == 0 {
            return Err(RemoteSettingsError::config("poll_interval_secs must be positive"));
        }
        let anchor = &self.signer.trust_anchor;
        if anchor.len() != 64 || !anchor.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RemoteSettingsError::config(
                "signer.trust_anchor must be a 64 character hex SHA-256 fingerprint",
            ));
        }
        if self.signer.signer_subject.is_empty() {
            return Err(RemoteSettingsError::config("signer.signer_subject must not be empty"));
        }
        Ok(())
    }

    /// Load configuration from a TOML or JSON file, layered with
    /// `REMOTE_SETTINGS__*` environment overrides.
    #[cfg(feature = "config")]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                RemoteSettingsError::config(format!("failed to load {}: {e}", path.display()))
            })?;

        let config: ClientConfig = settings
            .try_deserialize()
            .map_err(|e| RemoteSettingsError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), bucket = %config.bucket_name, "Loaded configuration");
        Ok(config)
    }

    /// Render the configuration as TOML
    #[cfg(feature = "config")]
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(RemoteSettingsError::serialization)
    }
}
