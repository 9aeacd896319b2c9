//! Transport to the remote settings server

use crate::protocol::{Changeset, ChangesetRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use remote_settings_core::{NetworkError, RemoteSettingsError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use url::Url;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("remote-settings-client/", env!("CARGO_PKG_VERSION"));

/// Response header asking clients to pause, in seconds
pub const BACKOFF_HEADER: &str = "Backoff";

/// Everything the sync engine needs from the network
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Fetch a changeset from `server_url`
    async fn fetch_changeset(
        &self,
        server_url: &str,
        request: &ChangesetRequest,
    ) -> Result<Changeset, NetworkError>;

    /// Download the certificate chain document at `x5u`
    async fn fetch_chain(&self, x5u: &str) -> Result<Vec<u8>, NetworkError>;
}

/// [`RemoteTransport`] over HTTPS
pub struct HttpTransport {
    client: Client,
    backoff_until: Mutex<Option<Instant>>,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, RemoteSettingsError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RemoteSettingsError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            backoff_until: Mutex::new(None),
        })
    }

    fn check_backoff(&self) -> Result<(), NetworkError> {
        let mut backoff = self.backoff_until.lock();
        match *backoff {
            Some(until) if until > Instant::now() => Err(NetworkError::Backoff {
                seconds: until.saturating_duration_since(Instant::now()).as_secs().max(1),
            }),
            Some(_) => {
                *backoff = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record_backoff(&self, status: StatusCode, headers: &HeaderMap) {
        let seconds = header_seconds(headers, BACKOFF_HEADER).or_else(|| {
            if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS {
                header_seconds(headers, RETRY_AFTER.as_str())
            } else {
                None
            }
        });
        if let Some(seconds) = seconds.filter(|s| *s > 0) {
            tracing::info!(seconds, "Server requested backoff");
            *self.backoff_until.lock() = Some(Instant::now() + Duration::from_secs(seconds));
        }
    }

    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>, NetworkError> {
        self.check_backoff()?;

        let response = self.client.get(url.clone()).send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        self.record_backoff(status, response.headers());

        if !status.is_success() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(body.to_vec())
    }
}

fn header_seconds(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn invalid_url(raw: &str, err: url::ParseError) -> NetworkError {
    NetworkError::Connection(format!("invalid url '{raw}': {err}"))
}

fn map_reqwest_error(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else if err.is_decode() || err.is_body() {
        NetworkError::Malformed(err.to_string())
    } else {
        NetworkError::Connection(err.to_string())
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn fetch_changeset(
        &self,
        server_url: &str,
        request: &ChangesetRequest,
    ) -> Result<Changeset, NetworkError> {
        let url = request.url(server_url).map_err(|e| invalid_url(server_url, e))?;
        tracing::debug!(%url, "Fetching changeset");
        let body = self.get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|e| NetworkError::Malformed(format!("changeset: {e}")))
    }

    async fn fetch_chain(&self, x5u: &str) -> Result<Vec<u8>, NetworkError> {
        let url = Url::parse(x5u).map_err(|e| invalid_url(x5u, e))?;
        tracing::debug!(%url, "Fetching certificate chain");
        self.get_bytes(url).await
    }
}
