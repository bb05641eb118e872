//! HTTP fetcher for world-state documents
//!
//! One GET to a fixed endpoint with a bounded timeout and an identifying
//! User-Agent. There is no retry here: a failed fetch is retried by the
//! scheduler on its next tick.

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT},
    Client,
};
use std::time::Duration;

use super::{RawSnapshot, SnapshotSource};
use crate::utils::error::FetchError;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// World-state fetcher bound to a single endpoint
pub struct WorldStateFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Endpoint URL
    url: String,

    /// Request timeout, kept for error reporting
    timeout: Duration,
}

impl WorldStateFetcher {
    /// Create a fetcher with the default 10 second timeout
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` if the endpoint is not an http(s) URL,
    /// or `FetchError::Http` if the HTTP client cannot be created
    pub fn new(url: &str, user_agent: &str) -> Result<Self, FetchError> {
        Self::with_timeout(url, user_agent, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a fetcher with a custom timeout
    ///
    /// # Errors
    ///
    /// Same as [`WorldStateFetcher::new`]
    pub fn with_timeout(url: &str, user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "{url}: scheme must be http or https"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .default_headers(Self::build_headers(user_agent))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }

    /// Get the endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and decode the current document
    ///
    /// # Errors
    ///
    /// - `FetchError::Timeout` when the bounded call elapses
    /// - `FetchError::Status` for any non-2xx answer
    /// - `FetchError::Decode` when the body is not JSON
    pub async fn fetch_snapshot(&self) -> Result<RawSnapshot, FetchError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| self.map_error(e))?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        if !body.is_object() {
            return Err(FetchError::Decode("document root is not an object".to_string()));
        }

        Ok(RawSnapshot::new(body))
    }

    fn map_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::Http(e)
        }
    }

    /// Build the fixed identifying headers
    fn build_headers(user_agent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let agent = HeaderValue::from_str(user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(concat!("lotus-relay/", env!("CARGO_PKG_VERSION"))));
        headers.insert(USER_AGENT, agent);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        headers
    }
}

#[async_trait]
impl SnapshotSource for WorldStateFetcher {
    async fn fetch(&self) -> Result<RawSnapshot, FetchError> {
        self.fetch_snapshot().await
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
