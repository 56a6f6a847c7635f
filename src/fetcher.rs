//! Upstream fetching
//!
//! One HTTP GET per call, no retries, no caching. The poll loop depends on the
//! [`Fetch`] trait so tests can substitute a scripted source.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::error::{AppResult, CycleError};

/// Source of raw upstream bodies
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Perform a single fetch attempt and return the full response body
    async fn fetch(&self) -> Result<Vec<u8>, CycleError>;
}

/// [`Fetch`] implementation backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    /// Build a fetcher for `url` with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (e.g. TLS
    /// backend initialisation failure).
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Build a fetcher from the `[upstream]` configuration section
    pub fn from_config(config: &UpstreamConfig) -> AppResult<Self> {
        Self::new(
            config.url.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )
    }

    /// The URL this fetcher polls
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self) -> Result<Vec<u8>, CycleError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(CycleError::Network)?;

        let status = response.status();
        if !status.is_success() {
            // Dropping the response here releases the connection without
            // reading the body.
            drop(response);
            return Err(CycleError::UnexpectedStatus {
                code: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(CycleError::Body)?;

        tracing::debug!(
            url = %self.url,
            status = %status,
            body_len = body.len(),
            "Upstream fetch completed"
        );

        Ok(body.to_vec())
    }
}
