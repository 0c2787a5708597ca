//! Collaborators supplied by the caller: a live page and an HTTP fetcher

use crate::config::SiftConfig;
use crate::error::SiftError;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;

/// A page inside a browser session that can run script and hand back JSON
///
/// Implementations wrap whatever automation layer the caller uses. The
/// script is a self-contained expression; its value must be JSON
/// serialisable.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Evaluate `script` in the page and return its JSON value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SiftError>;

    /// URL of the page, used to resolve relative sources
    fn page_url(&self) -> Option<String> {
        None
    }
}

/// HTTP GET returning body text
#[async_trait]
pub trait TextFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, SiftError>;
}

/// [`TextFetcher`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with default settings
    pub fn new() -> Result<Self, SiftError> {
        Self::from_config(&SiftConfig::default())
    }

    /// Create a fetcher using the configured user agent and fetch timeout
    pub fn from_config(config: &SiftConfig) -> Result<Self, SiftError> {
        Self::with_settings(&config.user_agent, config.fetch_timeout)
    }

    pub fn with_settings(user_agent: &str, timeout: Duration) -> Result<Self, SiftError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TextFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, SiftError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SiftError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}
