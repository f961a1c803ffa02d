//! HTTP client for artifact hosts
//!
//! This module provides the rate-limited HTTP plumbing used by the fetcher:
//! HEAD requests that report an artifact file's size and ETag, and GET
//! requests whose bodies are streamed.
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: Core HTTP operations with rate limiting

use tracing::info;
use url::Url;

use crate::errors::{DownloadError, DownloadResult, Result};

pub mod config;
pub mod http;

pub use config::ClientConfig;
pub use http::{HttpHandler, RemoteMetadata};

/// HTTP client for artifact hosts
#[derive(Debug)]
pub struct ArtifactClient {
    http_handler: HttpHandler,
    config: ClientConfig,
}

impl ArtifactClient {
    /// Creates a new ArtifactClient with default configuration
    ///
    /// # Errors
    ///
    /// Returns `AppError` if the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a new ArtifactClient with custom configuration
    ///
    /// # Errors
    ///
    /// Returns `AppError` if the configuration is invalid or the HTTP client
    /// cannot be built
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, config.rate_limit_rps, config.head_timeout)?;

        info!(
            "Created HTTP client ({} req/s, HEAD timeout {:?})",
            config.rate_limit_rps, config.head_timeout
        );

        Ok(Self {
            http_handler,
            config,
        })
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Parse an artifact URL
    pub fn parse_url(url: &str) -> DownloadResult<Url> {
        Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
            url: url.to_string(),
            error: e.to_string(),
        })
    }

    /// Fetch remote size and ETag for `url`
    pub async fn head(&self, url: &str) -> DownloadResult<RemoteMetadata> {
        let url = Self::parse_url(url)?;
        self.http_handler.head(&url).await
    }

    /// Start a full-body GET for `url`
    pub async fn get(&self, url: &str) -> DownloadResult<reqwest::Response> {
        let url = Self::parse_url(url)?;
        self.http_handler.get(&url).await
    }
}
