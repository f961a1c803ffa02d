//! Core HTTP operations with rate limiting
//!
//! Metadata (HEAD) and body (GET) requests for artifact URLs. There is no
//! retry here: a failure propagates to the caller, which may fall back to
//! cached metadata when offline use is allowed.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, ETAG};
use reqwest::{Client, Response};
use tracing::debug;
use url::Url;

use crate::errors::{ConfigError, DownloadError, DownloadResult};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// Remote state of an artifact file as reported by a HEAD request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// Entity tag, empty when the server sent none
    pub etag: String,
    /// Content-Length in bytes
    pub size: u64,
}

impl RemoteMetadata {
    /// Extract the metadata from response headers
    ///
    /// Reads `Content-Length` from the headers directly: for HEAD responses
    /// the body length hint is always zero.
    pub fn from_headers(url: &Url, headers: &HeaderMap) -> DownloadResult<Self> {
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| DownloadError::MissingContentLength {
                url: url.to_string(),
            })?;

        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(Self { etag, size })
    }
}

/// HTTP operations handler with rate limiting
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectRateLimiter,
    head_timeout: Duration,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limiting
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the rate limit is zero
    pub fn new(client: Client, rate_limit_rps: u32, head_timeout: Duration) -> Result<Self, ConfigError> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
            head_timeout,
        })
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> Result<DirectRateLimiter, ConfigError> {
        let rate = NonZeroU32::new(rate_limit_rps).ok_or_else(|| ConfigError::InvalidValue {
            field: "client.rate_limit_rps".to_string(),
            value: rate_limit_rps.to_string(),
            reason: "Rate limit must be non-zero".to_string(),
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rate)))
    }

    async fn throttle(&self) {
        // Jitter avoids every shard worker hitting the server in lock-step
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;
    }

    fn check_status(url: &Url, response: Response) -> DownloadResult<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(DownloadError::ServerError {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }

    /// Issue a HEAD request and read the remote size and ETag
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Http` on connectivity failure,
    /// `DownloadError::ServerError` on a non-success status and
    /// `DownloadError::MissingContentLength` if the size is not reported
    pub async fn head(&self, url: &Url) -> DownloadResult<RemoteMetadata> {
        self.throttle().await;

        let response = self
            .client
            .head(url.as_str())
            .timeout(self.head_timeout)
            .send()
            .await?;
        let response = Self::check_status(url, response)?;
        let metadata = RemoteMetadata::from_headers(url, response.headers())?;

        debug!(
            "HEAD {}: {} bytes, etag {:?}",
            url, metadata.size, metadata.etag
        );
        Ok(metadata)
    }

    /// Issue a full GET request, returning the response for streaming
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Http` on connectivity failure and
    /// `DownloadError::ServerError` on a non-success status
    pub async fn get(&self, url: &Url) -> DownloadResult<Response> {
        self.throttle().await;

        let response = self.client.get(url.as_str()).send().await?;
        let response = Self::check_status(url, response)?;

        debug!("GET {}: HTTP {}", url, response.status());
        Ok(response)
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
