//! HTTP client configuration and building logic
//!
//! This module handles the configuration and construction of the `reqwest`
//! client used for artifact metadata and body requests.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants::{http, limits};
use crate::errors::{ConfigError, DownloadError, DownloadResult};

/// Configuration for the artifact HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// User agent sent with every request
    pub user_agent: String,
    /// Timeout for metadata (HEAD) requests
    #[serde(with = "humantime_serde")]
    pub head_timeout: Duration,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// TCP keep-alive settings
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: http::USER_AGENT.to_string(),
            head_timeout: http::HEAD_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            tcp_keepalive: Some(http::TCP_KEEPALIVE),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
        }
    }
}

impl ClientConfig {
    /// Set the request rate limit
    pub fn with_rate_limit(mut self, rate_limit_rps: u32) -> Self {
        self.rate_limit_rps = rate_limit_rps;
        self
    }

    /// Set the HEAD request timeout
    pub fn with_head_timeout(mut self, head_timeout: Duration) -> Self {
        self.head_timeout = head_timeout;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_rps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.rate_limit_rps".to_string(),
                value: "0".to_string(),
                reason: "Rate limit must be non-zero".to_string(),
            });
        }
        if self.head_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "client.head_timeout".to_string(),
                value: "0s".to_string(),
                reason: "Timeout must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Builds the HTTP client with the specified configuration
    ///
    /// No overall request timeout is set: artifact bodies can take many
    /// minutes to stream. HEAD requests carry their own timeout.
    pub fn build_http_client(&self) -> DownloadResult<Client> {
        let mut client_builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.as_str())
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(DownloadError::Http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(config.rate_limit_rps, limits::DEFAULT_RATE_LIMIT_RPS);
        assert!(config.user_agent.starts_with("model-fetcher/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::default()
            .with_rate_limit(5)
            .with_head_timeout(Duration::from_secs(2));

        assert_eq!(config.rate_limit_rps, 5);
        assert_eq!(config.head_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let config = ClientConfig::default().with_rate_limit(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_http_client_creation() {
        let config = ClientConfig::default().with_connect_timeout(Duration::from_secs(5));
        assert!(config.build_http_client().is_ok());
    }
}
