//! Error types for Model Fetcher
//!
//! This module defines the error types for every component of the library.
//! Network failures, cache-layer failures, artifact validation failures and
//! configuration problems each get their own enum so callers can react to the
//! category that matters to them (for example treating a user-initiated
//! cancellation differently from a network failure).

use std::path::PathBuf;
use thiserror::Error;

/// Network, HTTP and cancellation errors raised while fetching artifacts
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status
    #[error("Server error: HTTP {status} for {url}")]
    ServerError { url: String, status: u16 },

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Remote did not report the artifact size
    #[error("Remote did not report Content-Length for {url}")]
    MissingContentLength { url: String },

    /// Body ended before the advertised size was received
    #[error("Incomplete download: received {received} bytes, expected {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },

    /// The caller's cancellation signal fired
    #[error("Download cancelled")]
    Cancelled,

    /// A shard worker or stream driver task terminated unexpectedly
    #[error("Download task terminated unexpectedly: {reason}")]
    WorkerPanic { reason: String },

    /// Local I/O failure while serving cached content
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache lookup failed while validating a fetch
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl DownloadError {
    /// Whether the failure is a connectivity problem (no response at all).
    ///
    /// Only these errors trigger the offline fallback; an HTTP error status
    /// means the remote answered and is never treated as "offline".
    pub fn is_connectivity(&self) -> bool {
        match self {
            DownloadError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

/// Persistent cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Storage backend I/O failure
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata record could not be encoded or decoded
    #[error("Cache metadata record is malformed: {0}")]
    Metadata(#[from] serde_json::Error),

    /// The dedicated writer context has shut down
    #[error("Dedicated cache writer is unavailable")]
    WriterUnavailable,

    /// The producer side aborted the write session
    #[error("Cache write aborted for {key}: {reason}")]
    WriteAborted { key: String, reason: String },
}

/// Artifact naming and lifecycle errors
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// URL does not carry the accepted artifact extension
    #[error("Invalid artifact URL: {url} (expected a `{extension}` file)")]
    InvalidName { url: String, extension: String },

    /// An explicit shard list was empty
    #[error("Shard list is empty")]
    EmptyShardList,

    /// The artifact has been removed and can no longer be opened
    #[error("Artifact has been deleted: {url}")]
    Deleted { url: String },

    /// A shard of the artifact is missing from the cache
    #[error("Artifact shard is not cached: {url}")]
    NotCached { url: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Artifact error
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// True when the operation stopped because the caller cancelled it
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Download(DownloadError::Cancelled))
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(DownloadError::Http(_))
            | AppError::Download(DownloadError::IncompleteDownload { .. })
            | AppError::Download(DownloadError::Cancelled) => true,
            AppError::Download(DownloadError::ServerError { status, .. }) => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Download(DownloadError::Cancelled) => "cancelled",
            AppError::Download(_) => "network",
            AppError::Cache(_) => "cache",
            AppError::Artifact(_) => "validation",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Artifact result type alias
pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguishable() {
        let err = AppError::from(DownloadError::Cancelled);
        assert!(err.is_cancelled());
        assert_eq!(err.category(), "cancelled");

        let err = AppError::from(DownloadError::ServerError {
            url: "https://example.com/a.gguf".to_string(),
            status: 404,
        });
        assert!(!err.is_cancelled());
        assert_eq!(err.category(), "network");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_validation_category() {
        let err = AppError::from(ArtifactError::InvalidName {
            url: "https://example.com/model.bin".to_string(),
            extension: ".gguf".to_string(),
        });
        assert_eq!(err.category(), "validation");
        assert!(err.to_string().contains("model.bin"));
    }

    #[test]
    fn test_server_overload_is_recoverable() {
        let err = AppError::from(DownloadError::ServerError {
            url: "https://example.com/a.gguf".to_string(),
            status: 503,
        });
        assert!(err.is_recoverable());
    }
}
