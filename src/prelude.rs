//! Prelude module for Model Fetcher Library
//!
//! Re-exports the items most integrations need, so a single
//! `use model_fetcher::prelude::*;` is enough for typical usage.
//!
//! # Usage
//!
//! ```rust,no_run
//! use model_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let cache = Arc::new(CacheManager::new(CacheConfig::default()).await?);
//!     let client = Arc::new(ArtifactClient::new()?);
//!     let manager = ArtifactManager::new(cache, client, ManagerConfig::default())?;
//!
//!     let artifact = manager
//!         .acquire("https://example.com/model-00001-of-00002.gguf", AcquireOptions::default())
//!         .await?;
//!     let _handles = artifact.open().await?;
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, ArtifactError, CacheError, DownloadError, Result};

// Essential app components
pub use crate::app::{
    // Storage
    CacheConfig,
    CacheManager,
    CacheStats,
    WriteMode,

    // Network and fetching
    ArtifactClient,
    ArtifactFetcher,
    ClientConfig,
    DownloadProgress,
    FetchOptions,
    ProgressCallback,
    progress_callback,

    // Orchestration
    AcquireOptions,
    ArtifactManager,
    CoordinatorConfig,
    DownloadCoordinator,
    ManagerConfig,

    // Data types
    Artifact,
    ArtifactStatus,
    ShardSource,
    resolve_url,
};

pub use crate::config::AppConfig;

// Commonly used constants
pub use crate::constants::{DEFAULT_EXTENSION, DEFAULT_PARALLELISM, USER_AGENT};

pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
pub use tokio_util::sync::CancellationToken;
