//! Core application logic for Model Fetcher
//!
//! This module contains the main components: the persistent cache, the HTTP
//! client, the single-URL fetcher, shard resolution, the download
//! coordinator and the artifact catalog that ties them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use model_fetcher::app::{AcquireOptions, ArtifactClient, ArtifactManager, CacheConfig, CacheManager, ManagerConfig};
//!
//! # async fn example() -> model_fetcher::Result<()> {
//! let cache = Arc::new(CacheManager::new(CacheConfig::default()).await?);
//! let client = Arc::new(ArtifactClient::new()?);
//! let manager = ArtifactManager::new(cache, client, ManagerConfig::default())?;
//!
//! for artifact in manager.list(false).await? {
//!     println!("{} ({} bytes)", artifact.url(), artifact.size());
//! }
//!
//! let artifact = manager
//!     .acquire("https://example.com/model.gguf", AcquireOptions::default())
//!     .await?;
//! println!("status: {}", artifact.status());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod coordinator;
pub mod fetcher;
pub mod hash;
pub mod manager;
pub mod models;
pub mod shards;

// Re-export main public API
pub use cache::{CacheConfig, CacheEntry, CacheEntryMetadata, CacheManager, CacheStats, WriteMode};
pub use client::{ArtifactClient, ClientConfig, RemoteMetadata};
pub use coordinator::{CoordinatorConfig, CoordinatorReport, DownloadCoordinator, SignalHandler};
pub use fetcher::{
    progress_callback, ArtifactFetcher, DownloadProgress, FetchOptions, FetchSource,
    FetchedArtifact, ProgressCallback, StartSignal, StartTrigger,
};
pub use hash::{CacheKey, Md5Hash};
pub use manager::{AcquireOptions, ArtifactManager, ManagerConfig};
pub use models::{Artifact, ArtifactStatus};
pub use shards::{resolve_shards, resolve_url, validate_extension, ShardDescriptor, ShardSource};
