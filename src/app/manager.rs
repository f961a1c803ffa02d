//! Artifact catalog and lifecycle
//!
//! [`ArtifactManager`] is the entry point for consumers. It groups cache
//! entries into artifacts, reports their status and runs acquisitions
//! through the [`DownloadCoordinator`].
//!
//! ```text
//! NOT_PRESENT --acquire--> VALID --remove--> DELETED
//!                           |  ^
//!        remote changed     v  |  acquire / refresh
//!                         INVALID
//! ```
//!
//! INVALID and DELETED artifacts are never repaired implicitly; the caller
//! has to acquire or refresh them again.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use model_fetcher::app::cache::{CacheConfig, CacheManager};
//! use model_fetcher::app::client::ArtifactClient;
//! use model_fetcher::app::manager::{AcquireOptions, ArtifactManager, ManagerConfig};
//!
//! # async fn example() -> model_fetcher::Result<()> {
//! let cache = Arc::new(CacheManager::new(CacheConfig::default()).await?);
//! let client = Arc::new(ArtifactClient::new()?);
//! let manager = ArtifactManager::new(cache, client, ManagerConfig::default())?;
//!
//! let artifact = manager
//!     .acquire(
//!         "https://example.com/model-00001-of-00003.gguf",
//!         AcquireOptions::default().with_parallelism(2),
//!     )
//!     .await?;
//! let shards = artifact.open().await?;
//! println!("{} shards, {} bytes", shards.len(), artifact.size());
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::cache::{CacheEntry, CacheManager};
use crate::app::client::ArtifactClient;
use crate::app::coordinator::{CoordinatorConfig, DownloadCoordinator};
use crate::app::fetcher::{ArtifactFetcher, DownloadProgress, FetchOptions, ProgressCallback};
use crate::app::hash::CacheKey;
use crate::app::models::{Artifact, ArtifactStatus};
use crate::app::shards::{resolve_shards, resolve_url, validate_extension, ShardSource};
use crate::constants::DEFAULT_EXTENSION;
use crate::errors::{ArtifactError, ConfigError, Result};

/// Configuration for the artifact manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// File extension accepted on single-file and first-shard URLs
    pub extension: String,
    /// Default download settings
    #[serde(flatten)]
    pub download: CoordinatorConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            download: CoordinatorConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Accept a different artifact extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set the default shard parallelism
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.download = self.download.with_parallelism(parallelism);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !self.extension.starts_with('.') || self.extension.len() < 2 {
            return Err(ConfigError::InvalidValue {
                field: "download.extension".to_string(),
                value: self.extension.clone(),
                reason: "Extension must start with '.' followed by a name".to_string(),
            });
        }
        self.download.validate()
    }
}

/// Options for [`ArtifactManager::acquire`]
#[derive(Clone)]
pub struct AcquireOptions {
    /// Concurrent shard downloads (manager default if None)
    pub parallelism: Option<usize>,
    /// Serve valid cached copies instead of downloading
    pub use_cache: bool,
    /// Fall back to stored metadata when the remote is unreachable
    pub allow_offline: bool,
    /// Aggregate progress callback
    pub on_progress: Option<ProgressCallback>,
    /// Cancellation signal
    pub cancel: CancellationToken,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            parallelism: None,
            use_cache: true,
            allow_offline: false,
            on_progress: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for AcquireOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquireOptions")
            .field("parallelism", &self.parallelism)
            .field("use_cache", &self.use_cache)
            .field("allow_offline", &self.allow_offline)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl AcquireOptions {
    /// Set shard parallelism
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Enable or disable use of cached copies
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Enable or disable the offline fallback
    pub fn with_offline(mut self, allow_offline: bool) -> Self {
        self.allow_offline = allow_offline;
        self
    }

    /// Set the progress callback
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Use an existing cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn fetch_options(&self) -> FetchOptions {
        let mut options = FetchOptions::default()
            .with_cache(self.use_cache)
            .with_offline(self.allow_offline)
            .with_cancel(self.cancel.clone());
        options.on_progress = self.on_progress.clone();
        options
    }
}

/// Catalog of cached artifacts
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    cache: Arc<CacheManager>,
    fetcher: ArtifactFetcher,
    config: ManagerConfig,
}

impl ArtifactManager {
    /// Create a manager over a shared cache and client
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid
    pub fn new(cache: Arc<CacheManager>, client: Arc<ArtifactClient>, config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = ArtifactFetcher::new(client, cache.clone());
        Ok(Self {
            cache,
            fetcher,
            config,
        })
    }

    /// Shared cache
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Manager configuration
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Artifacts currently in the cache, valid ones only unless asked
    ///
    /// Entries are grouped under the canonical URL of the shard set their
    /// recorded URL belongs to. Entries without a recorded URL cannot be
    /// attributed and are left out.
    pub async fn list(&self, include_invalid: bool) -> Result<Vec<Artifact>> {
        let mut groups: BTreeMap<String, (Vec<String>, Vec<CacheEntry>)> = BTreeMap::new();

        for entry in self.cache.list().await? {
            if entry.metadata.original_url.is_empty() {
                debug!("Skipping unattributed cache entry {}", entry.key);
                continue;
            }
            let shard_urls = resolve_url(&entry.metadata.original_url);
            let Some(canonical) = shard_urls.first().cloned() else {
                continue;
            };
            groups
                .entry(canonical)
                .or_insert_with(|| (shard_urls, Vec::new()))
                .1
                .push(entry);
        }

        let artifacts: Vec<Artifact> = groups
            .into_values()
            .map(|(shard_urls, files)| Artifact::from_entries(shard_urls, files, self.cache.clone()))
            .filter(|artifact| include_invalid || artifact.status() == ArtifactStatus::Valid)
            .collect();

        debug!("Catalog lists {} artifact(s)", artifacts.len());
        Ok(artifacts)
    }

    /// Look up the artifact containing `url`, whatever its status
    pub async fn get(&self, url: &str) -> Result<Option<Artifact>> {
        let canonical = ShardSource::from(url).canonical_url()?;
        Ok(self
            .list(true)
            .await?
            .into_iter()
            .find(|artifact| artifact.url() == canonical))
    }

    /// Make the artifact at `url` available locally
    ///
    /// An artifact that is already valid is returned without any network
    /// traffic, with a single progress report of `loaded == total == size`.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::InvalidName` (before any network activity) if
    /// the URL does not carry the accepted extension, the first download
    /// failure, or `DownloadError::Cancelled`
    pub async fn acquire(&self, url: &str, options: AcquireOptions) -> Result<Artifact> {
        self.acquire_with(ShardSource::from(url), options).await
    }

    /// [`acquire`](Self::acquire) for an explicit shard list or a single URL
    pub async fn acquire_with(&self, source: ShardSource, options: AcquireOptions) -> Result<Artifact> {
        let shard_urls = resolve_shards(&source);
        let canonical = shard_urls.first().ok_or(ArtifactError::EmptyShardList)?;
        validate_extension(canonical, &self.config.extension)?;

        if options.use_cache {
            let existing = self.project(&shard_urls).await?;
            if existing.is_valid() {
                let size = existing.size().max(0) as u64;
                info!("{} is already cached ({} bytes)", canonical, size);
                if let Some(callback) = &options.on_progress {
                    callback(DownloadProgress::complete(size));
                }
                return Ok(existing);
            }
        }

        self.download(&shard_urls, &options).await?;

        let artifact = self.project(&shard_urls).await?;
        if !artifact.is_valid() {
            warn!(
                "{} downloaded but its cache entries are incomplete; it will need to be acquired again",
                canonical
            );
        }
        Ok(artifact)
    }

    /// Re-validate every shard against the remote and fetch the ones that changed
    ///
    /// Moves an INVALID artifact (or a VALID one whose remote changed) back to
    /// VALID. Unchanged shards are not downloaded again.
    pub async fn refresh(&self, artifact: &Artifact, options: AcquireOptions) -> Result<Artifact> {
        if artifact.is_deleted() {
            return Err(ArtifactError::Deleted {
                url: artifact.url().to_string(),
            }
            .into());
        }

        let shard_urls = artifact.shard_urls().to_vec();
        info!("Refreshing {} ({} shard(s))", artifact.url(), shard_urls.len());
        self.download(&shard_urls, &options.with_cache(true)).await?;
        self.project(&shard_urls).await
    }

    /// Delete every cache entry of `artifact` and mark it deleted
    ///
    /// The object can no longer be opened afterwards.
    pub async fn remove(&self, artifact: &mut Artifact) -> Result<()> {
        let mut keys: HashSet<CacheKey> = artifact
            .shard_urls()
            .iter()
            .map(|url| CacheKey::from_url(url))
            .collect();
        keys.extend(artifact.files().iter().map(|entry| entry.key.clone()));

        for key in &keys {
            self.cache.delete(key).await?;
        }

        artifact.mark_deleted();
        info!("Removed {} ({} cache entries)", artifact.url(), keys.len());
        Ok(())
    }

    /// Delete everything in the cache
    pub async fn clear(&self) -> Result<()> {
        self.cache.clear().await?;
        Ok(())
    }

    async fn download(&self, shard_urls: &[String], options: &AcquireOptions) -> Result<()> {
        let parallelism = options
            .parallelism
            .unwrap_or(self.config.download.parallelism);
        let config = self.config.download.clone().with_parallelism(parallelism);
        config.validate()?;

        let coordinator = DownloadCoordinator::new(self.fetcher.clone(), config);
        coordinator.run(shard_urls, &options.fetch_options()).await?;
        Ok(())
    }

    /// Current projection of `shard_urls` over the cache listing
    async fn project(&self, shard_urls: &[String]) -> Result<Artifact> {
        let wanted: HashSet<&str> = shard_urls.iter().map(String::as_str).collect();
        let files: Vec<CacheEntry> = self
            .cache
            .list()
            .await?
            .into_iter()
            .filter(|entry| wanted.contains(entry.metadata.original_url.as_str()))
            .collect();

        Ok(Artifact::from_entries(
            shard_urls.to_vec(),
            files,
            self.cache.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::{CacheConfig, CacheEntryMetadata};
    use crate::errors::AppError;
    use bytes::Bytes;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    async fn create_manager(temp_dir: &TempDir) -> ArtifactManager {
        let cache = CacheManager::new(CacheConfig::with_cache_root(temp_dir.path().to_path_buf()))
            .await
            .unwrap();
        ArtifactManager::new(
            Arc::new(cache),
            Arc::new(ArtifactClient::new().unwrap()),
            ManagerConfig::default(),
        )
        .unwrap()
    }

    async fn store(manager: &ArtifactManager, url: &str, content: &'static [u8], recorded: u64) {
        let key = CacheKey::from_url(url);
        manager
            .cache()
            .write_metadata(&key, &CacheEntryMetadata::new("e", recorded, url))
            .await
            .unwrap();
        manager
            .cache()
            .write(&key, stream::iter(vec![Ok(Bytes::from_static(content))]))
            .await
            .unwrap();
    }

    #[test]
    fn test_manager_config_validation() {
        assert!(ManagerConfig::default().validate().is_ok());
        assert!(ManagerConfig::default().with_extension("gguf").validate().is_err());
        assert!(ManagerConfig::default().with_parallelism(0).validate().is_err());
    }

    #[tokio::test]
    async fn test_list_groups_shards() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        let shards = resolve_url("https://h/m-00001-of-00002.gguf");
        store(&manager, &shards[0], b"aa", 2).await;
        store(&manager, &shards[1], b"bbb", 3).await;
        store(&manager, "https://h/single.gguf", b"c", 1).await;
        store(&manager, "https://h/partial-00001-of-00002.gguf", b"d", 1).await;

        let valid = manager.list(false).await.unwrap();
        let urls: Vec<&str> = valid.iter().map(|a| a.url()).collect();
        assert_eq!(urls, vec![shards[0].as_str(), "https://h/single.gguf"]);
        assert_eq!(valid[0].size(), 5);
        assert_eq!(valid[0].files().len(), 2);

        let all = manager.list(true).await.unwrap();
        assert_eq!(all.len(), 3);
        let partial = all
            .iter()
            .find(|a| a.url() == "https://h/partial-00001-of-00002.gguf")
            .unwrap();
        assert_eq!(partial.status(), ArtifactStatus::Invalid);
    }

    #[tokio::test]
    async fn test_get_by_any_shard() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        let shards = resolve_url("https://h/m-00001-of-00002.gguf");
        store(&manager, &shards[0], b"aa", 2).await;
        store(&manager, &shards[1], b"bbb", 3).await;

        let found = manager.get(&shards[1]).await.unwrap().unwrap();
        assert_eq!(found.url(), shards[0]);
        assert!(manager.get("https://h/other.gguf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acquire_rejects_bad_extension() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        for url in ["https://h/model.bin", "https://h/model.gguf.bin"] {
            let err = manager
                .acquire(url, AcquireOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                AppError::Artifact(ArtifactError::InvalidName { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_acquire_empty_list() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        let err = manager
            .acquire_with(ShardSource::List(Vec::new()), AcquireOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Artifact(ArtifactError::EmptyShardList)));
    }

    #[tokio::test]
    async fn test_acquire_cached_reports_once_without_network() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        // Unroutable host: any network access would fail the acquire
        let url = "http://127.0.0.1:1/cached.gguf";
        store(&manager, url, b"12345", 5).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let options = AcquireOptions::default().with_progress(Arc::new(move |p: DownloadProgress| {
            assert_eq!(p, DownloadProgress::complete(5));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let artifact = manager.acquire(url, options).await.unwrap();
        assert!(artifact.is_valid());
        assert_eq!(artifact.size(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_marks_deleted() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        store(&manager, "https://h/m.gguf", b"data", 4).await;

        let mut artifact = manager.get("https://h/m.gguf").await.unwrap().unwrap();
        manager.remove(&mut artifact).await.unwrap();

        assert_eq!(artifact.size(), -1);
        assert_eq!(artifact.status(), ArtifactStatus::Deleted);
        assert!(artifact.open().await.is_err());
        assert!(manager.list(true).await.unwrap().is_empty());

        let err = manager
            .refresh(&artifact, AcquireOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Artifact(ArtifactError::Deleted { .. })));
    }

    #[tokio::test]
    async fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        store(&manager, "https://h/m.gguf", b"data", 4).await;

        manager.clear().await.unwrap();
        assert!(manager.list(true).await.unwrap().is_empty());
    }
}
