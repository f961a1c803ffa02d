//! Single-URL artifact fetching
//!
//! [`ArtifactFetcher`] produces the bytes of one artifact file, from the
//! persistent cache when the cached copy still matches the remote, or from the
//! network otherwise. A network body is forwarded to the caller and written
//! to the cache at the same time, so consumers can start reading before the
//! download has finished.
//!
//! # Validation
//!
//! A cached copy is used when its recorded ETag equals the remote ETag and
//! its stored length equals the remote Content-Length, or when its metadata
//! record predates ETags or is missing altogether (polyfilled). Polyfilled
//! copies are trusted once, served at their stored length, and their record
//! is upgraded to the remote's current ETag and size.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use model_fetcher::app::cache::{CacheConfig, CacheManager};
//! use model_fetcher::app::client::ArtifactClient;
//! use model_fetcher::app::fetcher::{ArtifactFetcher, FetchOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(CacheManager::new(CacheConfig::default()).await?);
//! let client = Arc::new(ArtifactClient::new()?);
//! let fetcher = ArtifactFetcher::new(client, cache);
//!
//! let fetched = fetcher
//!     .fetch("https://example.com/model.gguf", &FetchOptions::default())
//!     .await?;
//! println!("{} bytes from {}", fetched.size(), fetched.source());
//! fetched.finish().await?;
//! # Ok(())
//! # }
//! ```

pub mod options;
pub mod progress;
mod tee;

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use crate::app::cache::{CacheEntryMetadata, CacheManager};
use crate::app::client::{ArtifactClient, RemoteMetadata};
use crate::app::hash::CacheKey;
use crate::constants::{cache::POLYFILL_ETAG, stream};
use crate::errors::{CacheResult, DownloadError, DownloadResult};

pub use options::{FetchOptions, StartSignal, StartTrigger};
pub use progress::{progress_callback, DownloadProgress, ProgressCallback};

use tee::{cache_stream, receiver_stream, Tee};

/// Where the bytes of a fetch come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Served from a valid cached copy
    Cache,
    /// Downloaded, with the cache populated alongside
    Network,
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchSource::Cache => f.write_str("cache"),
            FetchSource::Network => f.write_str("network"),
        }
    }
}

/// Result of a fetch: a byte stream plus, for downloads, the driver task
pub struct FetchedArtifact {
    url: String,
    source: FetchSource,
    size: u64,
    body: BoxStream<'static, io::Result<Bytes>>,
    driver: Option<JoinHandle<DownloadResult<u64>>>,
}

impl fmt::Debug for FetchedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedArtifact")
            .field("url", &self.url)
            .field("source", &self.source)
            .field("size", &self.size)
            .finish()
    }
}

impl FetchedArtifact {
    /// URL that was fetched
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cache hit or download
    pub fn source(&self) -> FetchSource {
        self.source
    }

    /// Expected size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Consume the bytes as they arrive
    ///
    /// Errors (including cancellation) surface as `Err` items. For downloads
    /// the cache keeps being populated even if the stream is dropped early.
    pub fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        self.body
    }

    /// Wait for the transfer to end without reading the bytes
    ///
    /// For a cache hit this returns immediately. For a download it waits for
    /// the body to be received and the cache write to settle.
    pub async fn finish(self) -> DownloadResult<u64> {
        let FetchedArtifact {
            size, body, driver, ..
        } = self;
        drop(body);

        match driver {
            None => Ok(size),
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(DownloadError::WorkerPanic {
                    reason: e.to_string(),
                }),
            },
        }
    }
}

/// Fetches single artifact files through the persistent cache
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: Arc<ArtifactClient>,
    cache: Arc<CacheManager>,
}

impl ArtifactFetcher {
    /// Create a fetcher over a shared client and cache
    pub fn new(client: Arc<ArtifactClient>, cache: Arc<CacheManager>) -> Self {
        Self { client, cache }
    }

    /// Shared cache
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Shared HTTP client
    pub fn client(&self) -> &Arc<ArtifactClient> {
        &self.client
    }

    /// Validate `url` against the remote and return its bytes
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Cancelled` if `options.cancel` fires, or the
    /// network error when the remote cannot be reached and no offline
    /// fallback applies
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> DownloadResult<FetchedArtifact> {
        let remote = tokio::select! {
            biased;
            _ = options.cancel.cancelled() => return Err(DownloadError::Cancelled),
            remote = self.resolve_remote(url, options.allow_offline) => remote?,
        };
        self.fetch_validated(url, &remote, options).await
    }

    /// Remote size and ETag, falling back to stored metadata when offline
    ///
    /// Only connectivity failures trigger the fallback; an HTTP error status
    /// always propagates.
    pub async fn resolve_remote(&self, url: &str, allow_offline: bool) -> DownloadResult<RemoteMetadata> {
        let error = match self.client.head(url).await {
            Ok(remote) => return Ok(remote),
            Err(e) => e,
        };

        if !(allow_offline && error.is_connectivity()) {
            return Err(error);
        }

        let key = CacheKey::from_url(url);
        match self.cache.get_entry(&key).await {
            Ok(Some(entry)) => {
                warn!("Remote unreachable ({}), using stored metadata for {}", error, url);
                Ok(RemoteMetadata {
                    etag: entry.metadata.etag,
                    size: entry.metadata.original_size,
                })
            }
            Ok(None) => Err(error),
            Err(e) => {
                warn!("Could not read stored metadata for {}: {}", url, e);
                Err(error)
            }
        }
    }

    /// Serve `url` from cache if it matches `remote`, otherwise download it
    pub async fn fetch_validated(
        &self,
        url: &str,
        remote: &RemoteMetadata,
        options: &FetchOptions,
    ) -> DownloadResult<FetchedArtifact> {
        if options.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let key = CacheKey::from_url(url);
        if options.use_cache {
            if let Some(stored) = self.valid_cached_size(&key, url, remote).await {
                if let Some(fetched) = self.serve_cached(&key, url, stored, options).await? {
                    return Ok(fetched);
                }
            }
        }

        self.download(key, url, remote, options).await
    }

    /// Apply the validity rule, returning the stored length of a usable copy
    ///
    /// Polyfilled records (legacy or missing) are upgraded on the way.
    async fn valid_cached_size(
        &self,
        key: &CacheKey,
        url: &str,
        remote: &RemoteMetadata,
    ) -> Option<u64> {
        let entry = match self.cache.get_entry(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache lookup for {} failed: {}", url, e);
                return None;
            }
        };
        let size = entry.byte_length;
        let metadata = entry.metadata;

        if metadata.is_polyfilled() {
            warn!(
                "Trusting legacy cache entry for {} ({} bytes) without ETag validation",
                url, size
            );
            if remote.etag != POLYFILL_ETAG {
                let upgraded = CacheEntryMetadata::new(remote.etag.clone(), remote.size, url);
                if let Err(e) = self.cache.write_metadata(key, &upgraded).await {
                    warn!("Failed to upgrade metadata for {}: {}", url, e);
                }
            }
            return Some(size);
        }

        if metadata.etag == remote.etag && size == remote.size {
            Some(size)
        } else {
            debug!(
                "Cached copy of {} is stale (etag {:?} vs {:?}, {} vs {} bytes)",
                url, metadata.etag, remote.etag, size, remote.size
            );
            None
        }
    }

    /// Open the cached copy and report it complete at its stored length
    async fn serve_cached(
        &self,
        key: &CacheKey,
        url: &str,
        size: u64,
        options: &FetchOptions,
    ) -> DownloadResult<Option<FetchedArtifact>> {
        let file = match self.cache.open(key).await {
            Ok(Some(file)) => file,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Could not open cached copy of {}: {}", url, e);
                return Ok(None);
            }
        };

        if let Some(mut signal) = options.start_signal.clone() {
            tokio::select! {
                biased;
                _ = options.cancel.cancelled() => return Err(DownloadError::Cancelled),
                _ = signal.wait() => {}
            }
        }

        options.report(DownloadProgress::complete(size));
        debug!("Serving {} from cache ({} bytes)", url, size);

        Ok(Some(FetchedArtifact {
            url: url.to_string(),
            source: FetchSource::Cache,
            size,
            body: ReaderStream::new(file).boxed(),
            driver: None,
        }))
    }

    async fn download(
        &self,
        key: CacheKey,
        url: &str,
        remote: &RemoteMetadata,
        options: &FetchOptions,
    ) -> DownloadResult<FetchedArtifact> {
        let response = tokio::select! {
            biased;
            _ = options.cancel.cancelled() => return Err(DownloadError::Cancelled),
            response = self.client.get(url) => response?,
        };

        info!("Downloading {} ({} bytes)", url, remote.size);

        let writer = self.start_cache_write(&key, url, remote).await;
        let (cache_tx, writer_handle) = match writer {
            Some((tx, handle)) => (Some(tx), Some(handle)),
            None => (None, None),
        };

        let (consumer_tx, consumer_rx) = mpsc::channel(stream::CONSUMER_CHANNEL_CAPACITY);
        let tee = Tee {
            url: url.to_string(),
            total: remote.size,
            consumer: Some(consumer_tx),
            cache: cache_tx,
            options: options.clone(),
        };

        let task_url = url.to_string();
        let driver = tokio::spawn(async move {
            let result = tee.run(response.bytes_stream()).await;
            if let Some(handle) = writer_handle {
                match handle.await {
                    Ok(Ok(written)) => debug!("Cached {} bytes for {}", written, task_url),
                    Ok(Err(e)) => warn!("Cache write for {} did not complete: {}", task_url, e),
                    Err(e) => error!("Cache writer task for {} failed: {}", task_url, e),
                }
            }
            result
        });

        Ok(FetchedArtifact {
            url: url.to_string(),
            source: FetchSource::Network,
            size: remote.size,
            body: receiver_stream(consumer_rx),
            driver: Some(driver),
        })
    }

    /// Replace the cached copy with an empty one and start the writer
    ///
    /// The old content is removed before the new metadata record is stored,
    /// so an interrupted download can never pair old bytes with new metadata.
    /// Returns `None` when the cache cannot be used; the download goes on.
    async fn start_cache_write(
        &self,
        key: &CacheKey,
        url: &str,
        remote: &RemoteMetadata,
    ) -> Option<(tee::CacheSender, JoinHandle<CacheResult<u64>>)> {
        let metadata = CacheEntryMetadata::new(remote.etag.clone(), remote.size, url);
        let prepared = async {
            self.cache.delete(key).await?;
            self.cache.write_metadata(key, &metadata).await
        };
        if let Err(e) = prepared.await {
            warn!("Caching disabled for {}: {}", url, e);
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cache = self.cache.clone();
        let key = key.clone();
        let handle = tokio::spawn(async move { cache.write(&key, cache_stream(rx)).await });
        Some((tx, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::CacheConfig;
    use tempfile::TempDir;

    async fn create_fetcher(temp_dir: &TempDir) -> ArtifactFetcher {
        let cache = CacheManager::new(CacheConfig::with_cache_root(temp_dir.path().to_path_buf()))
            .await
            .unwrap();
        ArtifactFetcher::new(Arc::new(ArtifactClient::new().unwrap()), Arc::new(cache))
    }

    fn unreachable_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}/model.gguf", port)
    }

    #[test]
    fn test_fetch_source_display() {
        assert_eq!(FetchSource::Cache.to_string(), "cache");
        assert_eq!(FetchSource::Network.to_string(), "network");
    }

    #[tokio::test]
    async fn test_offline_fallback_uses_stored_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = create_fetcher(&temp_dir).await;
        let url = unreachable_url();
        let key = CacheKey::from_url(&url);
        fetcher
            .cache()
            .write_metadata(&key, &CacheEntryMetadata::new("\"v1\"", 7, url.as_str()))
            .await
            .unwrap();

        let remote = fetcher.resolve_remote(&url, true).await.unwrap();
        assert_eq!(remote.etag, "\"v1\"");
        assert_eq!(remote.size, 7);

        let err = fetcher.resolve_remote(&url, false).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_offline_without_metadata_propagates() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = create_fetcher(&temp_dir).await;
        let err = fetcher
            .resolve_remote(&unreachable_url(), true)
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_offline_cache_hit_without_network() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = create_fetcher(&temp_dir).await;
        let url = unreachable_url();
        let key = CacheKey::from_url(&url);
        let chunks = futures::stream::iter(vec![Ok(Bytes::from_static(b"payload"))]);
        fetcher.cache().write(&key, chunks).await.unwrap();
        fetcher
            .cache()
            .write_metadata(&key, &CacheEntryMetadata::new("\"v1\"", 7, url.as_str()))
            .await
            .unwrap();

        let options = FetchOptions::default().with_offline(true);
        let fetched = fetcher.fetch(&url, &options).await.unwrap();
        assert_eq!(fetched.source(), FetchSource::Cache);

        let body: Vec<u8> = fetched
            .into_stream()
            .map(|chunk| chunk.unwrap().to_vec())
            .concat()
            .await;
        assert_eq!(body, b"payload");
    }

    #[tokio::test]
    async fn test_offline_blob_without_record_is_served() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = create_fetcher(&temp_dir).await;
        let url = unreachable_url();
        let key = CacheKey::from_url(&url);
        let chunks = futures::stream::iter(vec![Ok(Bytes::from_static(b"orphan"))]);
        fetcher.cache().write(&key, chunks).await.unwrap();

        let options = FetchOptions::default().with_offline(true);
        let fetched = fetcher.fetch(&url, &options).await.unwrap();
        assert_eq!(fetched.source(), FetchSource::Cache);
        assert_eq!(fetched.size(), 6);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = create_fetcher(&temp_dir).await;
        let options = FetchOptions::default();
        options.cancel.cancel();

        let remote = RemoteMetadata {
            etag: String::new(),
            size: 1,
        };
        let err = fetcher
            .fetch_validated("https://example.com/model.gguf", &remote, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
    }
}
