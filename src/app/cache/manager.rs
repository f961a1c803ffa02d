//! Persistent cache manager
//!
//! This module contains [`CacheManager`], the only component that touches the
//! storage backend. It stores artifact bytes under their [`CacheKey`] and a
//! JSON metadata record under `__metadata__<CacheKey>`, both directly in the
//! cache root.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::app::hash::CacheKey;
use crate::constants::{app, cache};
use crate::errors::{CacheError, CacheResult};

use super::config::CacheConfig;
use super::metadata::{CacheEntry, CacheEntryMetadata};
use super::stats::CacheStats;
use super::writer::{select_strategy, WriteStrategy};

/// Persistent key/value store for artifact bytes and their metadata
#[derive(Debug)]
pub struct CacheManager {
    /// Configuration
    config: CacheConfig,
    /// Cache root directory
    cache_root: PathBuf,
    /// Write strategy selected at start-up
    writer: Arc<dyn WriteStrategy>,
}

impl CacheManager {
    /// Open (and create if needed) the cache
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the cache directory cannot be created or the
    /// dedicated writer cannot be started
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        let cache_root = match &config.cache_root {
            Some(path) => path.clone(),
            None => Self::get_default_cache_dir()?,
        };

        Self::ensure_directory_exists(&cache_root).await?;
        let writer = select_strategy(config.write_mode, &cache_root).await?;

        info!(
            "Initialized cache with root: {} ({} writes)",
            cache_root.display(),
            writer.name()
        );

        Ok(Self {
            config,
            cache_root,
            writer,
        })
    }

    /// Get the cache root directory
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Name of the active write strategy
    pub fn write_strategy(&self) -> &'static str {
        self.writer.name()
    }

    /// Default cache directory for the current OS
    ///
    /// - macOS: ~/Library/Caches/model-fetcher/cache
    /// - Linux: ~/.cache/model-fetcher/cache
    /// - Windows: %LOCALAPPDATA%/model-fetcher/cache
    fn get_default_cache_dir() -> CacheResult<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| CacheError::DirectoryNotAccessible {
                path: PathBuf::from("system cache directory"),
            })?
            .join(app::APP_DIR_NAME)
            .join(cache::CACHE_DIR_NAME);

        Ok(cache_dir)
    }

    async fn ensure_directory_exists(path: &Path) -> CacheResult<()> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            fs::create_dir_all(path).await.map_err(|e| {
                error!("Failed to create cache directory: {}", e);
                CacheError::DirectoryNotAccessible {
                    path: path.to_path_buf(),
                }
            })?;
            debug!("Created cache directory: {}", path.display());
        }
        Ok(())
    }

    fn content_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_root.join(key.as_str())
    }

    fn metadata_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_root
            .join(format!("{}{}", cache::METADATA_PREFIX, key.as_str()))
    }

    /// Truncate any existing content for `key`, then copy `chunks` into it
    ///
    /// An `Err` item in the stream aborts the write and leaves an empty file,
    /// whose size no longer matches its metadata.
    pub async fn write<S>(&self, key: &CacheKey, chunks: S) -> CacheResult<u64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let path = self.content_path(key);
        self.writer.write(&path, chunks.boxed()).await
    }

    /// Open the stored content for reading
    ///
    /// Every call returns a fresh handle positioned at the start.
    pub async fn open(&self, key: &CacheKey) -> CacheResult<Option<fs::File>> {
        match fs::File::open(self.content_path(key)).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stored byte length, `None` when absent
    pub async fn size(&self, key: &CacheKey) -> CacheResult<Option<u64>> {
        match fs::metadata(self.content_path(key)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the metadata record for `key`
    pub async fn write_metadata(
        &self,
        key: &CacheKey,
        metadata: &CacheEntryMetadata,
    ) -> CacheResult<()> {
        let encoded = serde_json::to_vec(metadata)?;
        fs::write(self.metadata_path(key), encoded).await?;
        debug!("Wrote metadata for {}", key);
        Ok(())
    }

    /// Read the metadata record for `key`
    ///
    /// A record that cannot be decoded is treated as absent.
    pub async fn get_metadata(&self, key: &CacheKey) -> CacheResult<Option<CacheEntryMetadata>> {
        let path = self.metadata_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&raw) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                warn!("Ignoring malformed metadata record {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Stored content joined to its metadata record, `None` when absent
    ///
    /// Content without a usable record gets a polyfilled one sized from the
    /// blob, the same way [`list`](Self::list) reports it.
    pub async fn get_entry(&self, key: &CacheKey) -> CacheResult<Option<CacheEntry>> {
        let Some(byte_length) = self.size(key).await? else {
            return Ok(None);
        };
        let metadata = match self.get_metadata(key).await? {
            Some(metadata) => metadata,
            None => CacheEntryMetadata::polyfill(byte_length, ""),
        };
        Ok(Some(CacheEntry {
            key: key.clone(),
            byte_length,
            metadata,
        }))
    }

    /// Enumerate all content blobs joined to their metadata records
    ///
    /// Blobs without a record get a polyfilled one sized from the file itself.
    /// Entries are returned in key order.
    pub async fn list(&self) -> CacheResult<Vec<CacheEntry>> {
        let mut contents: Vec<(CacheKey, u64)> = Vec::new();
        let mut records: HashMap<CacheKey, CacheEntryMetadata> = HashMap::new();

        let mut dir = fs::read_dir(&self.cache_root).await?;
        while let Some(item) = dir.next_entry().await? {
            let file_type = item.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            let Some(name) = item.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            if let Some(key) = name.strip_prefix(cache::METADATA_PREFIX) {
                let key = CacheKey::from_stored(key);
                if let Some(metadata) = self.get_metadata(&key).await? {
                    records.insert(key, metadata);
                }
            } else {
                let len = item.metadata().await?.len();
                contents.push((CacheKey::from_stored(name), len));
            }
        }

        let mut entries: Vec<CacheEntry> = contents
            .into_iter()
            .map(|(key, byte_length)| {
                let metadata = records
                    .remove(&key)
                    .unwrap_or_else(|| CacheEntryMetadata::polyfill(byte_length, ""));
                CacheEntry {
                    key,
                    byte_length,
                    metadata,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        debug!("Listed {} cache entries", entries.len());
        Ok(entries)
    }

    /// Delete the content and metadata stored for `key`
    pub async fn delete(&self, key: &CacheKey) -> CacheResult<()> {
        remove_if_exists(&self.content_path(key)).await?;
        remove_if_exists(&self.metadata_path(key)).await?;
        debug!("Deleted cache entry {}", key);
        Ok(())
    }

    /// Delete every entry matching `predicate`, returning how many went
    pub async fn delete_many<F>(&self, predicate: F) -> CacheResult<usize>
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let mut deleted = 0;
        for entry in self.list().await? {
            if predicate(&entry) {
                self.delete(&entry.key).await?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!("Deleted {} cache entries", deleted);
        }
        Ok(deleted)
    }

    /// Delete everything in the cache root
    pub async fn clear(&self) -> CacheResult<()> {
        let mut dir = fs::read_dir(&self.cache_root).await?;
        let mut removed = 0usize;
        while let Some(item) = dir.next_entry().await? {
            if item.file_type().await?.is_file() {
                remove_if_exists(&item.path()).await?;
                removed += 1;
            }
        }

        info!("Cleared cache ({} files removed)", removed);
        Ok(())
    }

    /// Summary statistics for the current contents
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        let entries = self.list().await?;
        Ok(CacheStats::from_entries(
            self.cache_root.clone(),
            self.writer.name(),
            &entries,
        ))
    }
}

async fn remove_if_exists(path: &Path) -> CacheResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
