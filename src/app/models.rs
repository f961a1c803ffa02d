//! Data models for cached artifacts
//!
//! An [`Artifact`] is a projection over the persistent cache: the cache
//! entries belonging to one canonical URL, rebuilt on every query and never
//! stored itself.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::fs::File;

use crate::app::cache::{CacheEntry, CacheManager};
use crate::app::hash::CacheKey;
use crate::constants::DELETED_SIZE;
use crate::errors::{ArtifactError, Result};

/// Lifecycle state of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    /// Every shard present with the recorded size
    Valid,
    /// Shards missing or sizes not matching their records
    Invalid,
    /// Removed through the manager
    Deleted,
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactStatus::Valid => "valid",
            ArtifactStatus::Invalid => "invalid",
            ArtifactStatus::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// One artifact as seen through the cache
#[derive(Clone)]
pub struct Artifact {
    url: String,
    shard_urls: Vec<String>,
    files: Vec<CacheEntry>,
    size: i64,
    cache: Arc<CacheManager>,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("url", &self.url)
            .field("shards", &self.shard_urls.len())
            .field("files", &self.files.len())
            .field("size", &self.size)
            .finish()
    }
}

impl Artifact {
    /// Build the projection for `shard_urls` from the entries that belong to it
    ///
    /// The first shard URL is the canonical URL. Entries are ordered by their
    /// original URL.
    pub fn from_entries(
        shard_urls: Vec<String>,
        mut files: Vec<CacheEntry>,
        cache: Arc<CacheManager>,
    ) -> Self {
        files.sort_by(|a, b| a.metadata.original_url.cmp(&b.metadata.original_url));
        let size = files.iter().map(|f| f.byte_length as i64).sum();
        let url = shard_urls.first().cloned().unwrap_or_default();

        Self {
            url,
            shard_urls,
            files,
            size,
            cache,
        }
    }

    /// Canonical URL (first shard, or the single file)
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URLs of every shard, in ascending shard order
    pub fn shard_urls(&self) -> &[String] {
        &self.shard_urls
    }

    /// Cached files found for this artifact, ordered by URL
    pub fn files(&self) -> &[CacheEntry] {
        &self.files
    }

    /// Total stored bytes, or `-1` once removed
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Whether the artifact has been removed
    pub fn is_deleted(&self) -> bool {
        self.size == DELETED_SIZE
    }

    /// Compute the lifecycle state
    pub fn status(&self) -> ArtifactStatus {
        if self.is_deleted() {
            return ArtifactStatus::Deleted;
        }
        if self.files.len() != self.shard_urls.len() {
            return ArtifactStatus::Invalid;
        }
        if self.files.iter().all(CacheEntry::is_content_valid) {
            ArtifactStatus::Valid
        } else {
            ArtifactStatus::Invalid
        }
    }

    /// Whether the artifact is complete and usable
    pub fn is_valid(&self) -> bool {
        self.status() == ArtifactStatus::Valid
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.size = DELETED_SIZE;
    }

    /// Open one read handle per shard, in ascending shard order
    ///
    /// Handles support seeking, so the consumer can read shards at random
    /// offsets without loading them into memory.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::Deleted` after removal and
    /// `ArtifactError::NotCached` if a shard is missing from the cache
    pub async fn open(&self) -> Result<Vec<File>> {
        if self.is_deleted() {
            return Err(ArtifactError::Deleted {
                url: self.url.clone(),
            }
            .into());
        }

        let mut handles = Vec::with_capacity(self.shard_urls.len());
        for url in &self.shard_urls {
            match self.cache.open(&CacheKey::from_url(url)).await? {
                Some(file) => handles.push(file),
                None => return Err(ArtifactError::NotCached { url: url.clone() }.into()),
            }
        }
        Ok(handles)
    }
}
