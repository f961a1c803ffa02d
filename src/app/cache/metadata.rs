//! Cache entries and their sidecar metadata records
//!
//! Every cached artifact file is stored as two backend objects: the content
//! blob and a small JSON record `{etag, originalSize, originalURL}`. Records
//! written by older versions lack the `etag` field; those are read back with
//! the polyfill ETag so that validation can recognise and upgrade them.

use serde::{Deserialize, Serialize};

use crate::app::hash::CacheKey;
use crate::constants::cache::POLYFILL_ETAG;

fn polyfill_etag() -> String {
    POLYFILL_ETAG.to_string()
}

/// Remote state recorded alongside a cached file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntryMetadata {
    /// Remote entity tag (empty when the remote sent none)
    #[serde(default = "polyfill_etag")]
    pub etag: String,
    /// Remote Content-Length at validation time
    #[serde(rename = "originalSize")]
    pub original_size: u64,
    /// URL this entry was fetched for
    #[serde(rename = "originalURL")]
    pub original_url: String,
}

impl CacheEntryMetadata {
    /// Build a record from validated remote state
    pub fn new(etag: impl Into<String>, original_size: u64, original_url: impl Into<String>) -> Self {
        Self {
            etag: etag.into(),
            original_size,
            original_url: original_url.into(),
        }
    }

    /// Record for a content blob that has no usable metadata
    pub fn polyfill(original_size: u64, original_url: impl Into<String>) -> Self {
        Self::new(POLYFILL_ETAG, original_size, original_url)
    }

    /// True for records synthesised for legacy entries
    pub fn is_polyfilled(&self) -> bool {
        self.etag == POLYFILL_ETAG
    }
}

/// One cached file as seen by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Storage key
    pub key: CacheKey,
    /// Physically stored byte length
    pub byte_length: u64,
    /// Joined metadata record (polyfilled if absent)
    pub metadata: CacheEntryMetadata,
}

impl CacheEntry {
    /// Stored length matches the size recorded at validation time
    pub fn is_content_valid(&self) -> bool {
        self.byte_length == self.metadata.original_size
    }
}
