//! Persistent artifact cache
//!
//! This module provides the key/value store that holds downloaded artifact
//! bytes across process restarts. Each cached file is kept as a content blob
//! named after its [`CacheKey`](crate::app::hash::CacheKey) plus a JSON
//! metadata record recording the remote ETag, size and URL at the time it was
//! validated.
//!
//! # Module Organization
//!
//! - [`config`] - Configuration types and the storage write mode
//! - [`metadata`] - Metadata records and listing entries
//! - [`writer`] - Stream and dedicated-thread write strategies
//! - [`stats`] - Cache statistics
//! - [`manager`] - Core cache manager
//!
//! # Examples
//!
//! ```rust,no_run
//! use model_fetcher::app::cache::{CacheConfig, CacheEntryMetadata, CacheManager};
//! use model_fetcher::app::hash::CacheKey;
//! use bytes::Bytes;
//! use futures::stream;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = CacheManager::new(CacheConfig::default()).await?;
//!
//! let url = "https://example.com/model.gguf";
//! let key = CacheKey::from_url(url);
//! cache
//!     .write_metadata(&key, &CacheEntryMetadata::new("\"abc\"", 5, url))
//!     .await?;
//! let chunks = stream::iter(vec![Ok(Bytes::from_static(b"hello"))]);
//! cache.write(&key, chunks).await?;
//!
//! for entry in cache.list().await? {
//!     println!("{} ({} bytes)", entry.metadata.original_url, entry.byte_length);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod manager;
pub mod metadata;
pub mod stats;
pub mod writer;

// Re-export main public API
pub use config::{CacheConfig, WriteMode};
pub use manager::CacheManager;
pub use metadata::{CacheEntry, CacheEntryMetadata};
pub use stats::{format_bytes, CacheStats};
pub use writer::{DedicatedWriter, StreamWriter, WriteStrategy};
