//! Cache configuration types and defaults
//!
//! This module contains the configuration structures for the persistent cache,
//! including the storage write mode selected once at start-up.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How artifact bytes are written to the storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Probe the backend at start-up and pick the best available strategy
    #[default]
    Auto,
    /// One asynchronous writable stream per key
    Stream,
    /// All writes funnelled through one dedicated single-writer thread
    Dedicated,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteMode::Auto => "auto",
            WriteMode::Stream => "stream",
            WriteMode::Dedicated => "dedicated",
        };
        f.write_str(name)
    }
}

/// Configuration for the persistent cache
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory for cache storage (OS-specific if None)
    pub cache_root: Option<PathBuf>,
    /// Storage write strategy
    pub write_mode: WriteMode,
}

impl CacheConfig {
    /// Create a new cache configuration with custom cache root
    pub fn with_cache_root(cache_root: PathBuf) -> Self {
        Self {
            cache_root: Some(cache_root),
            ..Default::default()
        }
    }

    /// Force a specific write strategy
    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }
}
