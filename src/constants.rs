//! Application constants for Model Fetcher
//!
//! This module centralizes all constants used throughout the library,
//! organized by functional domain.

use std::time::Duration;

/// Artifact naming constants
pub mod artifact {
    /// File extension every single-file or first-shard URL must carry
    pub const DEFAULT_EXTENSION: &str = ".gguf";

    /// Width of the zero-padded shard index and total
    pub const SHARD_INDEX_WIDTH: usize = 5;

    /// Size recorded on an artifact after it has been removed
    pub const DELETED_SIZE: i64 = -1;
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("model-fetcher/", env!("CARGO_PKG_VERSION"));

    /// Timeout for metadata (HEAD) requests
    pub const HEAD_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// TCP keep-alive interval
    pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;
}

/// Rate limiting
pub mod limits {
    /// Default request rate limit (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 20;
}

/// Cache storage layout constants
pub mod cache {
    /// Name of the cache directory under the application directory
    pub const CACHE_DIR_NAME: &str = "cache";

    /// Prefix for metadata sidecar files (`<prefix><CacheKey>`)
    pub const METADATA_PREFIX: &str = "__metadata__";

    /// ETag recorded for entries whose metadata predates integrity records
    pub const POLYFILL_ETAG: &str = "polyfill_for_older_version";

    /// Probe file used to detect the available write strategy
    pub const WRITE_PROBE_FILE: &str = ".write_probe";

    /// Maximum length of the human-readable key suffix
    pub const MAX_KEY_SUFFIX_LEN: usize = 128;
}

/// Streaming and fan-out constants
pub mod stream {
    /// Chunks buffered between the network driver and the consumer
    pub const CONSUMER_CHANNEL_CAPACITY: usize = 16;

    /// Commands buffered for the dedicated writer thread
    pub const DEDICATED_WRITER_CAPACITY: usize = 64;
}

/// Download coordination constants
pub mod coordinator {
    /// Default number of shards downloaded concurrently
    pub const DEFAULT_PARALLELISM: usize = 3;

    /// Upper bound on concurrent shard downloads
    pub const MAX_PARALLELISM: usize = 16;
}

/// Application directory naming
pub mod app {
    /// Directory name under the OS cache/config directories
    pub const APP_DIR_NAME: &str = "model-fetcher";

    /// Local config file name searched in the working directory
    pub const LOCAL_CONFIG_FILE: &str = "model-fetcher.toml";
}

// Re-export commonly used constants for convenience
pub use artifact::{DEFAULT_EXTENSION, DELETED_SIZE};
pub use coordinator::DEFAULT_PARALLELISM;
pub use http::USER_AGENT;
