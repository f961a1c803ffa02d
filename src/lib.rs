//! Model Fetcher Library
//!
//! Streams large model artifacts over HTTP into a persistent local cache.
//! Artifacts split into numbered shards are resolved from any one shard URL
//! and downloaded with bounded parallelism, with one aggregated progress
//! stream and cooperative cancellation.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
