//! Command-line argument parsing for Model Fetcher
//!
//! This module defines the CLI structure using clap derive macros: artifact
//! acquisition, catalog listing, removal and cache inspection.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::ShardSource;
use crate::constants::coordinator::MAX_PARALLELISM;

/// Model Fetcher - Download and cache multi-shard model artifacts
#[derive(Parser, Debug)]
#[command(
    name = "model-fetcher",
    version,
    about = "Download and cache multi-shard model artifacts",
    long_about = "Streams large model files over HTTP into a persistent local cache.
Sharded artifacts (name-00001-of-00003.gguf) are expanded and fetched in parallel, and
cached shards are revalidated against the server before being reused."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download an artifact into the cache (or reuse a valid cached copy)
    Acquire(AcquireArgs),

    /// List cached artifacts
    List {
        /// Include incomplete artifacts
        #[arg(short, long)]
        all: bool,
    },

    /// Remove a cached artifact (any of its shard URLs may be given)
    Remove {
        /// URL of the artifact
        url: String,
    },

    /// Remove every cached file
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the shard URLs an artifact URL expands to
    Resolve {
        /// Artifact URL
        url: String,
    },

    /// Show cache statistics and location
    Info,
}

/// Arguments for the acquire command
#[derive(Args, Debug, Clone)]
pub struct AcquireArgs {
    /// Artifact URL, or every shard URL of an explicitly listed artifact
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Number of shards downloaded concurrently
    #[arg(short, long)]
    pub parallelism: Option<usize>,

    /// Ignore cached copies and download everything again
    #[arg(long)]
    pub no_cache: bool,

    /// Serve cached copies when the server cannot be reached
    #[arg(long)]
    pub offline: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level requested on the command line, if any
    pub fn log_level_override(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }

    /// Get the logging level, falling back to `configured` without flags
    pub fn log_level(&self, configured: tracing::Level) -> tracing::Level {
        self.log_level_override().unwrap_or(configured)
    }
}

impl AcquireArgs {
    /// Reject argument combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        match self.parallelism {
            Some(0) => Err("Parallelism must be greater than 0".to_string()),
            Some(n) if n > MAX_PARALLELISM => {
                Err(format!("Parallelism cannot exceed {}", MAX_PARALLELISM))
            }
            _ => Ok(()),
        }
    }

    /// A single URL is expanded from its shard pattern; several are taken as given
    pub fn shard_source(&self) -> ShardSource {
        match self.urls.as_slice() {
            [single] => ShardSource::Single(single.clone()),
            many => ShardSource::List(many.to_vec()),
        }
    }
}
