//! Bounded-parallelism download of multi-shard artifacts
//!
//! This module drives [`ArtifactFetcher`] over a shard list with a fixed
//! number of concurrent workers and reports one aggregated progress stream.
//!
//! # Architecture
//!
//! - [`config`] - Parallelism settings and validation
//! - [`queue`] - Shared queue of shard indices
//! - [`progress`] - Per-shard accumulators and the monotonic aggregate
//! - [`signals`] - Signal handling for graceful cancellation
//!
//! The run proceeds in two phases. First the remote size of every shard is
//! resolved (in parallel) to obtain the total. Then `parallelism` workers
//! repeatedly claim the next shard index and fetch it to completion. The
//! first failure cancels every sibling, and the run returns that failure.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use model_fetcher::app::cache::{CacheConfig, CacheManager};
//! use model_fetcher::app::client::ArtifactClient;
//! use model_fetcher::app::coordinator::{CoordinatorConfig, DownloadCoordinator};
//! use model_fetcher::app::fetcher::{ArtifactFetcher, FetchOptions};
//! use model_fetcher::app::shards::resolve_url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(CacheManager::new(CacheConfig::default()).await?);
//! let fetcher = ArtifactFetcher::new(Arc::new(ArtifactClient::new()?), cache);
//! let coordinator = DownloadCoordinator::new(fetcher, CoordinatorConfig::default().with_parallelism(4));
//!
//! let urls = resolve_url("https://example.com/model-00001-of-00003.gguf");
//! let report = coordinator.run(&urls, &FetchOptions::default()).await?;
//! println!("{} bytes in {} shards", report.total_bytes, report.shards);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod progress;
pub mod queue;
pub mod signals;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::app::client::RemoteMetadata;
use crate::app::fetcher::{ArtifactFetcher, DownloadProgress, FetchOptions, FetchSource};
use crate::errors::{DownloadError, DownloadResult};

pub use config::CoordinatorConfig;
pub use progress::ProgressAggregator;
pub use queue::ShardQueue;
pub use signals::SignalHandler;

/// Outcome of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorReport {
    /// Number of shards
    pub shards: usize,
    /// Sum of remote shard sizes
    pub total_bytes: u64,
    /// Shards served from a valid cached copy
    pub from_cache: usize,
    /// Shards downloaded from the network
    pub downloaded: usize,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct WorkerTally {
    from_cache: usize,
    downloaded: usize,
}

/// State shared by all workers of one run
struct RunContext {
    fetcher: ArtifactFetcher,
    urls: Vec<String>,
    remotes: Vec<RemoteMetadata>,
    queue: ShardQueue,
    aggregator: Arc<ProgressAggregator>,
    options: FetchOptions,
}

/// Drives shard downloads with bounded parallelism
#[derive(Debug, Clone)]
pub struct DownloadCoordinator {
    fetcher: ArtifactFetcher,
    config: CoordinatorConfig,
}

impl DownloadCoordinator {
    /// Create a coordinator
    pub fn new(fetcher: ArtifactFetcher, config: CoordinatorConfig) -> Self {
        Self { fetcher, config }
    }

    /// Coordinator configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Fetch every URL in `urls`, reporting aggregate progress
    ///
    /// Resolves only once every worker has finished. `options.on_progress`
    /// receives the sum over all shards; `loaded` never decreases.
    ///
    /// # Errors
    ///
    /// Returns the first shard failure, or `DownloadError::Cancelled` when
    /// `options.cancel` fires
    pub async fn run(&self, urls: &[String], options: &FetchOptions) -> DownloadResult<CoordinatorReport> {
        let started = Instant::now();
        let cancel = options.cancel.child_token();

        let remotes = self.resolve_all(urls, options).await?;
        let total_bytes: u64 = remotes.iter().map(|r| r.size).sum();
        info!(
            "Fetching {} shard(s), {} bytes total, parallelism {}",
            urls.len(),
            total_bytes,
            self.config.parallelism
        );

        let aggregator = Arc::new(ProgressAggregator::new(
            urls.len(),
            total_bytes,
            options.on_progress.clone(),
            cancel.clone(),
        ));
        let context = Arc::new(RunContext {
            fetcher: self.fetcher.clone(),
            urls: urls.to_vec(),
            remotes,
            queue: ShardQueue::new(urls.len()),
            aggregator,
            options: options.clone().with_cancel(cancel.clone()),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.parallelism.max(1) {
            let context = context.clone();
            workers.spawn(async move { run_worker(worker_id, context).await });
        }

        let mut tally = WorkerTally::default();
        let mut first_error: Option<DownloadError> = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(DownloadError::WorkerPanic {
                    reason: e.to_string(),
                })
            });
            match result {
                Ok(worker_tally) => {
                    tally.from_cache += worker_tally.from_cache;
                    tally.downloaded += worker_tally.downloaded;
                }
                Err(e) => {
                    if first_error.is_none() {
                        if !matches!(e, DownloadError::Cancelled) {
                            warn!("Shard download failed, cancelling remaining shards: {}", e);
                        }
                        cancel.cancel();
                        let dropped = context.queue.clear();
                        debug!("Abandoned {} queued shard(s)", dropped);
                        first_error = Some(e);
                    }
                }
            }
        }

        if options.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let report = CoordinatorReport {
            shards: urls.len(),
            total_bytes,
            from_cache: tally.from_cache,
            downloaded: tally.downloaded,
            elapsed: started.elapsed(),
        };
        info!(
            "Fetched {} shard(s) in {:.1}s ({} downloaded, {} from cache)",
            report.shards,
            report.elapsed.as_secs_f64(),
            report.downloaded,
            report.from_cache
        );
        Ok(report)
    }

    /// One metadata request per shard, all in flight at once
    async fn resolve_all(&self, urls: &[String], options: &FetchOptions) -> DownloadResult<Vec<RemoteMetadata>> {
        let requests = urls
            .iter()
            .map(|url| self.fetcher.resolve_remote(url, options.allow_offline));

        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => Err(DownloadError::Cancelled),
            remotes = try_join_all(requests) => remotes,
        }
    }
}

async fn run_worker(worker_id: usize, context: Arc<RunContext>) -> DownloadResult<WorkerTally> {
    let mut tally = WorkerTally::default();

    loop {
        if context.options.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        let Some(index) = context.queue.claim() else {
            break;
        };

        let url = &context.urls[index];
        debug!("Worker {} claimed shard {} ({})", worker_id, index + 1, url);

        let aggregator = context.aggregator.clone();
        let options = context
            .options
            .clone()
            .with_progress(Arc::new(move |p: DownloadProgress| {
                aggregator.update(index, p.loaded)
            }));

        let fetched = context
            .fetcher
            .fetch_validated(url, &context.remotes[index], &options)
            .await?;
        match fetched.source() {
            FetchSource::Cache => tally.from_cache += 1,
            FetchSource::Network => tally.downloaded += 1,
        }
        fetched.finish().await?;
    }

    debug!("Worker {} finished", worker_id);
    Ok(tally)
}
