//! Command handlers for Model Fetcher CLI
//!
//! This module implements the command handlers that connect parsed
//! arguments to the artifact manager and the cache.

use std::io::{self, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app::cache::format_bytes;
use crate::app::{
    resolve_url, AcquireOptions, Artifact, ArtifactClient, ArtifactManager, ArtifactStatus,
    CacheManager, SignalHandler,
};
use crate::cli::{AcquireArgs, GlobalArgs, ProgressConfig, ProgressDisplay};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Load configuration and apply command-line overrides
pub async fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load(global.config.as_deref()).await?;
    if let Some(cache_dir) = &global.cache_dir {
        debug!("Cache directory overridden: {}", cache_dir.display());
        config.cache.cache_root = Some(cache_dir.clone());
    }
    Ok(config)
}

/// Build the artifact manager described by `config`
pub async fn build_manager(config: &AppConfig) -> Result<ArtifactManager> {
    let cache = Arc::new(CacheManager::new(config.cache.clone()).await?);
    let client = Arc::new(ArtifactClient::with_config(config.client.clone())?);
    ArtifactManager::new(cache, client, config.download.clone())
}

/// Handle the acquire command
///
/// Resolves the shard set, downloads what is missing or stale and prints a
/// summary. CTRL-C cancels every in-flight shard.
pub async fn handle_acquire(global: &GlobalArgs, config: &AppConfig, args: AcquireArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    let manager = build_manager(config).await?;
    let source = args.shard_source();
    let canonical = source.canonical_url()?;

    let cancel = CancellationToken::new();
    let signal_task = SignalHandler::new(cancel.clone()).setup();

    let progress_config = if global.quiet {
        ProgressConfig::quiet()
    } else {
        ProgressConfig::default()
    };
    let display = ProgressDisplay::new(progress_config, file_name(&canonical));

    let mut options = AcquireOptions::default()
        .with_cache(!args.no_cache)
        .with_offline(args.offline)
        .with_progress(display.callback())
        .with_cancel(cancel.clone());
    if let Some(parallelism) = args.parallelism {
        options = options.with_parallelism(parallelism);
    }

    info!("Acquiring {}", canonical);
    let result = manager.acquire_with(source, options).await;

    signal_task.abort();

    match result {
        Ok(artifact) => {
            display.finish();
            if !global.quiet {
                print_artifact_summary(&artifact);
            }
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            display.abandon();
            eprintln!("Download cancelled. Completed shards remain cached.");
            Ok(())
        }
        Err(e) => {
            display.abandon();
            Err(e)
        }
    }
}

/// Handle the list command
pub async fn handle_list(config: &AppConfig, all: bool) -> Result<()> {
    let manager = build_manager(config).await?;
    let artifacts = manager.list(all).await?;

    if artifacts.is_empty() {
        println!("No cached artifacts in {}", manager.cache().cache_root().display());
        return Ok(());
    }

    println!("{:<8} {:>10} {:>7}  URL", "STATUS", "SIZE", "SHARDS");
    for artifact in &artifacts {
        println!(
            "{:<8} {:>10} {:>7}  {}",
            artifact.status().to_string(),
            format_bytes(artifact.size().max(0) as u64),
            format!("{}/{}", artifact.files().len(), artifact.shard_urls().len()),
            artifact.url()
        );
    }
    Ok(())
}

/// Handle the remove command
pub async fn handle_remove(config: &AppConfig, url: &str) -> Result<()> {
    let manager = build_manager(config).await?;

    match manager.get(url).await? {
        Some(mut artifact) => {
            let size = artifact.size();
            manager.remove(&mut artifact).await?;
            println!(
                "Removed {} ({})",
                artifact.url(),
                format_bytes(size.max(0) as u64)
            );
        }
        None => println!("Not cached: {}", url),
    }
    Ok(())
}

/// Handle the clear command
pub async fn handle_clear(config: &AppConfig, yes: bool) -> Result<()> {
    let manager = build_manager(config).await?;
    let cache_root = manager.cache().cache_root().to_path_buf();

    if !yes && !confirm(&format!("Remove every cached file in {}?", cache_root.display()))? {
        println!("Aborted");
        return Ok(());
    }

    manager.clear().await?;
    println!("Cleared {}", cache_root.display());
    Ok(())
}

/// Handle the resolve command
pub fn handle_resolve(url: &str) {
    for shard in resolve_url(url) {
        println!("{}", shard);
    }
}

/// Handle the info command
pub async fn handle_info(config: &AppConfig) -> Result<()> {
    let cache = CacheManager::new(config.cache.clone()).await?;
    let stats = cache.stats().await?;

    println!("Cache Information");
    println!("=================");
    println!("Location:        {}", stats.cache_root.display());
    println!("Write strategy:  {}", stats.write_strategy);
    println!("Cached files:    {}", stats.entry_count);
    println!("Total size:      {}", stats.format_total_size());
    if stats.incomplete_entries > 0 {
        println!("Incomplete:      {}", stats.incomplete_entries);
    }
    if stats.polyfilled_entries > 0 {
        println!("Legacy records:  {}", stats.polyfilled_entries);
    }
    Ok(())
}

fn print_artifact_summary(artifact: &Artifact) {
    let marker = match artifact.status() {
        ArtifactStatus::Valid => "ready",
        ArtifactStatus::Invalid => "incomplete",
        ArtifactStatus::Deleted => "deleted",
    };
    println!("{} ({})", artifact.url(), marker);
    println!(
        "  {} shard(s), {}",
        artifact.shard_urls().len(),
        format_bytes(artifact.size().max(0) as u64)
    );
}

fn file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
