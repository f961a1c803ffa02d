//! Byte-level progress display for artifact downloads
//!
//! Wraps an indicatif bar behind a [`ProgressCallback`] so the library can
//! report aggregate progress without knowing about the terminal. When
//! stderr is not a terminal the bar is replaced by periodic log lines.
//!
//! # Examples
//!
//! ```rust,no_run
//! use model_fetcher::cli::{ProgressConfig, ProgressDisplay};
//! use model_fetcher::app::DownloadProgress;
//!
//! let display = ProgressDisplay::new(ProgressConfig::default(), "model.gguf");
//! let callback = display.callback();
//! callback(DownloadProgress::new(512, 1024));
//! callback(DownloadProgress::complete(1024));
//! display.finish();
//! ```

use std::io::IsTerminal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::app::cache::format_bytes;
use crate::app::fetcher::{progress_callback, DownloadProgress, ProgressCallback};

/// Configuration for progress display
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Draw a progress bar (ignored when stderr is not a terminal)
    pub enable_progress_bars: bool,
    /// Show transfer rate and ETA in the bar
    pub show_download_rate: bool,
    /// Spinner tick interval
    pub tick_interval: Duration,
    /// Percentage step between log lines in text mode
    pub text_report_step: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: true,
            show_download_rate: true,
            tick_interval: Duration::from_millis(100),
            text_report_step: 10,
        }
    }
}

impl ProgressConfig {
    /// Configuration that never draws anything
    pub fn quiet() -> Self {
        Self {
            enable_progress_bars: false,
            text_report_step: 0,
            ..Self::default()
        }
    }
}

/// Progress output for one acquire run
pub struct ProgressDisplay {
    bar: ProgressBar,
    label: String,
    text_mode: bool,
    report_step: u64,
    last_reported_pct: Arc<AtomicU64>,
}

impl ProgressDisplay {
    /// Create a display labelled with `label`
    pub fn new(config: ProgressConfig, label: impl Into<String>) -> Self {
        let label = label.into();
        let interactive = config.enable_progress_bars && std::io::stderr().is_terminal();

        let bar = if interactive {
            let bar = ProgressBar::new(0);
            bar.set_style(Self::bar_style(config.show_download_rate));
            bar.set_message(label.clone());
            bar.enable_steady_tick(config.tick_interval);
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            bar,
            label,
            text_mode: !interactive && config.text_report_step > 0,
            report_step: config.text_report_step.max(1),
            last_reported_pct: Arc::new(AtomicU64::new(0)),
        }
    }

    fn bar_style(show_rate: bool) -> ProgressStyle {
        let template = if show_rate {
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ({eta}) {msg}"
        } else {
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}"
        };
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|e| {
                debug!("Progress bar template error: {}", e);
                ProgressStyle::default_bar()
            })
            .progress_chars("##-")
    }

    /// Callback that feeds this display
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        let label = self.label.clone();
        let text_mode = self.text_mode;
        let step = self.report_step;
        let last_pct = self.last_reported_pct.clone();

        progress_callback(move |progress: DownloadProgress| {
            if bar.length() != Some(progress.total) {
                bar.set_length(progress.total);
            }
            bar.set_position(progress.loaded);

            if text_mode {
                let pct = (progress.fraction() * 100.0) as u64;
                let bucket = pct / step * step;
                if bucket > last_pct.fetch_max(bucket, Ordering::Relaxed) {
                    info!(
                        "{}: {}% ({} of {})",
                        label,
                        bucket,
                        format_bytes(progress.loaded),
                        format_bytes(progress.total)
                    );
                }
            }
        })
    }

    /// Finish the bar, leaving it on screen
    pub fn finish(&self) {
        self.bar.finish_with_message(format!("{} done", self.label));
    }

    /// Remove the bar after a failure or cancellation
    pub fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}
