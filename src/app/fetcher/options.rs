//! Per-fetch options, cancellation and the start gate

use std::fmt;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::progress::{DownloadProgress, ProgressCallback};

/// Options for a single fetch
#[derive(Clone)]
pub struct FetchOptions {
    /// Serve a valid cached copy instead of downloading
    pub use_cache: bool,
    /// Fall back to stored metadata when the remote is unreachable
    pub allow_offline: bool,
    /// Progress callback
    pub on_progress: Option<ProgressCallback>,
    /// Cancellation signal
    pub cancel: CancellationToken,
    /// Gate awaited before a cache hit reports completion
    pub start_signal: Option<StartSignal>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            allow_offline: false,
            on_progress: None,
            cancel: CancellationToken::new(),
            start_signal: None,
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("use_cache", &self.use_cache)
            .field("allow_offline", &self.allow_offline)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("start_signal", &self.start_signal.is_some())
            .finish()
    }
}

impl FetchOptions {
    /// Enable or disable use of cached copies
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Enable or disable the offline fallback
    pub fn with_offline(mut self, allow_offline: bool) -> Self {
        self.allow_offline = allow_offline;
        self
    }

    /// Set the progress callback
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Use an existing cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set the start gate for cache hits
    pub fn with_start_signal(mut self, start_signal: StartSignal) -> Self {
        self.start_signal = Some(start_signal);
        self
    }

    /// Invoke the progress callback unless the fetch was cancelled
    pub(crate) fn report(&self, progress: DownloadProgress) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }
}

/// Caller-held side of a start gate
#[derive(Debug)]
pub struct StartTrigger(watch::Sender<bool>);

impl StartTrigger {
    /// Open the gate; every waiting and future [`StartSignal`] resolves
    pub fn start(&self) {
        let _ = self.0.send(true);
    }
}

/// Fetcher-held side of a start gate
///
/// Lets callers sequence their UI before a cache hit reports completion.
/// Dropping the [`StartTrigger`] also opens the gate.
#[derive(Debug, Clone)]
pub struct StartSignal(watch::Receiver<bool>);

impl StartSignal {
    /// Create a closed gate
    pub fn channel() -> (StartTrigger, StartSignal) {
        let (tx, rx) = watch::channel(false);
        (StartTrigger(tx), StartSignal(rx))
    }

    /// Wait until the gate opens
    pub async fn wait(&mut self) {
        // An error means the trigger is gone, which also counts as started
        let _ = self.0.wait_for(|started| *started).await;
    }
}
