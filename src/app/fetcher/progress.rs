//! Byte-level progress reporting

use std::fmt;
use std::sync::Arc;

/// Snapshot of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadProgress {
    /// Bytes received so far
    pub loaded: u64,
    /// Bytes expected in total
    pub total: u64,
}

impl DownloadProgress {
    /// Create a snapshot
    pub fn new(loaded: u64, total: u64) -> Self {
        Self { loaded, total }
    }

    /// Snapshot of a finished transfer of `total` bytes
    pub fn complete(total: u64) -> Self {
        Self::new(total, total)
    }

    /// True once every expected byte has arrived
    pub fn is_complete(&self) -> bool {
        self.loaded >= self.total
    }

    /// Completion ratio in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.loaded as f64 / self.total as f64).min(1.0)
        }
    }
}

impl fmt::Display for DownloadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} bytes ({:.1}%)",
            self.loaded,
            self.total,
            self.fraction() * 100.0
        )
    }
}

/// Callback receiving progress snapshots
///
/// Called from whichever task is driving the transfer, so it must be cheap
/// and thread-safe.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Wrap a closure as a [`ProgressCallback`]
pub fn progress_callback<F>(f: F) -> ProgressCallback
where
    F: Fn(DownloadProgress) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fraction() {
        assert_eq!(DownloadProgress::new(0, 0).fraction(), 1.0);
        assert_eq!(DownloadProgress::new(50, 200).fraction(), 0.25);
        assert!(DownloadProgress::complete(10).is_complete());
        assert!(!DownloadProgress::new(9, 10).is_complete());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DownloadProgress::new(1, 4).to_string(),
            "1/4 bytes (25.0%)"
        );
    }

    #[test]
    fn test_callback_wrapper() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback = progress_callback(move |p| sink.lock().unwrap().push(p.loaded));

        callback(DownloadProgress::new(3, 10));
        callback(DownloadProgress::complete(10));
        assert_eq!(*seen.lock().unwrap(), vec![3, 10]);
    }
}
