//! Aggregation of per-shard progress into one callback
//!
//! Each shard owns one accumulator slot. Reports are serialised through a
//! mutex that also remembers the last value handed to the callback, so the
//! aggregate `loaded` never goes backwards even when shard updates race.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::app::fetcher::{DownloadProgress, ProgressCallback};

/// Sums shard progress and forwards it to the caller
pub struct ProgressAggregator {
    accumulators: Vec<AtomicU64>,
    total: u64,
    last_reported: Mutex<Option<u64>>,
    callback: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("shards", &self.accumulators.len())
            .field("loaded", &self.loaded())
            .field("total", &self.total)
            .finish()
    }
}

impl ProgressAggregator {
    /// Aggregator for `shard_count` shards totalling `total` bytes
    pub fn new(
        shard_count: usize,
        total: u64,
        callback: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            accumulators: (0..shard_count).map(|_| AtomicU64::new(0)).collect(),
            total,
            last_reported: Mutex::new(None),
            callback,
            cancel,
        }
    }

    /// Expected bytes across all shards
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Current sum of all accumulators
    pub fn loaded(&self) -> u64 {
        self.accumulators
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .sum()
    }

    /// Record that shard `index` has loaded `loaded` bytes and report the sum
    pub fn update(&self, index: usize, loaded: u64) {
        let Some(slot) = self.accumulators.get(index) else {
            return;
        };
        slot.fetch_max(loaded, Ordering::AcqRel);

        if self.cancel.is_cancelled() {
            return;
        }

        let mut last = self
            .last_reported
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sum = self.loaded();
        if last.is_some_and(|previous| sum < previous) {
            return;
        }
        *last = Some(sum);

        if let Some(callback) = &self.callback {
            callback(DownloadProgress::new(sum, self.total));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording() -> (ProgressCallback, Arc<Mutex<Vec<DownloadProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |p: DownloadProgress| sink.lock().unwrap().push(p));
        (callback, seen)
    }

    #[test]
    fn test_sums_shards() {
        let (callback, seen) = recording();
        let aggregator = ProgressAggregator::new(3, 30, Some(callback), CancellationToken::new());

        aggregator.update(0, 5);
        aggregator.update(2, 10);
        aggregator.update(1, 10);
        aggregator.update(0, 10);
        aggregator.update(2, 10);

        let loaded: Vec<u64> = seen.lock().unwrap().iter().map(|p| p.loaded).collect();
        assert_eq!(loaded, vec![5, 15, 25, 30, 30]);
        assert!(seen.lock().unwrap().iter().all(|p| p.total == 30));
    }

    #[test]
    fn test_stale_shard_value_never_lowers_total() {
        let (callback, seen) = recording();
        let aggregator = ProgressAggregator::new(1, 10, Some(callback), CancellationToken::new());

        aggregator.update(0, 8);
        aggregator.update(0, 3);
        assert_eq!(aggregator.loaded(), 8);

        let loaded: Vec<u64> = seen.lock().unwrap().iter().map(|p| p.loaded).collect();
        assert_eq!(loaded, vec![8, 8]);
    }

    #[test]
    fn test_silent_after_cancel() {
        let (callback, seen) = recording();
        let cancel = CancellationToken::new();
        let aggregator = ProgressAggregator::new(2, 20, Some(callback), cancel.clone());

        aggregator.update(0, 5);
        cancel.cancel();
        aggregator.update(1, 5);

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(aggregator.loaded(), 10);
    }

    #[test]
    fn test_concurrent_updates_are_monotonic() {
        let (callback, seen) = recording();
        let aggregator = Arc::new(ProgressAggregator::new(
            4,
            4 * 1000,
            Some(callback),
            CancellationToken::new(),
        ));

        let threads: Vec<_> = (0..4)
            .map(|shard| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for step in 1..=100 {
                        aggregator.update(shard, step * 10);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0].loaded <= w[1].loaded));
        assert_eq!(seen.last().unwrap().loaded, 4000);
    }
}
