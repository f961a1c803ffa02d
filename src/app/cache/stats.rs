//! Cache statistics
//!
//! Summaries computed from a cache listing, used by the CLI `info` command.

use std::path::PathBuf;

use super::metadata::CacheEntry;

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Cache root directory
    pub cache_root: PathBuf,
    /// Active write strategy
    pub write_strategy: &'static str,
    /// Number of content blobs on disk
    pub entry_count: usize,
    /// Total size of content blobs in bytes
    pub total_bytes: u64,
    /// Entries whose metadata record is missing or predates ETags
    pub polyfilled_entries: usize,
    /// Entries whose stored size differs from the recorded size
    pub incomplete_entries: usize,
}

impl CacheStats {
    /// Summarise a listing
    pub fn from_entries(
        cache_root: PathBuf,
        write_strategy: &'static str,
        entries: &[CacheEntry],
    ) -> Self {
        Self {
            cache_root,
            write_strategy,
            entry_count: entries.len(),
            total_bytes: entries.iter().map(|e| e.byte_length).sum(),
            polyfilled_entries: entries
                .iter()
                .filter(|e| e.metadata.is_polyfilled())
                .count(),
            incomplete_entries: entries.iter().filter(|e| !e.is_content_valid()).count(),
        }
    }

    /// Format cache size in human-readable format
    pub fn format_total_size(&self) -> String {
        format_bytes(self.total_bytes)
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
