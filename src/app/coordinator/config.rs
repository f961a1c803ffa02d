//! Configuration structures for the download coordinator
//!
//! This module defines the bounded parallelism used when downloading the
//! shards of one artifact.

use serde::{Deserialize, Serialize};

use crate::constants::coordinator;
use crate::errors::ConfigError;

/// Configuration for the download coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Number of shards downloaded concurrently
    pub parallelism: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            parallelism: coordinator::DEFAULT_PARALLELISM,
        }
    }
}

impl CoordinatorConfig {
    /// Set the number of concurrent shard downloads
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == 0 || self.parallelism > coordinator::MAX_PARALLELISM {
            return Err(ConfigError::InvalidValue {
                field: "download.parallelism".to_string(),
                value: self.parallelism.to_string(),
                reason: format!("Must be between 1 and {}", coordinator::MAX_PARALLELISM),
            });
        }
        Ok(())
    }
}
