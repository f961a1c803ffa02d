//! Configuration management for Model Fetcher
//!
//! This module loads the TOML configuration file, falling back to built-in
//! defaults for every missing section or field.
//!
//! Search order:
//! 1. the path given with `--config` (must exist)
//! 2. `./model-fetcher.toml`
//! 3. `<user config dir>/model-fetcher/config.toml`
//!
//! ```toml
//! [cache]
//! # cache_root = "/data/models"
//! write_mode = "auto"        # auto | stream | dedicated
//!
//! [client]
//! head_timeout = "30s"
//! connect_timeout = "30s"
//! rate_limit_rps = 20
//!
//! [download]
//! parallelism = 3
//! extension = ".gguf"
//!
//! [logging]
//! level = "warn"          # used when no -v/-q flag is given
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{CacheConfig, ClientConfig, ManagerConfig};
use crate::constants::app;
use crate::errors::{ConfigError, Result};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Cache storage settings
    pub cache: CacheConfig,
    /// HTTP client settings
    pub client: ClientConfig,
    /// Download and artifact naming settings
    pub download: ManagerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl LoggingConfig {
    const LEVELS: [&'static str; 5] = ["error", "warn", "info", "debug", "trace"];

    /// Validate the log level name
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if Self::LEVELS.contains(&self.level.to_lowercase().as_str()) {
            Ok(())
        } else {
            Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: self.level.clone(),
                reason: format!("Expected one of {}", Self::LEVELS.join(", ")),
            })
        }
    }

    /// Parsed log level, `WARN` if the name is not recognised
    pub fn tracing_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::WARN)
    }
}

impl AppConfig {
    /// Load configuration from the first file found, or defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if an explicit path does not exist,
    /// and `ConfigError::InvalidFormat`/`InvalidValue` for a bad file
    pub async fn load(config_file_override: Option<&Path>) -> Result<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound {
                        path: path.to_path_buf(),
                    }
                    .into());
                }
                Some(path.to_path_buf())
            }
            None => Self::find_config_file(),
        };

        let config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> std::result::Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate every section
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.client.validate()?;
        self.download.validate()?;
        self.logging.validate()
    }

    /// Candidate config file locations, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".").join(app::LOCAL_CONFIG_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(app::APP_DIR_NAME).join("config.toml"));
        }
        paths
    }

    fn find_config_file() -> Option<PathBuf> {
        let found = Self::search_paths().into_iter().find(|path| path.exists());
        if let Some(path) = &found {
            debug!("Found config file: {}", path.display());
        }
        found
    }

    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::WriteMode;
    use crate::errors::AppError;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.download.extension, ".gguf");
        assert_eq!(config.download.download.parallelism, 3);
        assert_eq!(config.cache.write_mode, WriteMode::Auto);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [cache]
            cache_root = "/tmp/models"
            write_mode = "dedicated"

            [client]
            head_timeout = "5s"

            [download]
            parallelism = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.cache_root, Some(PathBuf::from("/tmp/models")));
        assert_eq!(config.cache.write_mode, WriteMode::Dedicated);
        assert_eq!(config.client.head_timeout, Duration::from_secs(5));
        assert_eq!(config.client.rate_limit_rps, 20);
        assert_eq!(config.download.download.parallelism, 6);
        assert_eq!(config.download.extension, ".gguf");
    }

    #[test]
    fn test_invalid_values() {
        let config = AppConfig::from_toml("[download]\nparallelism = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config = AppConfig::from_toml("[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(config.validate().is_err());

        assert!(matches!(
            AppConfig::from_toml("[cache]\nwrite_mode = \"sideways\"\n"),
            Err(ConfigError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_load_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(&path, "[download]\nextension = \".bin\"\n").unwrap();

        let config = AppConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.download.extension, ".bin");
    }

    #[tokio::test]
    async fn test_load_missing_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = AppConfig::load(Some(&temp_dir.path().join("absent.toml")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_tracing_level() {
        let logging = LoggingConfig {
            level: "DEBUG".to_string(),
        };
        assert_eq!(logging.tracing_level(), tracing::Level::DEBUG);
        assert_eq!(LoggingConfig::default().tracing_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_search_paths() {
        let paths = AppConfig::search_paths();
        assert_eq!(paths[0], PathBuf::from("./model-fetcher.toml"));
    }
}
