//! Configuration management for ferry
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use ferry::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Inner workers per task: {}", config.engine.workers);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `FERRY__<section>__<key>`
//!
//! Examples:
//! - `FERRY__ENGINE__WORKERS=8`
//! - `FERRY__ENGINE__STREAM=true`
//! - `FERRY__SCHEDULER__CONCURRENCY=2`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/ferry.toml`.
//! This can be overridden using the `FERRY_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::ByteSize;
pub use models::{
    Config, EngineConfig, HttpSettings, SchedulerConfig, StorageConfig, StorageProvider,
    TempConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`FERRY__*`)
    /// 2. TOML file (default: `config/ferry.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (zero workers, incomplete storages, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Same as [`Config::load`] with an explicit file instead of `FERRY_CONFIG`
    pub fn load_with(path: Option<std::path::PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Skips `.env` and S3 secrets. Useful for testing with custom
    /// configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Effective configuration as TOML; secrets are never included
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[storages.scratch]
provider = "memory"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.storages.len(), 1);
        assert_eq!(config.engine.workers, 3);
    }

    #[test]
    fn test_validation_catches_zero_workers() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[engine]
workers = 0

[storages.scratch]
provider = "memory"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidWorkers)
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");
        let root = temp_dir.path().join("files");

        let toml_content = format!(
            r#"
[engine]
workers = 4
retry = 5
retry_backoff_ms = 250
stream = true
copy_buffer = "128KB"
pipe_depth = 16

[engine.temp]
base_path = "{temp}"

[scheduler]
concurrency = 2
cleanup_interval_secs = 0

[http]
connect_timeout_secs = 5
request_timeout_secs = 600
user_agent = "ferry-test"

[storages.disk]
provider = "local"
root = "{root}"
base_path = "incoming"

[storages.scratch]
provider = "memory"
stream = false
        "#,
            temp = temp_dir.path().join("cache").display(),
            root = root.display(),
        );

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.engine.workers, 4);
        assert_eq!(config.engine.retry, 5);
        assert_eq!(config.engine.copy_buffer.as_u64(), 128 * 1024);
        assert_eq!(config.scheduler.concurrency, 2);
        assert_eq!(config.scheduler.cleanup_interval_secs, 0);
        assert_eq!(config.http.request_timeout_secs, 600);
        assert_eq!(config.storages["disk"].base_path, "incoming");
        assert!(!config.storages["scratch"].stream);

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("workers = 4"));
    }
}
