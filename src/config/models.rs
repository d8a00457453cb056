use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub storages: HashMap<String, StorageConfig>,
}

/// Transfer engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Elements moved concurrently inside one task
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Total save attempts per buffered element
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Pipe sources straight into storages that allow it
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_copy_buffer")]
    pub copy_buffer: ByteSize,
    #[serde(default = "default_pipe_depth")]
    pub pipe_depth: usize,
    #[serde(default)]
    pub temp: TempConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry: default_retry(),
            retry_backoff_ms: default_retry_backoff_ms(),
            stream: false,
            copy_buffer: default_copy_buffer(),
            pipe_depth: default_pipe_depth(),
            temp: TempConfig::default(),
        }
    }
}

fn default_workers() -> usize {
    3
}

fn default_retry() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_copy_buffer() -> ByteSize {
    ByteSize(64 * 1024) // 64 KB
}

fn default_pipe_depth() -> usize {
    8
}

/// Scratch space for buffered transfers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TempConfig {
    #[serde(default = "default_temp_path")]
    pub base_path: PathBuf,
}

impl Default for TempConfig {
    fn default() -> Self {
        Self {
            base_path: default_temp_path(),
        }
    }
}

fn default_temp_path() -> PathBuf {
    PathBuf::from("cache/")
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Tasks executed at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Seconds between sweeps of cancelled queued tasks; 0 disables
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    3
}

fn default_cleanup_interval_secs() -> u64 {
    30
}

/// HTTP source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 0 means no whole-request deadline
    #[serde(default)]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: 0,
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    concat!("ferry/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Local,
    Memory,
    S3,
}

/// One named storage
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Directory backing a local storage
    pub root: Option<PathBuf>,
    /// Key prefix applied to every path
    #[serde(default)]
    pub base_path: String,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
    /// Whether transfers may pipe into this storage without a temp file
    #[serde(default = "default_stream")]
    pub stream: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            root: None,
            base_path: String::new(),
            bucket: None,
            endpoint: None,
            region: None,
            access_key: None,
            secret_key: None,
            stream: default_stream(),
        }
    }
}

fn default_stream() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.engine.workers, 3);
        assert_eq!(config.engine.retry, 3);
        assert!(!config.engine.stream);
        assert_eq!(config.engine.copy_buffer.as_u64(), 64 * 1024);
        assert_eq!(config.engine.temp.base_path, PathBuf::from("cache/"));
        assert_eq!(config.scheduler.concurrency, 3);
        assert!(config.storages.is_empty());
    }

    #[test]
    fn test_storage_defaults() {
        let storage: StorageConfig = toml::from_str("provider = \"memory\"").unwrap();
        assert_eq!(storage.provider, StorageProvider::Memory);
        assert!(storage.stream);
        assert!(storage.base_path.is_empty());
    }
}
