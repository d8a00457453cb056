use super::models::{Config, StorageProvider};
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "FERRY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/ferry.toml";
const ENV_PREFIX: &str = "FERRY";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
///
/// An explicit `path` wins over `FERRY_CONFIG`.
pub fn load(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = path.unwrap_or_else(|| {
        env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    });

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Fill S3 credentials from the environment
///
/// Secrets are never read from TOML. Every S3 storage without its own keys
/// gets the process-wide ones.
fn load_secrets(config: &mut Config) {
    let access_key = env::var("S3_ACCESS_KEY")
        .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
        .ok();
    let secret_key = env::var("S3_SECRET_KEY")
        .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
        .ok();

    for storage in config.storages.values_mut() {
        if storage.provider != StorageProvider::S3 {
            continue;
        }
        if storage.access_key.is_none() {
            storage.access_key = access_key.clone();
        }
        if storage.secret_key.is_none() {
            storage.secret_key = secret_key.clone();
        }
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // FERRY__ENGINE__WORKERS -> engine.workers
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.engine.workers, 3);
        assert_eq!(config.scheduler.cleanup_interval_secs, 30);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[engine]
workers = 8
stream = true
copy_buffer = "1MB"

[engine.temp]
base_path = "/tmp/ferry"

[storages.archive]
provider = "s3"
bucket = "archive"
region = "eu-west-1"
stream = false
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.engine.workers, 8);
        assert!(config.engine.stream);
        assert_eq!(config.engine.copy_buffer.as_u64(), 1024 * 1024);
        assert_eq!(config.engine.temp.base_path, PathBuf::from("/tmp/ferry"));

        let archive = &config.storages["archive"];
        assert_eq!(archive.provider, StorageProvider::S3);
        assert_eq!(archive.bucket.as_deref(), Some("archive"));
        assert!(!archive.stream);
    }

    // Environment overrides are not exercised here to avoid mutating the
    // process environment from parallel tests
}
