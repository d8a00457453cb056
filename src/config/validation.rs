use super::models::{Config, StorageProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("engine.workers must be at least 1")]
    InvalidWorkers,

    #[error("engine.retry must be at least 1 attempt")]
    InvalidRetry,

    #[error("engine.copy_buffer must be positive")]
    InvalidCopyBuffer,

    #[error("engine.pipe_depth must be at least 1")]
    InvalidPipeDepth,

    #[error("scheduler.concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("No storages configured")]
    NoStoragesConfigured,

    #[error("Local storage '{storage}' has no root directory")]
    MissingLocalRoot { storage: String },

    #[error("S3 storage '{storage}' has no bucket")]
    MissingBucket { storage: String },

    #[error("S3 storage '{storage}' is missing credentials (access_key or secret_key)")]
    MissingS3Credentials { storage: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_engine(config)?;
    validate_scheduler(config)?;
    validate_storages(config)?;
    Ok(())
}

fn validate_engine(config: &Config) -> Result<(), ValidationError> {
    let engine = &config.engine;

    if engine.workers == 0 {
        return Err(ValidationError::InvalidWorkers);
    }
    if engine.retry == 0 {
        return Err(ValidationError::InvalidRetry);
    }
    if engine.copy_buffer.as_u64() == 0 {
        return Err(ValidationError::InvalidCopyBuffer);
    }
    if engine.pipe_depth == 0 {
        return Err(ValidationError::InvalidPipeDepth);
    }

    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<(), ValidationError> {
    if config.scheduler.concurrency == 0 {
        return Err(ValidationError::InvalidConcurrency);
    }
    Ok(())
}

/// Every storage needs enough settings to be constructed
fn validate_storages(config: &Config) -> Result<(), ValidationError> {
    if config.storages.is_empty() {
        return Err(ValidationError::NoStoragesConfigured);
    }

    for (name, storage) in &config.storages {
        match storage.provider {
            StorageProvider::Memory => {}
            StorageProvider::Local => {
                if storage.root.is_none() {
                    return Err(ValidationError::MissingLocalRoot {
                        storage: name.clone(),
                    });
                }
            }
            StorageProvider::S3 => {
                if storage.bucket.is_none() {
                    return Err(ValidationError::MissingBucket {
                        storage: name.clone(),
                    });
                }
                // Credentials may come from an instance profile when no endpoint is set
                if storage.endpoint.is_some()
                    && (storage.access_key.is_none() || storage.secret_key.is_none())
                {
                    return Err(ValidationError::MissingS3Credentials {
                        storage: name.clone(),
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::StorageConfig;
    use crate::humanize::ByteSize;
    use std::path::PathBuf;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.storages.insert(
            "disk".to_string(),
            StorageConfig {
                provider: StorageProvider::Local,
                root: Some(PathBuf::from("/srv/files")),
                ..StorageConfig::default()
            },
        );
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_zero_workers() {
        let mut config = valid_config();
        config.engine.workers = 0;
        assert!(matches!(validate(&config), Err(ValidationError::InvalidWorkers)));
    }

    #[test]
    fn test_zero_retry() {
        let mut config = valid_config();
        config.engine.retry = 0;
        assert!(matches!(validate(&config), Err(ValidationError::InvalidRetry)));
    }

    #[test]
    fn test_zero_copy_buffer() {
        let mut config = valid_config();
        config.engine.copy_buffer = ByteSize(0);
        assert!(matches!(validate(&config), Err(ValidationError::InvalidCopyBuffer)));
    }

    #[test]
    fn test_zero_concurrency() {
        let mut config = valid_config();
        config.scheduler.concurrency = 0;
        assert!(matches!(validate(&config), Err(ValidationError::InvalidConcurrency)));
    }

    #[test]
    fn test_no_storages() {
        let config = Config::default();
        assert!(matches!(validate(&config), Err(ValidationError::NoStoragesConfigured)));
    }

    #[test]
    fn test_local_without_root() {
        let mut config = valid_config();
        config.storages.insert("bad".to_string(), StorageConfig::default());
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingLocalRoot { storage }) if storage == "bad"
        ));
    }

    #[test]
    fn test_s3_checks() {
        let mut config = valid_config();
        config.storages.insert(
            "s3".to_string(),
            StorageConfig {
                provider: StorageProvider::S3,
                ..StorageConfig::default()
            },
        );
        assert!(matches!(validate(&config), Err(ValidationError::MissingBucket { .. })));

        let s3 = config.storages.get_mut("s3").unwrap();
        s3.bucket = Some("b".to_string());
        s3.endpoint = Some("http://minio:9000".to_string());
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingS3Credentials { .. })
        ));

        let s3 = config.storages.get_mut("s3").unwrap();
        s3.access_key = Some("key".to_string());
        s3.secret_key = Some("secret".to_string());
        assert!(validate(&config).is_ok());
    }
}
