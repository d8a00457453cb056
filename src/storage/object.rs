//! Storage backend over Apache Arrow `object_store`

use super::{
    BoxReader, FileInfo, ListableStorage, ReadableStorage, Result, Storage, StorageError,
    join_path,
};
use crate::config::{StorageConfig, StorageProvider};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

/// Storage client wrapping any `object_store` backend
#[derive(Clone)]
pub struct ObjectStorage {
    name: String,
    store: Arc<dyn ObjectStore>,
    base_path: String,
    stream: bool,
}

impl ObjectStorage {
    pub fn new(name: impl Into<String>, store: Arc<dyn ObjectStore>, base_path: &str) -> Self {
        Self {
            name: name.into(),
            store,
            base_path: join_path(base_path, ""),
            stream: true,
        }
    }

    /// In-memory storage for tests and dry runs
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(InMemory::new()), "")
    }

    /// Local directory storage, creating `root` if missing
    pub fn local(name: impl Into<String>, root: &Path, base_path: &str) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(name, Arc::new(store), base_path))
    }

    pub fn from_config(name: &str, config: &StorageConfig) -> Result<Self> {
        let storage = match config.provider {
            StorageProvider::Memory => Self::in_memory(name),
            StorageProvider::Local => {
                let root = config.root.as_deref().ok_or_else(|| {
                    StorageError::InvalidConfig(format!("storage '{name}' has no root"))
                })?;
                Self::local(name, root, &config.base_path)?
            }
            StorageProvider::S3 => {
                let bucket = config.bucket.as_deref().ok_or_else(|| {
                    StorageError::InvalidConfig(format!("storage '{name}' has no bucket"))
                })?;
                let mut builder = AmazonS3Builder::new().with_bucket_name(bucket);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                if let Some(key) = &config.access_key {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = &config.secret_key {
                    builder = builder.with_secret_access_key(secret);
                }
                Self::new(name, Arc::new(builder.build()?), &config.base_path)
            }
        };

        info!(storage = name, provider = ?config.provider, stream = config.stream, "Storage ready");
        Ok(storage.with_stream(config.stream))
    }

    /// Toggle whether this storage accepts live pipes
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    fn location(&self, path: &str) -> StoragePath {
        StoragePath::from(self.join_storage_path(path))
    }

    /// Strip the base prefix so listed paths round-trip through `open_file`
    fn relative(&self, location: &StoragePath) -> String {
        let full = location.as_ref();
        if self.base_path.is_empty() {
            return full.to_string();
        }
        full.strip_prefix(&self.base_path)
            .map(|rest| rest.trim_start_matches('/').to_string())
            .unwrap_or_else(|| full.to_string())
    }
}

#[async_trait]
impl Storage for ObjectStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn join_storage_path(&self, path: &str) -> String {
        join_path(&self.base_path, path)
    }

    fn can_stream(&self) -> bool {
        self.stream
    }

    async fn save(&self, mut reader: BoxReader, path: &str, size_hint: Option<u64>) -> Result<u64> {
        let location = self.location(path);
        let mut writer = BufWriter::new(Arc::clone(&self.store), location.clone());

        let written = match tokio::io::copy(&mut reader, &mut writer).await {
            Ok(n) => n,
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    warn!(storage = %self.name, %location, error = %abort_err, "Failed to abort upload");
                }
                return Err(e.into());
            }
        };
        writer.shutdown().await?;

        if let Some(expected) = size_hint {
            if expected != written {
                warn!(storage = %self.name, %location, expected, written, "Size mismatch after upload");
            }
        }

        debug!(storage = %self.name, %location, size = written, "Uploaded to storage");
        Ok(written)
    }

    async fn exists(&self, path: &str) -> bool {
        match self.store.head(&self.location(path)).await {
            Ok(_) => true,
            Err(object_store::Error::NotFound { .. }) => false,
            Err(e) => {
                warn!(storage = %self.name, path, error = %e, "Exists check failed");
                false
            }
        }
    }

    fn as_readable(&self) -> Option<&dyn ReadableStorage> {
        Some(self)
    }

    fn as_listable(&self) -> Option<&dyn ListableStorage> {
        Some(self)
    }
}

#[async_trait]
impl ReadableStorage for ObjectStorage {
    async fn open_file(&self, path: &str) -> Result<(BoxReader, u64)> {
        let location = self.location(path);
        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(location.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let size = result.meta.size;
        let stream = result.into_stream().map_err(io::Error::other);
        debug!(storage = %self.name, %location, size, "Opened object for reading");

        Ok((Box::new(StreamReader::new(stream)), size))
    }
}

#[async_trait]
impl ListableStorage for ObjectStorage {
    async fn list_files(&self, dir: &str) -> Result<Vec<FileInfo>> {
        let full = self.join_storage_path(dir);
        let prefix = (!full.is_empty()).then(|| StoragePath::from(full));
        let listing = self.store.list_with_delimiter(prefix.as_ref()).await?;

        let dirs = listing.common_prefixes.iter().map(|p| FileInfo {
            name: p.filename().unwrap_or_default().to_string(),
            path: self.relative(p),
            size: 0,
            is_dir: true,
            modified: None,
        });
        let files = listing.objects.iter().map(|meta| FileInfo {
            name: meta.location.filename().unwrap_or_default().to_string(),
            path: self.relative(&meta.location),
            size: meta.size,
            is_dir: false,
            modified: Some(meta.last_modified),
        });

        Ok(dirs.chain(files).collect())
    }
}
