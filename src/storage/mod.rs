//! Storage abstraction for transfer destinations and sources
//!
//! Every backend implements [`Storage`]. Optional capabilities are exposed
//! through accessor methods instead of separate marker types:
//! - `can_stream() == false` forces buffered transfers
//! - `as_readable()` / `as_listable()` back storage-to-storage transfers

mod object;
mod registry;

pub use object::ObjectStorage;
pub use registry::StorageRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage '{storage}' does not support {capability}")]
    Unsupported {
        storage: String,
        capability: &'static str,
    },

    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Owned, type-erased byte source handed to `save`
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Entry returned by directory listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    /// Path relative to the storage root, usable with `open_file`
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
}

/// A named destination that accepts byte streams
///
/// Implementations must tolerate concurrent `save` calls to distinct paths.
/// Cancellation is expressed by dropping the `save` future.
#[async_trait]
pub trait Storage: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve a caller path to the backend's full location string
    fn join_storage_path(&self, path: &str) -> String;

    /// Whether `save` may be fed from a live pipe
    fn can_stream(&self) -> bool {
        true
    }

    /// Consume `reader` into `path`, returning the number of bytes written
    async fn save(&self, reader: BoxReader, path: &str, size_hint: Option<u64>) -> Result<u64>;

    async fn exists(&self, path: &str) -> bool;

    fn as_readable(&self) -> Option<&dyn ReadableStorage> {
        None
    }

    fn as_listable(&self) -> Option<&dyn ListableStorage> {
        None
    }
}

#[async_trait]
pub trait ReadableStorage: Send + Sync {
    /// Open `path` for reading, returning the reader and the object size
    async fn open_file(&self, path: &str) -> Result<(BoxReader, u64)>;
}

#[async_trait]
pub trait ListableStorage: Send + Sync {
    /// Direct children of `dir`, directories included
    async fn list_files(&self, dir: &str) -> Result<Vec<FileInfo>>;
}

/// Join path fragments with `/`, dropping empty segments
pub fn join_path(base: &str, path: &str) -> String {
    base.split('/')
        .chain(path.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a/b.txt"), "a/b.txt");
        assert_eq!(join_path("root/", "/a//b.txt"), "root/a/b.txt");
        assert_eq!(join_path("root", ""), "root");
    }
}
