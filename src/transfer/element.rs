//! One source to destination unit of work

use super::error::{Result, TransferError};
use crate::storage::{BoxReader, Storage, StorageError, join_path};
use crate::worker::http::HttpClient;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use uuid::Uuid;

/// Where an element's bytes come from
pub enum ElementSource {
    /// A handle already in hand; readable exactly once
    Reader(Mutex<Option<BoxReader>>),
    /// A direct link fetched with GET
    Http { client: Arc<HttpClient>, url: String },
    /// A file on a readable storage
    Storage { storage: Arc<dyn Storage>, path: String },
    /// A file on the local filesystem
    LocalFile(PathBuf),
}

impl ElementSource {
    pub fn reader(reader: BoxReader) -> Self {
        ElementSource::Reader(Mutex::new(Some(reader)))
    }

    fn kind(&self) -> &'static str {
        match self {
            ElementSource::Reader(_) => "reader",
            ElementSource::Http { .. } => "http",
            ElementSource::Storage { .. } => "storage",
            ElementSource::LocalFile(_) => "local",
        }
    }
}

impl fmt::Debug for ElementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementSource::Reader(_) => f.write_str("Reader"),
            ElementSource::Http { url, .. } => f.debug_struct("Http").field("url", url).finish(),
            ElementSource::Storage { storage, path } => f
                .debug_struct("Storage")
                .field("storage", &storage.name())
                .field("path", path)
                .finish(),
            ElementSource::LocalFile(path) => f.debug_tuple("LocalFile").field(path).finish(),
        }
    }
}

/// Destination inside the target storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Exact path, name included
    File(String),
    /// Directory; the element's name is appended once known
    Dir(String),
}

/// Metadata a probe learned about a source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    pub size: Option<u64>,
    pub name: Option<String>,
}

pub struct TransferElement {
    id: String,
    name: OnceLock<String>,
    size: OnceLock<u64>,
    source: ElementSource,
    storage: Arc<dyn Storage>,
    destination: Destination,
}

impl TransferElement {
    pub fn new(source: ElementSource, storage: Arc<dyn Storage>, destination: Destination) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: OnceLock::new(),
            size: OnceLock::new(),
            source,
            storage,
            destination,
        }
    }

    /// Element over an already-open reader
    pub fn from_reader(
        reader: BoxReader,
        name: impl Into<String>,
        size: u64,
        storage: Arc<dyn Storage>,
        dir: &str,
    ) -> Self {
        Self::new(ElementSource::reader(reader), storage, Destination::Dir(dir.to_string()))
            .with_name(name)
            .with_size(size)
    }

    /// Element over a direct link; size and name come from a probe
    pub fn from_url(client: Arc<HttpClient>, url: impl Into<String>, storage: Arc<dyn Storage>, dir: &str) -> Self {
        let source = ElementSource::Http {
            client,
            url: url.into(),
        };
        Self::new(source, storage, Destination::Dir(dir.to_string()))
    }

    /// Element copying `path` from one storage to an exact destination path
    pub fn from_storage(
        source: Arc<dyn Storage>,
        path: impl Into<String>,
        size: u64,
        target: Arc<dyn Storage>,
        dest_path: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Self::new(
            ElementSource::Storage {
                storage: source,
                path,
            },
            target,
            Destination::File(dest_path.into()),
        )
        .with_name(name)
        .with_size(size)
    }

    /// Element over a local file; size and name come from a probe
    pub fn from_local_file(path: impl Into<PathBuf>, storage: Arc<dyn Storage>, dest: Destination) -> Self {
        Self::new(ElementSource::LocalFile(path.into()), storage, dest)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.learn_name(name);
        self
    }

    pub fn with_size(self, size: u64) -> Self {
        self.learn_size(size);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }

    /// Name for logs and failure reports; falls back to the id
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(&self.id)
    }

    pub fn size(&self) -> Option<u64> {
        self.size.get().copied()
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn source(&self) -> &ElementSource {
        &self.source
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Record the size if still unknown; returns whether it was stored
    pub fn learn_size(&self, size: u64) -> bool {
        self.size.set(size).is_ok()
    }

    pub fn learn_name(&self, name: impl Into<String>) -> bool {
        self.name.set(name.into()).is_ok()
    }

    pub fn needs_probe(&self) -> bool {
        self.size.get().is_none() || self.name.get().is_none()
    }

    /// Path inside the destination storage
    pub fn dest_path(&self) -> Result<String> {
        match &self.destination {
            Destination::File(path) => Ok(path.clone()),
            Destination::Dir(dir) => {
                let name = self.name().ok_or_else(|| TransferError::Probe {
                    element: self.id.clone(),
                    reason: "file name unknown".to_string(),
                })?;
                Ok(join_path(dir, name))
            }
        }
    }

    /// Ask the source for metadata without moving data
    pub async fn probe(&self) -> Result<Discovered> {
        match &self.source {
            ElementSource::Http { client, url } => {
                let probe = client.probe(url).await?;
                Ok(Discovered {
                    size: probe.size,
                    name: probe.filename,
                })
            }
            ElementSource::LocalFile(path) => {
                let meta = tokio::fs::metadata(path).await?;
                Ok(Discovered {
                    size: Some(meta.len()),
                    name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
                })
            }
            ElementSource::Reader(_) | ElementSource::Storage { .. } => Ok(Discovered::default()),
        }
    }

    /// Open the source for reading, returning its advertised length
    pub async fn open(&self) -> Result<(BoxReader, Option<u64>)> {
        match &self.source {
            ElementSource::Reader(slot) => {
                let reader = slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .ok_or_else(|| TransferError::SourceConsumed(self.display_name().to_string()))?;
                Ok((reader, self.size()))
            }
            ElementSource::Http { client, url } => Ok(client.open(url).await?),
            ElementSource::Storage { storage, path } => {
                let readable = storage.as_readable().ok_or_else(|| StorageError::Unsupported {
                    storage: storage.name().to_string(),
                    capability: "reading",
                })?;
                let (reader, size) = readable.open_file(path).await?;
                Ok((reader, Some(size)))
            }
            ElementSource::LocalFile(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|source| TransferError::Read {
                    element: self.display_name().to_string(),
                    source,
                })?;
                let size = file.metadata().await?.len();
                Ok((Box::new(file), Some(size)))
            }
        }
    }
}

impl fmt::Debug for TransferElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferElement")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("size", &self.size())
            .field("source", &self.source.kind())
            .field("storage", &self.storage.name())
            .field("destination", &self.destination)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ObjectStorage;
    use tokio::io::AsyncReadExt;

    fn memory() -> Arc<dyn Storage> {
        Arc::new(ObjectStorage::in_memory("mem"))
    }

    #[test]
    fn test_size_is_set_once() {
        let element = TransferElement::from_reader(Box::new(&b""[..]), "a.txt", 10, memory(), "dir");
        assert!(!element.learn_size(20));
        assert_eq!(element.size(), Some(10));
        assert!(!element.needs_probe());
    }

    #[test]
    fn test_dest_path_for_dir() {
        let element = TransferElement::from_reader(Box::new(&b""[..]), "a.txt", 0, memory(), "in/box");
        assert_eq!(element.dest_path().unwrap(), "in/box/a.txt");
    }

    #[test]
    fn test_dest_path_without_name() {
        let element = TransferElement::new(
            ElementSource::LocalFile(PathBuf::from("/nope")),
            memory(),
            Destination::Dir("d".into()),
        );
        assert!(element.needs_probe());
        assert!(matches!(element.dest_path(), Err(TransferError::Probe { .. })));
    }

    #[tokio::test]
    async fn test_reader_source_is_single_use() {
        let element = TransferElement::from_reader(Box::new(&b"abc"[..]), "a.txt", 3, memory(), "");

        let (mut reader, size) = element.open().await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(size, Some(3));

        assert!(matches!(element.open().await, Err(TransferError::SourceConsumed(_))));
    }

    #[tokio::test]
    async fn test_local_file_probe() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"12345").unwrap();

        let element = TransferElement::from_local_file(&path, memory(), Destination::Dir("x".into()));
        let found = element.probe().await.unwrap();
        assert_eq!(found.size, Some(5));
        assert_eq!(found.name.as_deref(), Some("photo.jpg"));
    }

    #[test]
    fn test_storage_element_name() {
        let element = TransferElement::from_storage(memory(), "a/b/c.bin", 4, memory(), "z/c.bin");
        assert_eq!(element.name(), Some("c.bin"));
        assert_eq!(element.dest_path().unwrap(), "z/c.bin");
    }
}
