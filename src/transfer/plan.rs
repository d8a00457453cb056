//! Source enumeration: turning a request into transfer elements

use super::element::{Destination, TransferElement};
use super::error::Result;
use crate::storage::{Storage, StorageError, join_path};
use crate::worker::http::HttpClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// One element per link; names and sizes are probed at execution time
pub fn direct_links(
    client: &Arc<HttpClient>,
    urls: &[String],
    storage: &Arc<dyn Storage>,
    dir: &str,
) -> Vec<TransferElement> {
    urls.iter()
        .map(|url| TransferElement::from_url(Arc::clone(client), url.as_str(), Arc::clone(storage), dir))
        .collect()
}

/// Walk `source_dir` on a listable storage and mirror it under `target_dir`
pub async fn storage_transfer(
    source: &Arc<dyn Storage>,
    source_dir: &str,
    target: &Arc<dyn Storage>,
    target_dir: &str,
) -> Result<Vec<TransferElement>> {
    let listable = source.as_listable().ok_or_else(|| StorageError::Unsupported {
        storage: source.name().to_string(),
        capability: "listing",
    })?;
    if source.as_readable().is_none() {
        return Err(StorageError::Unsupported {
            storage: source.name().to_string(),
            capability: "reading",
        }
        .into());
    }

    let root = join_path(source_dir, "");
    let mut elements = Vec::new();
    let mut dirs = vec![root.clone()];

    while let Some(dir) = dirs.pop() {
        for entry in listable.list_files(&dir).await? {
            if entry.is_dir {
                dirs.push(entry.path);
                continue;
            }
            let relative = entry
                .path
                .strip_prefix(&root)
                .unwrap_or(&entry.path)
                .trim_start_matches('/');
            elements.push(TransferElement::from_storage(
                Arc::clone(source),
                entry.path.as_str(),
                entry.size,
                Arc::clone(target),
                join_path(target_dir, relative),
            ));
        }
    }

    debug!(source = source.name(), dir = source_dir, files = elements.len(), "Planned storage transfer");
    Ok(elements)
}

/// Walk a local directory and mirror it under `target_dir`
pub async fn local_import(
    local_dir: &Path,
    target: &Arc<dyn Storage>,
    target_dir: &str,
) -> Result<Vec<TransferElement>> {
    let mut elements = Vec::new();
    let mut dirs: Vec<PathBuf> = vec![local_dir.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                dirs.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let relative = path
                .strip_prefix(local_dir)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let size = entry.metadata().await?.len();
            let name = entry.file_name().to_string_lossy().into_owned();

            elements.push(
                TransferElement::from_local_file(
                    path,
                    Arc::clone(target),
                    Destination::File(join_path(target_dir, &relative)),
                )
                .with_name(name)
                .with_size(size),
            );
        }
    }

    debug!(dir = %local_dir.display(), files = elements.len(), "Planned local import");
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BoxReader, ObjectStorage};

    fn reader(data: &'static [u8]) -> BoxReader {
        Box::new(data)
    }

    #[tokio::test]
    async fn test_storage_transfer_walks_recursively() {
        let source: Arc<dyn Storage> = Arc::new(ObjectStorage::in_memory("src"));
        let target: Arc<dyn Storage> = Arc::new(ObjectStorage::in_memory("dst"));
        source.save(reader(b"a"), "photos/a.jpg", None).await.unwrap();
        source.save(reader(b"bb"), "photos/2024/b.jpg", None).await.unwrap();
        source.save(reader(b"c"), "other/c.jpg", None).await.unwrap();

        let elements = storage_transfer(&source, "photos", &target, "backup").await.unwrap();
        let mut dests: Vec<String> = elements.iter().map(|e| e.dest_path().unwrap()).collect();
        dests.sort();

        assert_eq!(dests, vec!["backup/2024/b.jpg", "backup/a.jpg"]);
        assert_eq!(elements.iter().filter_map(TransferElement::size).sum::<u64>(), 3);
    }

    #[tokio::test]
    async fn test_local_import() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("one.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("sub/two.txt"), b"22").unwrap();

        let target: Arc<dyn Storage> = Arc::new(ObjectStorage::in_memory("dst"));
        let elements = local_import(dir.path(), &target, "in").await.unwrap();
        let mut dests: Vec<String> = elements.iter().map(|e| e.dest_path().unwrap()).collect();
        dests.sort();

        assert_eq!(dests, vec!["in/one.txt", "in/sub/two.txt"]);
        assert!(elements.iter().all(|e| !e.needs_probe()));
    }
}
