//! Data movement for a single element
//!
//! Stream mode pipes the source straight into `Storage::save`. Buffered mode
//! lands the source in a scoped temp file first, then saves it with retries.

use super::element::TransferElement;
use super::error::{Result, TransferError};
use super::io::ProgressReader;
use super::naming::has_extension;
use super::sniff;
use super::task::TransferTask;
use crate::storage::{BoxReader, StorageError};
use bytes::Bytes;
use futures_util::stream;
use std::io;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Chunk = io::Result<Bytes>;

impl TransferTask {
    async fn open_source(
        &self,
        element: &TransferElement,
        token: &CancellationToken,
    ) -> Result<(BoxReader, Option<u64>)> {
        tokio::select! {
            r = element.open() => r,
            _ = token.cancelled() => Err(TransferError::Cancelled),
        }
    }

    /// Learn a size reported by the source if the element had none
    fn adopt_size(&self, element: &TransferElement, size: Option<u64>) {
        if let Some(size) = size {
            if element.learn_size(size) {
                self.add_total(size);
            }
        }
    }

    pub(super) async fn stream_element(
        &self,
        element: &TransferElement,
        path: &str,
        token: &CancellationToken,
    ) -> Result<()> {
        let (reader, size) = self.open_source(element, token).await?;
        self.adopt_size(element, size);

        let (tx, rx) = mpsc::channel::<Chunk>(self.settings().pipe_depth);
        let pipe: BoxReader = Box::new(StreamReader::new(Box::pin(stream::unfold(
            rx,
            |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) },
        ))));

        let pump = self.pump(element, reader, tx);
        let save = async {
            element
                .storage()
                .save(pipe, path, element.size())
                .await
                .map_err(|source| TransferError::Write {
                    element: element.display_name().to_string(),
                    source,
                })
        };

        // Whichever side fails first drops the other, which closes the pipe
        let both = async { tokio::try_join!(pump, save) };
        let (_, written) = tokio::select! {
            r = both => r?,
            _ = token.cancelled() => return Err(TransferError::Cancelled),
        };

        debug!(element = element.display_name(), path, written, "Streamed element");
        Ok(())
    }

    /// Copy the source into the pipe, counting progress on the way
    async fn pump(
        &self,
        element: &TransferElement,
        reader: BoxReader,
        tx: mpsc::Sender<Chunk>,
    ) -> Result<()> {
        let mut reader = ProgressReader::new(reader, |n| self.record_progress(n));
        let mut buf = vec![0u8; self.settings().copy_buffer];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) => {
                    // Hand the read error to `save`; a send failure means it is
                    // already gone, and `try_join!` drops it on our error anyway
                    tx.send(Err(io::Error::new(e.kind(), e.to_string()))).await.ok();
                    return Err(TransferError::Read {
                        element: element.display_name().to_string(),
                        source: e,
                    });
                }
            };

            if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                return Err(TransferError::Write {
                    element: element.display_name().to_string(),
                    source: StorageError::UploadFailed("destination closed the pipe".to_string()),
                });
            }
        }
    }

    pub(super) async fn buffer_element(
        &self,
        element: &TransferElement,
        mut path: String,
        token: &CancellationToken,
    ) -> Result<()> {
        // Removed from disk when dropped, whichever way this function exits
        let temp = self.create_temp(element)?;

        let (reader, size) = self.open_source(element, token).await?;
        self.adopt_size(element, size);

        let downloaded = {
            let mut reader = ProgressReader::new(reader, |n| self.record_progress(n));
            let mut file = tokio::fs::File::from_std(temp.reopen()?);
            let copied = tokio::select! {
                r = tokio::io::copy(&mut reader, &mut file) => r.map_err(|source| TransferError::Read {
                    element: element.display_name().to_string(),
                    source,
                })?,
                _ = token.cancelled() => return Err(TransferError::Cancelled),
            };
            file.flush().await?;
            copied
        };
        self.adopt_size(element, Some(downloaded));

        if !has_extension(element.display_name()) {
            if let Some(ext) = sniff::sniff_file(temp.path()).await? {
                debug!(element = element.display_name(), ext, "Detected file type");
                path = format!("{path}.{ext}");
            }
        }

        let storage = element.storage();
        let written = self
            .settings()
            .retry
            .run(token, element.display_name(), |attempt| {
                let path = path.as_str();
                let temp_path = temp.path();
                async move {
                    debug!(element = element.display_name(), attempt, "Saving buffered element");
                    let file = tokio::fs::File::open(temp_path).await?;
                    storage.save(Box::new(file), path, Some(downloaded)).await
                }
            })
            .await?;

        debug!(element = element.display_name(), %path, written, "Saved buffered element");
        Ok(())
    }

    fn create_temp(&self, element: &TransferElement) -> Result<NamedTempFile> {
        let dir = &self.settings().temp_dir;
        std::fs::create_dir_all(dir)?;
        let temp = tempfile::Builder::new()
            .prefix(&format!("{}_", element.id()))
            .tempfile_in(dir)?;
        Ok(temp)
    }
}
