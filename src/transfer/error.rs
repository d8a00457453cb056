use crate::storage::StorageError;
use crate::worker::http::DownloadError;
use std::any::Any;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Read failed for {element}: {source}")]
    Read {
        element: String,
        #[source]
        source: io::Error,
    },

    #[error("Write failed for {element}: {source}")]
    Write {
        element: String,
        #[source]
        source: StorageError,
    },

    #[error("Giving up on {element} after {attempts} attempts: {source}")]
    RetryExhausted {
        element: String,
        attempts: u32,
        #[source]
        source: StorageError,
    },

    #[error("Element {0} is already being processed")]
    AlreadyProcessing(String),

    #[error("Source of {0} was already consumed")]
    SourceConsumed(String),

    #[error("Probe failed for {element}: {reason}")]
    Probe { element: String, reason: String },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    /// True when the error only reflects a cancellation request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }

    /// Wrap a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        TransferError::Panicked(message)
    }
}
