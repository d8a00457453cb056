//! Generic transfer engine
//!
//! A [`TransferTask`] owns a list of [`TransferElement`]s and moves them
//! into their destination storages with bounded concurrency. Each element
//! runs either a streaming pipeline or a temp-file buffered pipeline with
//! retried saves, and reports progress to a [`ProgressTracker`].

pub mod element;
pub mod error;
mod io;
pub mod naming;
mod pipeline;
pub mod plan;
pub mod progress;
pub mod retry;
pub mod sniff;
mod task;

pub use element::{Destination, Discovered, ElementSource, TransferElement};
pub use error::{Result, TransferError};
pub use io::ProgressReader;
pub use progress::{LogProgress, NoopProgress, ProgressTracker, Throttled, TransferInfo};
pub use retry::RetryPolicy;
pub use task::{EngineSettings, TaskKind, TransferTask};
