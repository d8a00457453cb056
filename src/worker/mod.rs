//! Task execution
//!
//! A fixed pool of workers drains the task queue and runs each task's
//! `execute` under the entry's cancellation token.

pub mod http;
mod scheduler;

pub use scheduler::Scheduler;

use crate::transfer::TransferError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Anything the scheduler can run
#[async_trait]
pub trait Executable: Send + Sync {
    fn id(&self) -> &str;

    fn title(&self) -> &str;

    /// Run to completion, returning promptly once `token` is cancelled
    async fn execute(&self, token: CancellationToken) -> Result<(), TransferError>;
}
