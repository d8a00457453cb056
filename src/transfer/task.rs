use super::element::{Destination, TransferElement};
use super::error::{Result, TransferError};
use super::progress::{NoopProgress, ProgressTracker, TransferInfo};
use super::retry::RetryPolicy;
use crate::config::EngineConfig;
use crate::observability::Metrics;
use crate::worker::Executable;
use async_trait::async_trait;
use bon::bon;
use futures_util::FutureExt;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Source enumeration that produced a task; shown in titles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    File,
    Batch,
    DirectLinks,
    Transfer,
    Import,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::File => "file",
            TaskKind::Batch => "batch",
            TaskKind::DirectLinks => "links",
            TaskKind::Transfer => "transfer",
            TaskKind::Import => "import",
        })
    }
}

/// Engine knobs, read once when a task is built
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Elements moved concurrently inside one task
    pub workers: usize,
    /// Global stream switch; storages may still refuse
    pub stream: bool,
    pub temp_dir: PathBuf,
    pub retry: RetryPolicy,
    /// Chunk size for the stream-mode pump
    pub copy_buffer: usize,
    /// Chunks buffered between pump and upload
    pub pipe_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            stream: config.stream,
            temp_dir: config.temp.base_path.clone(),
            retry: RetryPolicy {
                max_attempts: config.retry.max(1),
                backoff: Duration::from_millis(config.retry_backoff_ms),
            },
            copy_buffer: config.copy_buffer.as_usize().max(1),
            pipe_depth: config.pipe_depth.max(1),
        }
    }
}

#[derive(Default)]
struct TaskState {
    /// id → name of elements currently moving
    processing: HashMap<String, String>,
    /// id → (name, error) of elements skipped under ignore-errors
    failed: BTreeMap<String, (String, TransferError)>,
}

/// A set of elements moved under one concurrency limit and error policy
///
/// Counters, the processing set and the failure map are mutated only by
/// this task's own `execute`.
pub struct TransferTask {
    id: String,
    kind: TaskKind,
    title: String,
    elements: Vec<TransferElement>,
    settings: EngineSettings,
    ignore_errors: bool,
    progress: Arc<dyn ProgressTracker>,
    metrics: Option<Arc<Metrics>>,
    total_bytes: AtomicU64,
    transferred: AtomicU64,
    state: Mutex<TaskState>,
}

#[bon]
impl TransferTask {
    #[builder]
    pub fn new(
        #[builder(into)] id: String,
        kind: TaskKind,
        elements: Vec<TransferElement>,
        #[builder(default)] settings: EngineSettings,
        #[builder(default)] ignore_errors: bool,
        progress: Option<Arc<dyn ProgressTracker>>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let title = make_title(kind, &elements);
        let total = elements.iter().filter_map(TransferElement::size).sum();

        Self {
            id,
            kind,
            title,
            elements,
            settings,
            ignore_errors,
            progress: progress.unwrap_or_else(|| Arc::new(NoopProgress)),
            metrics,
            total_bytes: AtomicU64::new(total),
            transferred: AtomicU64::new(0),
            state: Mutex::new(TaskState::default()),
        }
    }
}

impl TransferTask {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn elements(&self) -> &[TransferElement] {
        &self.elements
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn ignore_errors(&self) -> bool {
        self.ignore_errors
    }

    /// Failed element names paired with their error messages
    pub fn failures(&self) -> Vec<(String, String)> {
        self.state()
            .failed
            .values()
            .map(|(name, err)| (name.clone(), err.to_string()))
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count freshly moved bytes and notify the tracker
    pub(super) fn record_progress(&self, n: usize) {
        let n = n as u64;
        self.transferred.fetch_add(n, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.bytes_transferred(n);
        }
        self.progress.on_progress(self);
    }

    /// Grow the total once an element's size is learned late
    pub(super) fn add_total(&self, n: u64) {
        self.total_bytes.fetch_add(n, Ordering::Relaxed);
    }

    fn register(&self, element: &TransferElement) -> Result<ProcessingGuard<'_>> {
        let mut state = self.state();
        if state.processing.contains_key(element.id()) {
            return Err(TransferError::AlreadyProcessing(element.id().to_string()));
        }
        state
            .processing
            .insert(element.id().to_string(), element.display_name().to_string());
        Ok(ProcessingGuard {
            task: self,
            id: element.id().to_string(),
        })
    }

    fn record_failure(&self, element: &TransferElement, error: TransferError) {
        warn!(
            task_id = %self.id,
            element = element.display_name(),
            error = %error,
            "Element failed, continuing"
        );
        if let Some(metrics) = &self.metrics {
            metrics.element_failed();
        }
        self.state().failed.insert(
            element.id().to_string(),
            (element.display_name().to_string(), error),
        );
    }

    /// Fill in unknown sizes and names before any data moves
    async fn probe_elements(&self, token: &CancellationToken) -> Result<()> {
        let pending: Vec<&TransferElement> =
            self.elements.iter().filter(|e| e.needs_probe()).collect();
        if pending.is_empty() {
            return Ok(());
        }
        debug!(task_id = %self.id, count = pending.len(), "Probing elements");

        let probes = stream::iter(pending.into_iter().map(Ok)).try_for_each_concurrent(
            self.settings.workers,
            |element| async move {
                let found = element.probe().await.map_err(|e| TransferError::Probe {
                    element: element.display_name().to_string(),
                    reason: e.to_string(),
                })?;
                if let Some(size) = found.size {
                    element.learn_size(size);
                }
                if let Some(name) = found.name {
                    element.learn_name(name);
                }
                if element.name().is_none() {
                    return Err(TransferError::Probe {
                        element: element.display_name().to_string(),
                        reason: "no file name found".to_string(),
                    });
                }
                Ok(())
            },
        );

        tokio::select! {
            r = probes => r?,
            _ = token.cancelled() => return Err(TransferError::Cancelled),
        }

        let total = self.elements.iter().filter_map(TransferElement::size).sum();
        self.total_bytes.store(total, Ordering::Relaxed);
        Ok(())
    }

    /// Move every element with bounded concurrency
    async fn fan_out(&self, token: &CancellationToken) -> Result<()> {
        let group = token.child_token();
        let pending: Vec<_> = self
            .elements
            .iter()
            .map(|element| self.process(element, &group))
            .collect();
        let mut results = stream::iter(pending).buffer_unordered(self.settings.workers);

        let mut first_error = None;
        while let Some(result) = results.next().await {
            if let Err(e) = result {
                if first_error.is_none() {
                    // First failure wins; siblings see the group token and unwind
                    group.cancel();
                    first_error = Some(e);
                }
            }
        }

        if token.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// One element, with the ignore-errors policy applied
    async fn process(&self, element: &TransferElement, group: &CancellationToken) -> Result<()> {
        match self.transfer(element, group).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() || !self.ignore_errors => Err(e),
            Err(e) => {
                self.record_failure(element, e);
                Ok(())
            }
        }
    }

    async fn transfer(&self, element: &TransferElement, group: &CancellationToken) -> Result<()> {
        if group.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let _guard = self.register(element)?;
        let path = element.dest_path()?;

        if self.settings.stream && element.storage().can_stream() {
            debug!(task_id = %self.id, element = element.display_name(), %path, "Streaming element");
            self.stream_element(element, &path, group).await
        } else {
            debug!(task_id = %self.id, element = element.display_name(), %path, "Buffering element");
            self.buffer_element(element, path, group).await
        }
    }

    async fn run(&self, token: &CancellationToken) -> Result<()> {
        self.probe_elements(token).await?;
        self.fan_out(token).await
    }
}

/// Removes an element from the processing set when dropped
struct ProcessingGuard<'a> {
    task: &'a TransferTask,
    id: String,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.task.state().processing.remove(&self.id);
    }
}

#[async_trait]
impl Executable for TransferTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    async fn execute(&self, token: CancellationToken) -> Result<()> {
        info!(task_id = %self.id, kind = %self.kind, files = self.elements.len(), "Executing task");
        let started = async {
            self.progress.on_start(self);
            self.run(&token).await
        };

        let result = match AssertUnwindSafe(started).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(TransferError::from_panic(payload)),
        };
        let result = match result {
            Err(e @ TransferError::Panicked(_)) => Err(e),
            Err(e) if token.is_cancelled() && !e.is_cancelled() => {
                debug!(task_id = %self.id, error = %e, "Error raced with cancellation");
                Err(TransferError::Cancelled)
            }
            other => other,
        };

        self.progress.on_done(self, result.as_ref().err());
        result
    }
}

impl TransferInfo for TransferTask {
    fn task_id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    fn transferred_bytes(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    fn total_files(&self) -> usize {
        self.elements.len()
    }

    fn processing(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().processing.values().cloned().collect();
        names.sort();
        names
    }

    fn failed_files(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state()
            .failed
            .values()
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferTask")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("elements", &self.elements.len())
            .field("ignore_errors", &self.ignore_errors)
            .finish()
    }
}

fn make_title(kind: TaskKind, elements: &[TransferElement]) -> String {
    let Some(first) = elements.first() else {
        return format!("[{kind}](empty)");
    };

    let label = match elements.len() {
        1 => first.display_name().to_string(),
        n => format!("{} +{} more", first.display_name(), n - 1),
    };
    let dest = match first.destination() {
        Destination::File(path) => path.as_str(),
        Destination::Dir(dir) => dir.as_str(),
    };
    format!("[{kind}]({label} -> {}:{dest})", first.storage().name())
}
