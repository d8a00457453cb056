use super::Executable;
use crate::config::SchedulerConfig;
use crate::observability::Metrics;
use crate::queue::{QueueEntry, QueueError, TaskInfo, TaskQueue};
use crate::transfer::TransferError;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type Job = Arc<dyn Executable>;

/// Fixed worker pool over one task queue
///
/// Workers loop `get → execute → done` until the queue is closed. Each
/// `execute` runs in its own spawned task so a panic is reported as a
/// failure instead of taking the worker down.
pub struct Scheduler {
    queue: Arc<TaskQueue<Job>>,
    metrics: Arc<Metrics>,
    stop: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn the workers and the cleanup sweep; requires a Tokio runtime
    pub fn start(config: &SchedulerConfig, metrics: Arc<Metrics>) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let stop = CancellationToken::new();
        let concurrency = config.concurrency.max(1);

        let mut handles: Vec<JoinHandle<()>> = (0..concurrency)
            .map(|worker| {
                tokio::spawn(worker_loop(worker, Arc::clone(&queue), Arc::clone(&metrics)))
            })
            .collect();

        if config.cleanup_interval_secs > 0 {
            handles.push(tokio::spawn(sweep_loop(
                Arc::clone(&queue),
                Duration::from_secs(config.cleanup_interval_secs),
                stop.clone(),
            )));
        }

        info!(concurrency, cleanup_interval_secs = config.cleanup_interval_secs, "Scheduler started");

        Self {
            queue,
            metrics,
            stop,
            handles: Mutex::new(handles),
        }
    }

    /// Queue a task whose token is a child of `parent`
    pub fn submit(&self, parent: &CancellationToken, task: Job) -> Result<(), QueueError> {
        let id = task.id().to_string();
        let title = task.title().to_string();
        self.queue.add(QueueEntry::with_parent(id.clone(), title, task, parent))?;
        self.metrics.task_submitted();
        debug!(task_id = %id, "Task submitted");
        Ok(())
    }

    pub fn cancel(&self, id: &str) -> Result<(), QueueError> {
        self.queue.cancel_task(id)
    }

    /// Unlink a task that has not started yet
    pub fn remove(&self, id: &str) -> Result<(), QueueError> {
        self.queue.remove_task(id)
    }

    pub fn list_queued(&self) -> Vec<TaskInfo> {
        self.queue.queued_tasks()
    }

    pub fn list_running(&self) -> Vec<TaskInfo> {
        self.queue.running_tasks()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.length()
    }

    pub fn active_len(&self) -> usize {
        self.queue.active_length()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Stop accepting work, cancel everything and wait for the workers
    pub async fn shutdown(&self) {
        self.queue.close();
        let dropped = self.queue.clear();
        for task in self.queue.running_tasks() {
            let _ = self.queue.cancel_task(&task.id);
        }
        self.stop.cancel();

        let handles = {
            let mut guard = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker ended abnormally");
            }
        }
        info!(dropped, "Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.queue.close();
        self.stop.cancel();
    }
}

async fn worker_loop(worker: usize, queue: Arc<TaskQueue<Job>>, metrics: Arc<Metrics>) {
    loop {
        let entry = match queue.get().await {
            Ok(entry) => entry,
            Err(QueueError::ClosedEmpty) => break,
            Err(e) => {
                warn!(worker, error = %e, "Unexpected queue error");
                break;
            }
        };

        let task = Arc::clone(entry.payload());
        let token = entry.token().clone();
        info!(worker, task_id = %entry.id(), title = entry.title(), "Task started");

        let outcome = match tokio::spawn(async move { task.execute(token).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TransferError::from_panic(e.into_panic())),
            Err(_) => Err(TransferError::Cancelled),
        };

        match outcome {
            Ok(()) => {
                metrics.task_completed();
                info!(worker, task_id = %entry.id(), "Task completed");
            }
            Err(e) if e.is_cancelled() => {
                metrics.task_cancelled();
                info!(worker, task_id = %entry.id(), "Task cancelled");
            }
            Err(e @ TransferError::Panicked(_)) => {
                metrics.task_failed();
                error!(worker, task_id = %entry.id(), error = %e, "Task panicked");
            }
            Err(e) => {
                metrics.task_failed();
                warn!(worker, task_id = %entry.id(), error = %e, "Task failed");
            }
        }

        queue.done(entry.id());
    }

    debug!(worker, "Worker stopped");
}

async fn sweep_loop(queue: Arc<TaskQueue<Job>>, every: Duration, stop: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                queue.cleanup_cancelled();
            }
            _ = stop.cancelled() => break,
        }
    }
}
