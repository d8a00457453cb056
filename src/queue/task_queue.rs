use super::entry::{QueueEntry, TaskInfo};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Task {0} already exists")]
    DuplicateId(String),

    #[error("Queue is closed")]
    Closed,

    #[error("Task {0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("Task {0} is running and cannot be removed")]
    AlreadyRunning(String),

    #[error("Task {0} does not exist")]
    NotFound(String),

    #[error("Queue is closed and empty")]
    ClosedEmpty,
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// In-memory FIFO of cancellable entries
///
/// Layout:
/// - `pending`: ordered list of entries not yet handed to a consumer
/// - `index`: id → entry for everything in `pending`
/// - `running`: id → entry for everything handed out by `get` and not yet `done`
///
/// One mutex guards all three; it is never held across an await point.
/// Blocked consumers park on a `Notify` that `add` signals once and `close`
/// signals for everyone.
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

struct QueueState<T> {
    pending: VecDeque<Arc<QueueEntry<T>>>,
    index: HashMap<String, Arc<QueueEntry<T>>>,
    running: HashMap<String, Arc<QueueEntry<T>>>,
    closed: bool,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                index: HashMap::new(),
                running: HashMap::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry to the tail and wake one blocked consumer
    pub fn add(&self, entry: QueueEntry<T>) -> Result<()> {
        {
            let mut state = self.lock();

            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.index.contains_key(entry.id()) || state.running.contains_key(entry.id()) {
                return Err(QueueError::DuplicateId(entry.id().to_string()));
            }
            if entry.is_cancelled() {
                return Err(QueueError::AlreadyCancelled(entry.id().to_string()));
            }

            let entry = Arc::new(entry);
            state.index.insert(entry.id().to_string(), Arc::clone(&entry));
            state.pending.push_back(entry);
        }

        self.notify.notify_one();
        Ok(())
    }

    /// Pop the first live entry, waiting while the queue is open and empty
    ///
    /// Cancelled entries met at the head are discarded. The returned entry
    /// moves to the running set until `done` is called for it.
    pub async fn get(&self) -> Result<Arc<QueueEntry<T>>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so an `add` between the check
            // and the await still wakes us.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                while let Some(entry) = state.pending.pop_front() {
                    state.index.remove(entry.id());
                    if entry.is_cancelled() {
                        debug!(task_id = %entry.id(), "Skipping cancelled task");
                        continue;
                    }
                    state.running.insert(entry.id().to_string(), Arc::clone(&entry));
                    return Ok(entry);
                }
                if state.closed {
                    return Err(QueueError::ClosedEmpty);
                }
            }

            notified.await;
        }
    }

    /// Forget an entry once its execution finished. Safe to call twice.
    pub fn done(&self, id: &str) {
        let mut state = self.lock();
        state.running.remove(id);
        if state.index.remove(id).is_some() {
            state.pending.retain(|e| e.id() != id);
        }
    }

    /// Cancel a pending or running entry without unlinking it
    pub fn cancel_task(&self, id: &str) -> Result<()> {
        let state = self.lock();
        let entry = state
            .index
            .get(id)
            .or_else(|| state.running.get(id))
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        entry.cancel();
        debug!(task_id = %id, "Task cancelled");
        Ok(())
    }

    /// Unlink a pending entry and cancel it
    ///
    /// A running entry is cancelled too, but stays in the running set and the
    /// call reports `AlreadyRunning`.
    pub fn remove_task(&self, id: &str) -> Result<()> {
        let mut state = self.lock();

        if let Some(entry) = state.running.get(id) {
            entry.cancel();
            return Err(QueueError::AlreadyRunning(id.to_string()));
        }

        let entry = state
            .index
            .remove(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        state.pending.retain(|e| e.id() != id);
        entry.cancel();
        Ok(())
    }

    /// First live pending entry, left in place
    pub fn peek(&self) -> Option<Arc<QueueEntry<T>>> {
        self.lock()
            .pending
            .iter()
            .find(|e| !e.is_cancelled())
            .cloned()
    }

    /// Pending entries, counting cancelled ones not yet reaped
    pub fn length(&self) -> usize {
        self.lock().pending.len()
    }

    /// Pending entries that will actually run
    pub fn active_length(&self) -> usize {
        self.lock()
            .pending
            .iter()
            .filter(|e| !e.is_cancelled())
            .count()
    }

    pub fn running_length(&self) -> usize {
        self.lock().running.len()
    }

    /// Drop every cancelled pending entry, returning how many were removed
    pub fn cleanup_cancelled(&self) -> usize {
        let mut state = self.lock();
        let before = state.pending.len();

        let QueueState { pending, index, .. } = &mut *state;
        pending.retain(|e| {
            if e.is_cancelled() {
                index.remove(e.id());
                false
            } else {
                true
            }
        });

        let removed = before - state.pending.len();
        if removed > 0 {
            debug!(removed, "Reaped cancelled tasks");
        }
        removed
    }

    /// Cancel every pending entry
    pub fn cancel_all(&self) {
        for entry in self.lock().pending.iter() {
            entry.cancel();
        }
    }

    /// Cancel and unlink every pending entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.pending.len();
        for entry in state.pending.drain(..) {
            entry.cancel();
        }
        state.index.clear();
        removed
    }

    /// Refuse new entries and wake every blocked consumer
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Snapshots of live pending entries in FIFO order
    pub fn queued_tasks(&self) -> Vec<TaskInfo> {
        self.lock()
            .pending
            .iter()
            .filter(|e| !e.is_cancelled())
            .map(|e| e.info())
            .collect()
    }

    /// Snapshots of running entries, oldest first, including cancelled ones
    pub fn running_tasks(&self) -> Vec<TaskInfo> {
        let mut infos: Vec<TaskInfo> = self.lock().running.values().map(|e| e.info()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(id: &str) -> QueueEntry<u32> {
        QueueEntry::new(id, format!("task {id}"), 0)
    }

    #[tokio::test]
    async fn test_add_and_get_in_order() {
        let queue = TaskQueue::new();
        queue.add(entry("a")).unwrap();
        queue.add(entry("b")).unwrap();
        assert_eq!(queue.length(), 2);

        assert_eq!(queue.get().await.unwrap().id(), "a");
        assert_eq!(queue.get().await.unwrap().id(), "b");
        assert_eq!(queue.length(), 0);
        assert_eq!(queue.running_length(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let queue = TaskQueue::new();
        queue.add(entry("a")).unwrap();
        assert_eq!(queue.add(entry("a")), Err(QueueError::DuplicateId("a".into())));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_while_running() {
        let queue = TaskQueue::new();
        queue.add(entry("a")).unwrap();
        let _running = queue.get().await.unwrap();

        assert_eq!(queue.add(entry("a")), Err(QueueError::DuplicateId("a".into())));

        queue.done("a");
        assert!(queue.add(entry("a")).is_ok());
    }

    #[test]
    fn test_cancelled_entry_rejected() {
        let queue = TaskQueue::new();
        let e = entry("a");
        e.cancel();
        assert_eq!(queue.add(e), Err(QueueError::AlreadyCancelled("a".into())));
    }

    #[test]
    fn test_remove_pending() {
        let queue = TaskQueue::new();
        queue.add(entry("a")).unwrap();
        queue.add(entry("b")).unwrap();

        queue.remove_task("a").unwrap();
        assert_eq!(queue.length(), 1);
        assert_eq!(queue.peek().unwrap().id(), "b");
        assert_eq!(queue.remove_task("a"), Err(QueueError::NotFound("a".into())));
    }

    #[tokio::test]
    async fn test_remove_running_is_refused_but_cancels() {
        let queue = TaskQueue::new();
        queue.add(entry("a")).unwrap();
        let running = queue.get().await.unwrap();

        assert_eq!(queue.remove_task("a"), Err(QueueError::AlreadyRunning("a".into())));
        assert!(running.is_cancelled());
        assert_eq!(queue.running_tasks().len(), 1);
        assert!(queue.running_tasks()[0].cancelled);
    }

    #[test]
    fn test_peek_skips_cancelled() {
        let queue = TaskQueue::new();
        queue.add(entry("a")).unwrap();
        queue.add(entry("b")).unwrap();
        queue.cancel_task("a").unwrap();

        assert_eq!(queue.peek().unwrap().id(), "b");
        assert_eq!(queue.length(), 2);
    }

    #[test]
    fn test_cleanup_cancelled() {
        let queue = TaskQueue::new();
        for id in ["a", "b", "c"] {
            queue.add(entry(id)).unwrap();
        }
        queue.cancel_task("a").unwrap();
        queue.cancel_task("c").unwrap();

        assert_eq!(queue.cleanup_cancelled(), 2);
        assert_eq!(queue.length(), 1);
        assert_eq!(queue.active_length(), 1);
        // Reaped ids are free again
        assert!(queue.add(entry("a")).is_ok());
    }

    #[test]
    fn test_cancel_all_and_clear() {
        let queue = TaskQueue::new();
        for id in ["a", "b"] {
            queue.add(entry(id)).unwrap();
        }

        queue.cancel_all();
        assert_eq!(queue.length(), 2);
        assert_eq!(queue.active_length(), 0);

        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.length(), 0);
        assert!(queue.peek().is_none());
    }

    #[test]
    fn test_cancel_unknown() {
        let queue: TaskQueue<u32> = TaskQueue::new();
        assert_eq!(queue.cancel_task("nope"), Err(QueueError::NotFound("nope".into())));
    }

    #[tokio::test]
    async fn test_get_wakes_on_add() {
        let queue = Arc::new(TaskQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get().await.map(|e| e.id().to_string()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.add(entry("late")).unwrap();

        let id = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(id, "late");
    }

    #[tokio::test]
    async fn test_close_drains_then_fails() {
        let queue = TaskQueue::new();
        queue.add(entry("a")).unwrap();
        queue.close();

        assert_eq!(queue.add(entry("b")), Err(QueueError::Closed));
        assert_eq!(queue.get().await.unwrap().id(), "a");
        assert_eq!(queue.get().await.unwrap_err(), QueueError::ClosedEmpty);
    }
}
