//! Progress reporting for transfer tasks
//!
//! Tasks call [`ProgressTracker::on_progress`] on every buffer read. Trackers
//! that do real work (rendering, network notifications) wrap themselves in
//! [`Throttled`] so only meaningful percent steps get through.

use super::error::TransferError;
use crate::humanize::ByteSize;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

/// Read-only view of a running task handed to trackers
pub trait TransferInfo: Send + Sync {
    fn task_id(&self) -> &str;
    fn title(&self) -> &str;
    fn total_bytes(&self) -> u64;
    fn transferred_bytes(&self) -> u64;
    fn total_files(&self) -> usize;
    /// Names of elements currently moving
    fn processing(&self) -> Vec<String>;
    /// Names of elements recorded as failed under the ignore-errors policy
    fn failed_files(&self) -> Vec<String>;
}

/// Side-effect sink for task lifecycle events
///
/// Callbacks run inline on the transfer path and must not block.
pub trait ProgressTracker: Send + Sync {
    fn on_start(&self, info: &dyn TransferInfo);
    fn on_progress(&self, info: &dyn TransferInfo);
    /// Fires exactly once; `error` is `None` on success
    fn on_done(&self, info: &dyn TransferInfo, error: Option<&TransferError>);
}

/// Tracker that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressTracker for NoopProgress {
    fn on_start(&self, _info: &dyn TransferInfo) {}
    fn on_progress(&self, _info: &dyn TransferInfo) {}
    fn on_done(&self, _info: &dyn TransferInfo, _error: Option<&TransferError>) {}
}

/// Percent step between updates, keyed by total size
const STEP_LEVELS: &[(u64, u32)] = &[
    (10 << 20, 1),
    (100 << 20, 5),
    (1 << 30, 10),
];
const LARGEST_STEP: u32 = 20;

pub fn step_for(total: u64) -> u32 {
    STEP_LEVELS
        .iter()
        .find(|(limit, _)| total < *limit)
        .map(|(_, step)| *step)
        .unwrap_or(LARGEST_STEP)
}

/// `floor(done * 100 / total)`, capped at 100
pub fn percent(total: u64, done: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = (u128::from(done) * 100 / u128::from(total)).min(100);
    pct as u32
}

/// Decide whether a progress update is worth emitting
///
/// Fires when the percent reaches the next step boundary past `last`, and
/// always once at 100. Never fires for the same or a lower percent.
pub fn should_update(total: u64, done: u64, last: u32) -> Option<u32> {
    if total == 0 || done == 0 {
        return None;
    }

    let pct = percent(total, done);
    if pct <= last {
        return None;
    }
    if pct == 100 || pct >= last + step_for(total) {
        Some(pct)
    } else {
        None
    }
}

/// Applies [`should_update`] in front of another tracker
///
/// The decision and the forwarded call happen under one lock, so the inner
/// tracker observes non-decreasing counters even with many writers.
pub struct Throttled<T> {
    inner: T,
    last: Mutex<u32>,
}

impl<T: ProgressTracker> Throttled<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            last: Mutex::new(0),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: ProgressTracker> ProgressTracker for Throttled<T> {
    fn on_start(&self, info: &dyn TransferInfo) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = 0;
        self.inner.on_start(info);
    }

    fn on_progress(&self, info: &dyn TransferInfo) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pct) = should_update(info.total_bytes(), info.transferred_bytes(), *last) {
            *last = pct;
            self.inner.on_progress(info);
        }
    }

    fn on_done(&self, info: &dyn TransferInfo, error: Option<&TransferError>) {
        self.inner.on_done(info, error);
    }
}

/// Tracker that reports through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressTracker for LogProgress {
    fn on_start(&self, info: &dyn TransferInfo) {
        info!(
            task_id = info.task_id(),
            files = info.total_files(),
            total = %ByteSize(info.total_bytes()),
            "{}",
            info.title()
        );
    }

    fn on_progress(&self, info: &dyn TransferInfo) {
        info!(
            task_id = info.task_id(),
            percent = percent(info.total_bytes(), info.transferred_bytes()),
            transferred = %ByteSize(info.transferred_bytes()),
            processing = ?info.processing(),
            "Transfer progress"
        );
    }

    fn on_done(&self, info: &dyn TransferInfo, error: Option<&TransferError>) {
        let failed = info.failed_files();
        match error {
            None if failed.is_empty() => info!(
                task_id = info.task_id(),
                transferred = %ByteSize(info.transferred_bytes()),
                "Transfer finished"
            ),
            None => warn!(
                task_id = info.task_id(),
                failed = ?failed,
                "Transfer finished with skipped files"
            ),
            Some(e) if e.is_cancelled() => info!(task_id = info.task_id(), "Transfer cancelled"),
            Some(e) => warn!(task_id = info.task_id(), error = %e, "Transfer failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_table() {
        assert_eq!(step_for(1024), 1);
        assert_eq!(step_for(50 << 20), 5);
        assert_eq!(step_for(500 << 20), 10);
        assert_eq!(step_for(4 << 30), 20);
    }

    #[test]
    fn test_no_update_without_data() {
        assert_eq!(should_update(0, 10, 0), None);
        assert_eq!(should_update(100, 0, 0), None);
    }

    #[test]
    fn test_small_transfer_every_percent() {
        let total = 1000;
        assert_eq!(should_update(total, 5, 0), None);
        assert_eq!(should_update(total, 10, 0), Some(1));
        assert_eq!(should_update(total, 15, 1), None);
        assert_eq!(should_update(total, 20, 1), Some(2));
    }

    #[test]
    fn test_large_transfer_steps() {
        // Above 1GiB and divisible by 100, so each percent is exact
        let total = 2_000_000_000u64;
        let one_pct = total / 100;
        assert_eq!(step_for(total), 20);
        assert_eq!(should_update(total, 10 * one_pct, 0), None);
        assert_eq!(should_update(total, 20 * one_pct - 1, 0), None);
        assert_eq!(should_update(total, 20 * one_pct, 0), Some(20));
        assert_eq!(should_update(total, 39 * one_pct, 20), None);
        assert_eq!(should_update(total, 40 * one_pct, 20), Some(40));
    }

    #[test]
    fn test_completion_always_fires_once() {
        let total = 2u64 << 30;
        assert_eq!(should_update(total, total, 95), Some(100));
        assert_eq!(should_update(total, total, 100), None);
    }

    #[test]
    fn test_percent_caps_at_100() {
        assert_eq!(percent(10, 25), 100);
        assert_eq!(percent(3, 1), 33);
    }
}
