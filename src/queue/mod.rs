//! Generic in-memory task queue
//!
//! Strict FIFO with blocking dequeue, targeted cancellation and lazy reaping
//! of cancelled entries. The queue knows nothing about what it carries; the
//! scheduler stores executable tasks in it.

pub mod entry;
pub mod task_queue;

pub use entry::{QueueEntry, TaskInfo};
pub use task_queue::{QueueError, Result, TaskQueue};
