use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Read-only snapshot of a queue entry, safe to hand to front ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub cancelled: bool,
}

/// A payload wrapped with its identity and cancellation token
///
/// The token is the entry's only mutable state. Cancelling it marks the entry
/// dead; the queue reaps it lazily on the next `get` or cleanup sweep.
#[derive(Debug)]
pub struct QueueEntry<T> {
    id: String,
    title: String,
    payload: T,
    token: CancellationToken,
    created_at: DateTime<Utc>,
}

impl<T> QueueEntry<T> {
    pub fn new(id: impl Into<String>, title: impl Into<String>, payload: T) -> Self {
        Self::with_token(id, title, payload, CancellationToken::new())
    }

    /// Build an entry whose token is a child of `parent`, so cancelling the
    /// parent cancels the entry but not the other way around.
    pub fn with_parent(
        id: impl Into<String>,
        title: impl Into<String>,
        payload: T,
        parent: &CancellationToken,
    ) -> Self {
        Self::with_token(id, title, payload, parent.child_token())
    }

    pub fn with_token(
        id: impl Into<String>,
        title: impl Into<String>,
        payload: T,
        token: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            payload,
            token,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            cancelled: self.is_cancelled(),
        }
    }
}
