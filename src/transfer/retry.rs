use super::error::{Result, TransferError};
use crate::storage::StorageError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Linear backoff policy for destination writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay after the first failure; attempt `n` waits `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds, attempts run out, or `token` fires
    ///
    /// `op` receives the 1-based attempt number and must rebuild its input
    /// from scratch each time.
    pub async fn run<T, F, Fut>(
        &self,
        token: &CancellationToken,
        element: &str,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, StorageError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if token.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let result = tokio::select! {
                r = op(attempt) => r,
                _ = token.cancelled() => return Err(TransferError::Cancelled),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(source) if attempt >= attempts => {
                    warn!(element, attempts, error = %source, "Save failed, no attempts left");
                    return Err(TransferError::RetryExhausted {
                        element: element.to_string(),
                        attempts,
                        source,
                    });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(element, attempt, error = %e, ?delay, "Save failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => return Err(TransferError::Cancelled),
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_linear_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(3), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();

        let value = fast(3)
            .run(&token, "a.bin", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(StorageError::UploadFailed("busy".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted() {
        let token = CancellationToken::new();
        let err = fast(2)
            .run(&token, "a.bin", |_| async {
                Err::<(), _>(StorageError::UploadFailed("down".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::RetryExhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let token = CancellationToken::new();
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: Duration::from_secs(60),
        };

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            policy.run(&token, "a.bin", |_| async {
                Err::<(), _>(StorageError::UploadFailed("down".into()))
            }),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(err.is_cancelled());
    }
}
