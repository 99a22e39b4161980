//! Bounded retry for store writes that follow a provider call.

use std::future::Future;
use std::time::Duration;

use crate::domain::foundation::DomainError;

/// How hard to try persisting an effect the provider already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistRetry {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Base delay; attempt `n` waits `n * backoff`.
    pub backoff: Duration,
}

impl PersistRetry {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub(crate) fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.attempts
    }

    pub(crate) async fn pause(&self, attempt: u32) {
        if !self.backoff.is_zero() {
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only transient errors are retried.
    pub(crate) async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if err.is_transient() && self.allows_another(attempt) => {
                    tracing::warn!(operation, attempt, error = %err, "Store write failed, retrying");
                    self.pause(attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl Default for PersistRetry {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}
