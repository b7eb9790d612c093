//! Bounded store calls.
//!
//! Every store call made on the request path goes through [`StoreGuard::run`]:
//! - each attempt is bounded by the per-call timeout
//! - a transient failure is retried once, only if the overall budget still has room
//! - a timeout or a second failure surfaces as `AppError::Internal` (never as a grant)

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::{error, warn};

use crate::error::AppError;
use crate::repos::error::RepoResult;

#[derive(Debug, Clone, Copy)]
pub struct StoreGuard {
    call_timeout: Duration,
    budget: Duration,
}

impl StoreGuard {
    /// `budget` bounds the total time spent across the first attempt and its retry.
    pub fn new(call_timeout: Duration, budget: Duration) -> Self {
        Self {
            call_timeout,
            budget: budget.max(call_timeout),
        }
    }

    pub async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RepoResult<T>>,
    {
        let deadline = Instant::now() + self.budget;
        let mut retried = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let limit = self.call_timeout.min(remaining);

            match timeout(limit, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_transient() && !retried && !remaining.is_zero() => {
                    warn!(op, error = %e, "transient store error, retrying once");
                    retried = true;
                }
                Ok(Err(e)) => {
                    error!(op, error = ?e, "store call failed");
                    return Err(AppError::Internal);
                }
                Err(_) => {
                    error!(op, timeout_ms = limit.as_millis() as u64, "store call timed out");
                    return Err(AppError::Internal);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::repos::error::RepoError;

    fn guard() -> StoreGuard {
        StoreGuard::new(Duration::from_millis(50), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn transient_error_is_retried_once() {
        let calls = AtomicUsize::new(0);

        let out = guard()
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(RepoError::Conflict)
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(out, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_transient_error_surfaces_as_internal() {
        let calls = AtomicUsize::new(0);

        let out: Result<(), AppError> = guard()
            .run("always-conflict", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RepoError::Conflict) }
            })
            .await;

        assert_eq!(out, Err(AppError::Internal));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicUsize::new(0);

        let out: Result<(), AppError> = guard()
            .run("missing", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RepoError::Missing("login record")) }
            })
            .await;

        assert_eq!(out, Err(AppError::Internal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_fails_closed() {
        let out: Result<u8, AppError> = guard()
            .run("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await;

        assert_eq!(out, Err(AppError::Internal));
    }
}
