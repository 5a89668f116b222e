//! Bounded retry with capped exponential backoff.
//!
//! Only the MySQL read path uses this: transient backend faults (dropped
//! connection, pool acquire timeout, protocol interruption) are retried up
//! to a fixed budget, everything else surfaces immediately. Writes are
//! never retried, since a statement that partially applied before a
//! connection drop must not be applied twice.

use std::time::Duration;

use tracing::warn;

use crate::error::DbResult;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_MAX_DELAY_MS: u64 = 2_000;

/// Retry budget and backoff shape.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry (attempt is 1-based; the delay
    /// doubles per attempt and is capped).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
        Duration::from_millis(exp.min(self.max_delay_ms))
    }
}

/// Run `op` until it succeeds, fails non-transiently, or the budget runs
/// out. The final transient error is surfaced after the last attempt.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut op: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient backend error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if !err.is_transient() {
                    warn!(operation, error = %err, "non-retryable error");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 4,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1_600));
        assert_eq!(policy.delay_for(5), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(30), Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retry(fast_policy(), "fetch", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DbError::transient("connection reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_surfaces_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: DbResult<i64> = with_retry(fast_policy(), "fetch", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(DbError::transient(format!("drop #{}", n)))
            }
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("drop #2"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_query_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: DbResult<i64> = with_retry(fast_policy(), "fetch", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DbError::query("syntax error", Some("42601".to_string())))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
