//! Retry/backoff envelope for transform calls
//!
//! A single reusable combinator wraps every external call in the pipeline.
//! Only transient failure classes are retried; anything else propagates
//! immediately, and on exhaustion the last error is returned unchanged so
//! callers can still inspect the original classification.

use crate::error::TransformError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy: attempt count and backoff seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles each subsequent retry
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Create a new policy
    #[inline]
    #[must_use]
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// Policy that never retries
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Run `operation` under `policy`
///
/// The operation is a factory so each attempt gets a fresh future. The
/// combinator is purely control flow (no state beyond the loop) and is safe
/// to nest.
///
/// # Errors
/// Returns the operation's error: immediately for non-transient classes,
/// or the final attempt's error once retries are exhausted.
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, TransformError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, TransformError>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "transient transform failure, retrying: {err}"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = execute(&RetryPolicy::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TransformError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = execute(
            &RetryPolicy::new(3, Duration::from_millis(100)),
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TransformError::Unavailable("blip".into()))
                } else {
                    Ok(7)
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute(&RetryPolicy::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransformError::Fatal("no".into()))
        })
        .await;

        assert_eq!(result.unwrap_err(), TransformError::Fatal("no".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_auth_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute(&RetryPolicy::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransformError::InvalidAuth("expired".into()))
        })
        .await;

        assert!(matches!(result, Err(TransformError::InvalidAuth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error_unwrapped() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute(
            &RetryPolicy::new(2, Duration::from_millis(10)),
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(TransformError::RateLimited(format!("attempt {n}")))
            },
        )
        .await;

        // 1 initial + 2 retries; the final error is the last attempt's, unchanged.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            result.unwrap_err(),
            TransformError::RateLimited("attempt 2".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles() {
        let start = Instant::now();
        let calls = AtomicU32::new(0);
        let _: Result<(), _> = execute(
            &RetryPolicy::new(2, Duration::from_millis(100)),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransformError::Unavailable("down".into()))
            },
        )
        .await;

        // 100ms + 200ms of (paused) sleeping.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn nests_safely() {
        let inner_calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(1, Duration::from_millis(10));

        let result = execute(&policy, || async {
            execute(&policy, || async {
                let n = inner_calls.fetch_add(1, Ordering::SeqCst);
                if n < 1 {
                    Err(TransformError::Unavailable("inner blip".into()))
                } else {
                    Ok("done")
                }
            })
            .await
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(inner_calls.load(Ordering::SeqCst), 2);
    }
}
