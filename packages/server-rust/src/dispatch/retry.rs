//! Bounded retry with a fixed inter-attempt delay.
//!
//! Each attempt gets its own deadline (the command timeout, clamped to what
//! is left of the caller's budget). Terminal errors stop the loop at once;
//! retryable ones consume the budget and come back wrapped in
//! `RetriesExhausted`. Dropping the returned future cancels the attempt in
//! flight and any pending delay.

use std::future::Future;
use std::time::Duration;

use linkgate_core::RequestContext;

use super::error::DispatchError;

/// Attempt budget and spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Runs an attempt closure under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct Retrier {
    policy: RetryPolicy,
}

impl Retrier {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Calls `attempt` until it succeeds, fails terminally, or the budget
    /// (attempts or the caller's deadline) runs out.
    ///
    /// `attempt` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// The terminal error as-is, or `RetriesExhausted` wrapping the last
    /// retryable error.
    pub async fn invoke<T, F, Fut>(
        &self,
        attempt_timeout: Duration,
        ctx: &RequestContext,
        mut attempt: F,
    ) -> Result<T, DispatchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DispatchError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last = DispatchError::timeout(Duration::ZERO);
        let mut made = 0;

        for n in 1..=max_attempts {
            let budget = match ctx.remaining() {
                Some(left) if left.is_zero() => break,
                Some(left) => left.min(attempt_timeout),
                None => attempt_timeout,
            };

            made = n;
            let outcome = match tokio::time::timeout(budget, attempt(n)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(DispatchError::timeout(budget)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::debug!(attempt = n, max_attempts, error = %e, "attempt failed");
                    last = e;
                }
            }

            if n < max_attempts {
                if ctx
                    .remaining()
                    .is_some_and(|left| left <= self.policy.delay)
                {
                    break;
                }
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        Err(DispatchError::RetriesExhausted {
            attempts: made,
            last: Box::new(last),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new("http://sho.rt/", "trace")
    }

    fn retrier(max_attempts: u32, delay_ms: u64) -> Retrier {
        Retrier::new(RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = retrier(3, 0)
            .invoke(Duration::from_secs(1), &ctx(), |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, DispatchError>(7)
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminal_error_consumes_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retrier(3, 0)
            .invoke(Duration::from_secs(1), &ctx(), |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DispatchError::NotFound("gone".into()))
            })
            .await;
        assert_eq!(result.unwrap_err(), DispatchError::NotFound("gone".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_error_consumes_budget_with_delay() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = retrier(3, 500)
            .invoke(Duration::from_secs(1), &ctx(), |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DispatchError::Transport("refused".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two gaps between three attempts.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1100), "{elapsed:?}");
        match result.unwrap_err() {
            DispatchError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(*last, DispatchError::Transport("refused".into()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let result = retrier(3, 1)
            .invoke(Duration::from_secs(1), &ctx(), |n| async move {
                if n < 3 {
                    Err(DispatchError::NoEndpointsAvailable)
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_times_out_and_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = retrier(2, 10)
            .invoke(Duration::from_millis(100), &ctx(), |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result.unwrap_err() {
            DispatchError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert_eq!(*last, DispatchError::Timeout { timeout_ms: 100 });
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_caller_deadline_makes_no_attempt() {
        let calls = AtomicU32::new(0);
        let ctx = ctx().with_budget(Duration::ZERO);
        let result: Result<(), _> = retrier(3, 0)
            .invoke(Duration::from_secs(1), &ctx, |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            result,
            Err(DispatchError::RetriesExhausted { attempts: 0, .. })
        ));
    }

    #[tokio::test]
    async fn caller_deadline_stops_retries_early() {
        let calls = AtomicU32::new(0);
        // Budget shorter than one delay: only the first attempt runs.
        let ctx = ctx().with_budget(Duration::from_millis(200));
        let result: Result<(), _> = retrier(5, 1_000)
            .invoke(Duration::from_secs(1), &ctx, |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DispatchError::Transport("refused".into()))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(DispatchError::RetriesExhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn zero_max_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let _ = retrier(0, 0)
            .invoke(Duration::from_secs(1), &ctx(), |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, DispatchError>(())
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
