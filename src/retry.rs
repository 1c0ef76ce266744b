//! Attempt budgets and the submission retry wrapper.
//!
//! Both submission and status polling are driven by `tokio_retry2::Retry`; the
//! policies here only decide how many attempts happen and how long to wait
//! between them.

use crate::error::GenerationError;
use std::future::Future;
use std::time::Duration;
use tokio_retry2::{Retry, RetryError};

/// Fixed-interval status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Deadline for a single status query. A query past it counts as failed.
    pub query_timeout: Duration,
}

impl PollPolicy {
    pub fn at_least_once(self) -> Self {
        Self {
            max_attempts: self.max_attempts.max(1),
            ..self
        }
    }

    /// Waits between consecutive attempts. One fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        std::iter::repeat(self.interval).take(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// Job submission with linear backoff: the wait after attempt `n` is `n * backoff_base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl SubmitPolicy {
    pub fn at_least_once(self) -> Self {
        Self {
            max_retries: self.max_retries.max(1),
            ..self
        }
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.backoff_base;
        (1..self.max_retries).map(move |attempt| base * attempt)
    }
}

/// Runs `submit` until it succeeds, returns a non-transient error, or the
/// attempt budget runs out. Only `TransientProvider` errors are retried; the last
/// one is returned unchanged so the provider's status and body reach the caller.
pub async fn submit_with_retry<T, F, Fut>(
    policy: &SubmitPolicy,
    mut submit: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let max_retries = policy.max_retries;
    let mut attempt: u32 = 0;

    Retry::spawn(policy.delays(), || {
        attempt += 1;
        let current = attempt;
        let pending = submit();
        async move {
            match pending.await {
                Ok(value) => Ok(value),
                Err(e @ GenerationError::TransientProvider(_)) => {
                    if current < max_retries {
                        tracing::warn!(attempt = current, max_retries, error = %e, "job submission failed, retrying");
                        metrics::counter!("catkeeper_submission_retries_total").increment(1);
                    } else {
                        tracing::error!(attempt = current, error = %e, "job submission failed, giving up");
                    }
                    Err(RetryError::Transient {
                        err: e,
                        retry_after: None,
                    })
                }
                Err(e) => Err(RetryError::Permanent(e)),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> SubmitPolicy {
        SubmitPolicy {
            max_retries,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[test]
    fn linear_backoff_delays() {
        let policy = SubmitPolicy {
            max_retries: 4,
            backoff_base: Duration::from_millis(500),
        };
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(1500)
            ]
        );
    }

    #[test]
    fn poll_delays_are_one_fewer_than_attempts() {
        let policy = PollPolicy {
            interval: Duration::from_secs(2),
            max_attempts: 90,
            query_timeout: Duration::from_secs(15),
        };
        assert_eq!(policy.delays().count(), 89);
        assert!(policy.delays().all(|d| d == Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn always_failing_submission_is_called_exactly_max_retries_times() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = submit_with_retry(&fast(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GenerationError::TransientProvider("503 Service Unavailable - busy".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(GenerationError::TransientProvider(msg)) => assert!(msg.contains("503")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = submit_with_retry(&fast(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(GenerationError::TransientProvider("connection reset".into()))
                } else {
                    Ok("task-42")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "task-42");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn protocol_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = submit_with_retry(&fast(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GenerationError::Protocol("missing output.task_id".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(GenerationError::Protocol(_))));
    }

    #[tokio::test]
    async fn single_attempt_budget_never_retries() {
        let calls = AtomicU32::new(0);
        let _: Result<(), _> = submit_with_retry(&fast(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GenerationError::TransientProvider("timeout".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
