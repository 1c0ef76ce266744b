//! Polling a provider task until it reaches a terminal state.

use crate::error::GenerationError;
use crate::retry::PollPolicy;
use serde_json::Value;
use std::future::Future;
use tokio_retry2::{Retry, RetryError};

/// Status field candidates, highest priority first.
const STATUS_PATHS: &[&[&str]] = &[
    &["output", "task_status"],
    &["task_status"],
    &["output", "status"],
    &["status"],
    &["state"],
];

const RESULT_URL_PATHS: &[&[&str]] = &[
    &["output", "video_url"],
    &["output", "url"],
    &["output", "results", "0", "url"],
    &["video_url"],
    &["url"],
    &["results", "0", "url"],
];

const MESSAGE_PATHS: &[&[&str]] = &[
    &["output", "message"],
    &["message"],
    &["output", "error"],
    &["error", "message"],
    &["error"],
    &["output", "code"],
    &["code"],
];

const DEFAULT_FAILURE_MESSAGE: &str = "generation task failed";

/// Normalised provider task state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Completed(String),
    Failed(String),
    InProgress,
}

impl TaskStatus {
    /// The only place that understands provider status vocabularies.
    pub fn from_payload(raw: &Value) -> Self {
        let status = STATUS_PATHS
            .iter()
            .find_map(|path| lookup(raw, path).and_then(Value::as_str))
            .map(|s| s.trim().to_ascii_lowercase());

        match status.as_deref() {
            Some("completed" | "succeeded" | "success") => match first_string(raw, RESULT_URL_PATHS) {
                Some(url) => TaskStatus::Completed(url),
                None => TaskStatus::Failed("task completed without a result url".to_string()),
            },
            Some("failed" | "failure" | "canceled" | "cancelled" | "unknown-error") => {
                TaskStatus::Failed(
                    first_string(raw, MESSAGE_PATHS)
                        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
                )
            }
            _ => TaskStatus::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::InProgress)
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| match current {
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) => map.get(*key),
        _ => None,
    })
}

fn first_string(raw: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        lookup(raw, path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

#[derive(Debug)]
enum Halt {
    Failed(String),
    Pending,
}

/// Queries `query` until the task completes or fails, at most
/// `policy.max_attempts` times. Query errors, and queries that outlive
/// `policy.query_timeout`, count as "still running".
///
/// Returns the result URL, `ProviderFailure` when the provider reports failure,
/// or `Timeout` once the budget is spent.
pub async fn poll_task<F, Fut>(
    task_id: &str,
    policy: &PollPolicy,
    mut query: F,
) -> Result<String, GenerationError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Value, GenerationError>>,
{
    let mut attempt: u32 = 0;
    let query_timeout = policy.query_timeout;

    let outcome = Retry::spawn(policy.delays(), || {
        attempt += 1;
        let current = attempt;
        let pending = tokio::time::timeout(query_timeout, query(task_id.to_string()));
        async move {
            metrics::counter!("catkeeper_poll_attempts_total").increment(1);
            let response = match pending.await {
                Ok(response) => response,
                Err(_) => Err(GenerationError::TransientProvider(format!(
                    "status query exceeded {:?}",
                    query_timeout
                ))),
            };
            match response {
                Ok(raw) => match TaskStatus::from_payload(&raw) {
                    TaskStatus::Completed(url) => Ok(url),
                    TaskStatus::Failed(message) => Err(RetryError::Permanent(Halt::Failed(message))),
                    TaskStatus::InProgress => {
                        tracing::debug!(attempt = current, "task still running");
                        Err(RetryError::Transient {
                            err: Halt::Pending,
                            retry_after: None,
                        })
                    }
                },
                Err(e) => {
                    tracing::warn!(attempt = current, error = %e, "status query failed, will keep polling");
                    Err(RetryError::Transient {
                        err: Halt::Pending,
                        retry_after: None,
                    })
                }
            }
        }
    })
    .await;

    match outcome {
        Ok(url) => Ok(url),
        Err(Halt::Failed(message)) => Err(GenerationError::ProviderFailure {
            task_id: task_id.to_string(),
            message,
        }),
        Err(Halt::Pending) => Err(GenerationError::Timeout {
            task_id: task_id.to_string(),
            attempts: policy.max_attempts,
        }),
    }
}
