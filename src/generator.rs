//! Submit → poll for a single generation job.

use crate::dashscope::{JobKind, TaskApi};
use crate::error::GenerationError;
use crate::poller::poll_task;
use crate::retry::{submit_with_retry, PollPolicy, SubmitPolicy};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobStateError {
    #[error("task id already assigned: {0}")]
    TaskIdAlreadyAssigned(String),

    #[error("cannot move job from {from:?} to {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// One provider-side generation request and what became of it.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationJob {
    #[serde(skip)]
    kind: JobKind,
    #[serde(skip)]
    payload: Value,
    task_id: Option<String>,
    status: JobStatus,
    result_url: Option<String>,
    error_message: Option<String>,
}

impl GenerationJob {
    pub fn new(kind: JobKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            task_id: None,
            status: JobStatus::Pending,
            result_url: None,
            error_message: None,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Records the provider task id and marks the job running. The id never changes afterwards.
    pub fn start(&mut self, task_id: String) -> Result<(), JobStateError> {
        if let Some(existing) = &self.task_id {
            return Err(JobStateError::TaskIdAlreadyAssigned(existing.clone()));
        }
        self.advance(JobStatus::Running)?;
        self.task_id = Some(task_id);
        Ok(())
    }

    pub fn complete(&mut self, url: String) -> Result<(), JobStateError> {
        self.advance(JobStatus::Completed)?;
        self.result_url = Some(url);
        Ok(())
    }

    pub fn fail(&mut self, message: String) -> Result<(), JobStateError> {
        self.advance(JobStatus::Failed)?;
        self.error_message = Some(message);
        Ok(())
    }

    fn advance(&mut self, to: JobStatus) -> Result<(), JobStateError> {
        if self.status.is_terminal() || to.rank() <= self.status.rank() {
            return Err(JobStateError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

pub struct Generator {
    provider: Arc<dyn TaskApi>,
    submit_policy: SubmitPolicy,
    image_poll: PollPolicy,
    video_poll: PollPolicy,
}

impl Generator {
    pub fn new(
        provider: Arc<dyn TaskApi>,
        submit_policy: SubmitPolicy,
        image_poll: PollPolicy,
        video_poll: PollPolicy,
    ) -> Self {
        Self {
            provider,
            submit_policy,
            image_poll,
            video_poll,
        }
    }

    fn poll_policy(&self, kind: JobKind) -> &PollPolicy {
        match kind {
            JobKind::Image => &self.image_poll,
            JobKind::Video => &self.video_poll,
        }
    }

    /// Drives `job` to a terminal state and returns the result URL.
    ///
    /// The job is left `Failed` for every error path; a timeout is recorded as a
    /// failure but surfaces as `GenerationError::Timeout`.
    pub async fn run(&self, job: &mut GenerationJob) -> Result<String, GenerationError> {
        let kind = job.kind();
        let span = tracing::info_span!("generation_job", kind = %kind, task_id = tracing::field::Empty);
        let result = self.drive(job).instrument(span).await;

        let outcome = match &result {
            Ok(_) => "completed",
            Err(GenerationError::Timeout { .. }) => "timeout",
            Err(_) => "failed",
        };
        metrics::counter!("catkeeper_jobs_total", "kind" => kind.as_str(), "outcome" => outcome)
            .increment(1);

        if let Err(e) = &result {
            let message = match e {
                GenerationError::ProviderFailure { message, .. } => message.clone(),
                other => other.to_string(),
            };
            if let Err(state) = job.fail(message) {
                tracing::warn!(error = %state, "job already terminal");
            }
        }
        result
    }

    async fn drive(&self, job: &mut GenerationJob) -> Result<String, GenerationError> {
        let kind = job.kind();
        let provider = self.provider.clone();
        let payload = job.payload().clone();

        let task_id = submit_with_retry(&self.submit_policy, || {
            let provider = provider.clone();
            let payload = payload.clone();
            async move { provider.submit(kind, &payload).await }
        })
        .await?;

        tracing::Span::current().record("task_id", task_id.as_str());
        tracing::info!("{} generation task created", kind);
        metrics::counter!("catkeeper_jobs_submitted_total", "kind" => kind.as_str()).increment(1);

        job.start(task_id.clone())
            .map_err(|e| GenerationError::Protocol(e.to_string()))?;

        let url = poll_task(&task_id, self.poll_policy(kind), |id| {
            let provider = provider.clone();
            async move { provider.task_status(&id).await }
        })
        .await?;

        tracing::info!(result_url = %url, "{} generation completed", kind);
        job.complete(url.clone())
            .map_err(|e| GenerationError::Protocol(e.to_string()))?;
        Ok(url)
    }
}
