use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Upper bound on one submit or status round trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which synthesis endpoint a job goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Image,
    Video,
}

impl JobKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            JobKind::Image => "services/aigc/text2image/image-synthesis",
            JobKind::Video => "services/aigc/image2video/generation",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Image => "image",
            JobKind::Video => "video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two calls an async generation provider has to support.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Creates a job and returns the provider task id. One attempt, no retry.
    async fn submit(&self, kind: JobKind, payload: &Value) -> Result<String, GenerationError>;

    /// Raw status document for a task.
    async fn task_status(&self, task_id: &str) -> Result<Value, GenerationError>;
}

pub struct DashScopeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl DashScopeClient {
    pub fn new(client: Client, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl TaskApi for DashScopeClient {
    async fn submit(&self, kind: JobKind, payload: &Value) -> Result<String, GenerationError> {
        let res = self
            .client
            .post(self.url(kind.endpoint()))
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .timeout(REQUEST_TIMEOUT)
            .json(payload)
            .send()
            .await
            .map_err(|e| GenerationError::TransientProvider(format!("submit request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(GenerationError::TransientProvider(format!(
                "submit returned {} - {}",
                status, text
            )));
        }

        let json: Value = res
            .json()
            .await
            .map_err(|e| GenerationError::Protocol(format!("submit response is not JSON: {}", e)))?;

        task_id_from(&json)
    }

    async fn task_status(&self, task_id: &str) -> Result<Value, GenerationError> {
        let res = self
            .client
            .get(self.url(&format!("tasks/{}", task_id)))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GenerationError::TransientProvider(format!("status request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(GenerationError::TransientProvider(format!(
                "status query returned {} - {}",
                status, text
            )));
        }

        res.json()
            .await
            .map_err(|e| GenerationError::Protocol(format!("status response is not JSON: {}", e)))
    }
}

/// `output.task_id` from a submission response.
pub fn task_id_from(json: &Value) -> Result<String, GenerationError> {
    json["output"]["task_id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .ok_or_else(|| GenerationError::Protocol(format!("no output.task_id in response: {}", json)))
}
