use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of the generate → poll → relay pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Network error or non-2xx while talking to the provider. Retried on submission.
    #[error("provider unavailable: {0}")]
    TransientProvider(String),

    /// The job reached the provider's failed state.
    #[error("generation failed: {message}")]
    ProviderFailure { task_id: String, message: String },

    /// Attempt budget exhausted without a terminal state.
    #[error("generation timed out: task {task_id} still running after {attempts} status checks")]
    Timeout { task_id: String, attempts: u32 },

    /// The provider answered, but not in a shape we understand.
    #[error("unexpected provider response: {0}")]
    Protocol(String),

    #[error("failed to fetch media from {url}: {reason}")]
    MediaFetch { url: String, reason: String },

    #[error("failed to persist media: {0}")]
    Persistence(String),

    #[error("{0}")]
    InvalidRequest(String),
}

impl GenerationError {
    /// Stable machine-readable code sent next to the human message.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::TransientProvider(_) => "provider_unavailable",
            GenerationError::ProviderFailure { .. } => "provider_failed",
            GenerationError::Timeout { .. } => "timeout",
            GenerationError::Protocol(_) => "provider_protocol",
            GenerationError::MediaFetch { .. } => "media_fetch_failed",
            GenerationError::Persistence(_) => "persistence_failed",
            GenerationError::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GenerationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GenerationError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GenerationError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GenerationError::TransientProvider(_)
            | GenerationError::ProviderFailure { .. }
            | GenerationError::Protocol(_)
            | GenerationError::MediaFetch { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GenerationError {
    fn into_response(self) -> Response {
        tracing::Span::current().record("error", tracing::field::display(&self));
        (
            self.status_code(),
            Json(json!({
                "success": false,
                "error": self.to_string(),
                "code": self.code(),
            })),
        )
            .into_response()
    }
}

/// Object storage failures. A policy rejection is recoverable by the relay.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage policy rejected the upload: {0}")]
    PolicyRejected(String),

    #[error("storage request failed: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is not a valid number: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("{name} must be at least {min} bytes")]
    TooShort { name: &'static str, min: usize },
}

impl From<sea_orm::DbErr> for GenerationError {
    fn from(e: sea_orm::DbErr) -> Self {
        GenerationError::Persistence(e.to_string())
    }
}
