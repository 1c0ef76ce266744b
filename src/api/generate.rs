use crate::cache::LocalCache;
use crate::error::GenerationError;
use crate::generator::{GenerationJob, Generator, JobStatus};
use crate::orchestration;
use crate::prompts::{CatConfig, VideoSpec};
use crate::relay::MediaRelay;
use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub success: bool,
    pub image_url: String,
    pub task_id: String,
    /// Local copy under `/cache`, when one could be written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_url: Option<String>,
}

fn cache_extension(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

async fn cache_locally(relay: &MediaRelay, cache: &LocalCache, task_id: &str, url: &str) -> Option<String> {
    let media = match relay.fetch(url).await {
        Ok(media) => media,
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "could not fetch image for local cache");
            return None;
        }
    };
    let name = format!("{}.{}", task_id, cache_extension(&media.content_type));
    match cache.store(&name, &media.bytes).await {
        Ok(file) => Some(format!("/cache/{}", file)),
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "could not write local cache file");
            None
        }
    }
}

pub async fn generate_image(
    Extension(generator): Extension<Arc<Generator>>,
    Extension(relay): Extension<Arc<MediaRelay>>,
    Extension(cache): Extension<LocalCache>,
    Json(config): Json<CatConfig>,
) -> Result<Json<ImageResponse>, GenerationError> {
    tracing::Span::current().record("action", "generate_image");

    let image = orchestration::generate_image(&generator, &config).await?;
    let cached_url = cache_locally(&relay, &cache, &image.task_id, &image.image_url).await;

    tracing::Span::current()
        .record("task_id", image.task_id.as_str())
        .record("business_event", "Cat image generated");

    Ok(Json(ImageResponse {
        success: true,
        image_url: image.image_url,
        task_id: image.task_id,
        cached_url,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoRequest {
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub prompt: String,
    pub duration: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub success: bool,
    pub task_id: Option<String>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&GenerationJob> for VideoResponse {
    fn from(job: &GenerationJob) -> Self {
        Self {
            success: job.status() == JobStatus::Completed,
            task_id: job.task_id().map(str::to_string),
            status: job.status(),
            video_url: job.result_url().map(str::to_string),
            error: job.error_message().map(str::to_string),
        }
    }
}

/// Provider-side failures come back as `200 {success: false, status: "failed"}`.
pub async fn generate_video(
    Extension(generator): Extension<Arc<Generator>>,
    Json(payload): Json<GenerateVideoRequest>,
) -> Result<Json<VideoResponse>, GenerationError> {
    tracing::Span::current().record("action", "generate_video");

    let spec = VideoSpec::new(&payload.image_url, &payload.prompt, payload.duration)
        .map_err(GenerationError::InvalidRequest)?;
    let job = orchestration::generate_video(&generator, &spec).await?;

    let span = tracing::Span::current();
    if let Some(task_id) = job.task_id() {
        span.record("task_id", task_id);
    }
    match job.error_message() {
        Some(message) => span.record("error", message),
        None => span.record("business_event", "Cat video generated"),
    };

    Ok(Json(VideoResponse::from(&job)))
}
