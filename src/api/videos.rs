use super::cats::{cat_not_found, find_owned};
use super::generate::VideoResponse;
use crate::entities::video_interaction;
use crate::error::GenerationError;
use crate::generator::{Generator, JobStatus};
use crate::orchestration;
use crate::relay::MediaRelay;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct InteractRequest {
    #[serde(default)]
    prompt: String,
    duration: Option<i64>,
}

pub async fn list_cat_videos(
    Extension(db): Extension<DatabaseConnection>,
    Extension(user_id): Extension<i32>,
    Path(cat_id): Path<Uuid>,
) -> Result<Response, GenerationError> {
    if find_owned(&db, cat_id, user_id).await?.is_none() {
        return Ok(cat_not_found());
    }

    let videos = video_interaction::Entity::find()
        .filter(video_interaction::Column::CatId.eq(cat_id))
        .order_by_desc(video_interaction::Column::CreatedAt)
        .all(&db)
        .await?;

    Ok((StatusCode::OK, Json(json!({"success": true, "videos": videos}))).into_response())
}

/// Generates a video from the cat's stored portrait and records it once re-hosted.
///
/// A provider failure is not recorded and comes back in-band with `status: "failed"`.
pub async fn create_cat_video(
    Extension(db): Extension<DatabaseConnection>,
    Extension(generator): Extension<Arc<Generator>>,
    Extension(relay): Extension<Arc<MediaRelay>>,
    Extension(user_id): Extension<i32>,
    Path(cat_id): Path<Uuid>,
    Json(payload): Json<InteractRequest>,
) -> Result<Response, GenerationError> {
    tracing::Span::current()
        .record("action", "interact_with_cat")
        .record("cat_id", tracing::field::display(cat_id));

    let Some(cat) = find_owned(&db, cat_id, user_id).await? else {
        return Ok(cat_not_found());
    };

    let interaction = orchestration::interact(
        &generator,
        &relay,
        cat.id,
        &cat.image_url,
        &payload.prompt,
        payload.duration,
    )
    .await?;

    if let Some(task_id) = interaction.job.task_id() {
        tracing::Span::current().record("task_id", task_id);
    }

    let Some(video) = interaction.video else {
        if let Some(message) = interaction.job.error_message() {
            tracing::Span::current().record("error", message);
        }
        return Ok((StatusCode::OK, Json(VideoResponse::from(&interaction.job))).into_response());
    };

    let record = video_interaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        cat_id: Set(cat.id),
        owner_id: Set(user_id),
        prompt_text: Set(payload.prompt.trim().to_string()),
        video_url: Set(video.url.clone()),
        status: Set("completed".to_string()),
        created_at: Set(chrono::Utc::now().fixed_offset()),
    }
    .insert(&db)
    .await?;

    crate::metrics::increment_videos_recorded();
    tracing::Span::current().record("business_event", "Cat video recorded");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "taskId": interaction.job.task_id(),
            "status": JobStatus::Completed,
            "video": record,
            "videoSubstituted": video.is_substitute(),
        })),
    )
        .into_response())
}
