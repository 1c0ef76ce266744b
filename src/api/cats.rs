use crate::entities::{cat, video_interaction};
use crate::error::GenerationError;
use crate::orchestration;
use crate::prompts::CatConfig;
use crate::relay::MediaRelay;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptCatRequest {
    #[serde(default)]
    name: String,
    #[serde(flatten)]
    appearance: CatConfig,
    #[serde(default)]
    image_url: String,
}

pub(crate) fn cat_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"success": false, "error": "Cat not found", "code": "not_found"})),
    )
        .into_response()
}

/// Loads a cat only if `owner_id` owns it.
pub(crate) async fn find_owned(
    db: &DatabaseConnection,
    cat_id: Uuid,
    owner_id: i32,
) -> Result<Option<cat::Model>, GenerationError> {
    Ok(cat::Entity::find_by_id(cat_id)
        .filter(cat::Column::OwnerId.eq(owner_id))
        .one(db)
        .await?)
}

pub async fn list_cats(
    Extension(db): Extension<DatabaseConnection>,
    Extension(user_id): Extension<i32>,
) -> Result<Response, GenerationError> {
    let cats = cat::Entity::find()
        .filter(cat::Column::OwnerId.eq(user_id))
        .order_by_desc(cat::Column::CreatedAt)
        .all(&db)
        .await?;

    Ok((StatusCode::OK, Json(json!({"success": true, "cats": cats}))).into_response())
}

/// Re-hosts the generated image, then records the cat under the caller's account.
pub async fn adopt_cat(
    Extension(db): Extension<DatabaseConnection>,
    Extension(relay): Extension<Arc<MediaRelay>>,
    Extension(user_id): Extension<i32>,
    Json(payload): Json<AdoptCatRequest>,
) -> Result<Response, GenerationError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(GenerationError::InvalidRequest("name is required".to_string()));
    }
    payload
        .appearance
        .validate()
        .map_err(GenerationError::InvalidRequest)?;

    let cat_id = Uuid::new_v4();
    tracing::Span::current()
        .record("action", "adopt_cat")
        .record("cat_id", tracing::field::display(cat_id));

    let image = orchestration::adopt_cat_image(&relay, cat_id, &payload.image_url).await?;

    let new_cat = cat::ActiveModel {
        id: Set(cat_id),
        owner_id: Set(user_id),
        name: Set(name.to_string()),
        breed: Set(payload.appearance.breed.clone()),
        age_bracket: Set(payload.appearance.age.clone()),
        gender: Set(payload.appearance.gender.clone()),
        image_url: Set(image.url.clone()),
        created_at: Set(chrono::Utc::now().fixed_offset()),
    };
    let cat = new_cat.insert(&db).await?;

    crate::metrics::increment_cats_adopted(&cat.breed);
    tracing::Span::current().record("business_event", "Cat adopted");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "cat": cat,
            "imageSubstituted": image.is_substitute(),
        })),
    )
        .into_response())
}

pub async fn get_cat(
    Extension(db): Extension<DatabaseConnection>,
    Extension(user_id): Extension<i32>,
    Path(cat_id): Path<Uuid>,
) -> Result<Response, GenerationError> {
    match find_owned(&db, cat_id, user_id).await? {
        Some(cat) => Ok((StatusCode::OK, Json(json!({"success": true, "cat": cat}))).into_response()),
        None => Ok(cat_not_found()),
    }
}

/// Deletes the cat, its interactions (cascade) and its stored portrait.
pub async fn delete_cat(
    Extension(db): Extension<DatabaseConnection>,
    Extension(relay): Extension<Arc<MediaRelay>>,
    Extension(user_id): Extension<i32>,
    Path(cat_id): Path<Uuid>,
) -> Result<Response, GenerationError> {
    tracing::Span::current()
        .record("action", "delete_cat")
        .record("cat_id", tracing::field::display(cat_id));

    // Interactions go with the cat through the cascade.
    let videos = video_interaction::Entity::find()
        .filter(video_interaction::Column::CatId.eq(cat_id))
        .count(&db)
        .await?;

    let res = cat::Entity::delete_many()
        .filter(cat::Column::Id.eq(cat_id))
        .filter(cat::Column::OwnerId.eq(user_id))
        .exec(&db)
        .await?;
    if res.rows_affected == 0 {
        return Ok(cat_not_found());
    }
    crate::metrics::decrement_cats();
    crate::metrics::decrement_videos(videos);

    if let Err(e) = relay.discard(&orchestration::cat_image_key(cat_id)).await {
        tracing::warn!(cat_id = %cat_id, error = %e, "failed to delete stored cat image");
    }

    Ok((StatusCode::OK, Json(json!({"success": true}))).into_response())
}
