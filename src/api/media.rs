use crate::error::GenerationError;
use crate::relay::{MediaRelay, SUBSTITUTED_HEADER};
use axum::{
    body::Body,
    extract::{Extension, Json},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchImageRequest {
    #[serde(default)]
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchVideoRequest {
    #[serde(default)]
    pub video_url: String,
}

fn content_type(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or(HeaderValue::from_static("application/octet-stream"))
}

/// Relays image bytes. An unreachable source is answered with the placeholder image.
pub async fn fetch_image(
    Extension(relay): Extension<Arc<MediaRelay>>,
    Json(payload): Json<FetchImageRequest>,
) -> Result<Response, GenerationError> {
    let url = payload.image_url.trim();
    if url.is_empty() {
        return Err(GenerationError::InvalidRequest("imageUrl is required".to_string()));
    }

    let relayed = relay.fetch_image_or_placeholder(url).await;
    tracing::Span::current().record("action", "fetch_image");

    let mut response = (StatusCode::OK, relayed.media.bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type(&relayed.media.content_type));
    if relayed.substituted {
        headers.insert(SUBSTITUTED_HEADER, HeaderValue::from_static("placeholder"));
        tracing::Span::current().record("business_event", "Placeholder image served");
    }
    Ok(response)
}

/// Streams video bytes through without buffering the whole file.
pub async fn fetch_video(
    Extension(relay): Extension<Arc<MediaRelay>>,
    Json(payload): Json<FetchVideoRequest>,
) -> Result<Response, GenerationError> {
    let url = payload.video_url.trim();
    if url.is_empty() {
        return Err(GenerationError::InvalidRequest("videoUrl is required".to_string()));
    }
    tracing::Span::current().record("action", "fetch_video");

    let stream = relay.open(url).await?;

    let mut response = Body::from_stream(stream.body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type(&stream.content_type));
    if let Some(len) = stream.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    Ok(response)
}
