//! Fetching provider media and re-hosting it into durable storage.
//!
//! Provider result URLs expire, so anything worth keeping has to be copied
//! into the object store before it is referenced from the database.

use crate::error::{GenerationError, StorageError};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;

pub const PLACEHOLDER_IMAGE_URL: &str =
    "https://images.unsplash.com/photo-1514888286974-6c03e2ca1dba?w=512&h=512&fit=crop";
pub const SAMPLE_VIDEO_URL: &str =
    "https://sample-videos.com/zip/10/mp4/SampleVideo_1280x720_1mb.mp4";

/// Served by `/api/fetch-image` when the real image is unreachable.
pub static PLACEHOLDER_IMAGE: &[u8] = include_bytes!("../assets/placeholder-cat.png");

/// Response header set when a placeholder replaced the requested media.
pub const SUBSTITUTED_HEADER: &str = "x-media-substituted";

const OCTET_STREAM: &str = "application/octet-stream";

/// Largest body `MediaRelay` will buffer for re-hosting or relaying.
pub const MAX_MEDIA_BYTES: u64 = 100 * 1024 * 1024;

/// Declared lengths are only trusted this far when reserving a buffer.
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    /// Object key prefix inside the media bucket.
    pub fn prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "cat-images",
            MediaKind::Video => "cat-videos",
        }
    }

    pub fn default_content_type(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/png",
            MediaKind::Video => "video/mp4",
        }
    }

    pub fn key(&self, file_name: &str) -> String {
        format!("{}/{}", self.prefix(), file_name)
    }
}

#[derive(Debug, Clone)]
pub struct Media {
    pub bytes: Bytes,
    pub content_type: String,
}

pub struct MediaStream {
    pub content_type: String,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, GenerationError>>,
}

impl MediaStream {
    pub fn from_bytes(bytes: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            content_length: Some(bytes.len() as u64),
            body: stream::once(async move { Ok(bytes) }).boxed(),
        }
    }

    /// Buffers the whole body, failing once it grows past `limit` bytes.
    pub async fn collect(self, url: &str, limit: u64) -> Result<Media, GenerationError> {
        let MediaStream {
            content_type,
            content_length,
            mut body,
        } = self;
        let too_large = || GenerationError::MediaFetch {
            url: url.to_string(),
            reason: format!("media exceeds {} bytes", limit),
        };

        if content_length.is_some_and(|len| len > limit) {
            return Err(too_large());
        }
        let reserve = content_length.unwrap_or(0).min(MAX_PREALLOCATION).min(limit);
        let mut buf = Vec::with_capacity(reserve as usize);
        while let Some(chunk) = body.try_next().await? {
            if (buf.len() + chunk.len()) as u64 > limit {
                return Err(too_large());
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(Media {
            bytes: Bytes::from(buf),
            content_type,
        })
    }
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn open(&self, url: &str) -> Result<MediaStream, GenerationError>;
}

/// DashScope result buckets (`dashscope-result-*.oss-*.aliyuncs.com`) over https.
///
/// The API key is attached to these fetches, so the host must be a real
/// subdomain of `aliyuncs.com` whose first label names a DashScope bucket.
pub fn is_provider_storage(url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    if parsed.scheme() != "https" {
        return false;
    }
    let Some(host) = parsed.host_str().map(str::to_ascii_lowercase) else {
        return false;
    };
    match host.strip_suffix(".aliyuncs.com") {
        Some(subdomain) => subdomain
            .split('.')
            .next()
            .is_some_and(|bucket| bucket.starts_with("dashscope")),
        None => false,
    }
}

fn content_type_for(url: &str, header: Option<&str>) -> String {
    if let Some(value) = header.map(str::trim).filter(|v| !v.is_empty() && *v != OCTET_STREAM) {
        return value.to_string();
    }
    let path = reqwest::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

fn decode_data_url(url: &str) -> Result<Media, GenerationError> {
    let fail = |reason: &str| GenerationError::MediaFetch {
        url: url.chars().take(48).collect(),
        reason: reason.to_string(),
    };
    let rest = url.strip_prefix("data:").ok_or_else(|| fail("not a data url"))?;
    let (meta, data) = rest.split_once(',').ok_or_else(|| fail("malformed data url"))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| fail("only base64 data urls are supported"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| fail(&e.to_string()))?;
    Ok(Media {
        bytes: Bytes::from(bytes),
        content_type: if mime.is_empty() { OCTET_STREAM.to_string() } else { mime.to_string() },
    })
}

/// Plain HTTP fetches. Provider-hosted results get the API key attached.
pub struct HttpSource {
    client: Client,
    provider_key: Option<String>,
}

impl HttpSource {
    pub fn new(client: Client, provider_key: Option<String>) -> Self {
        Self {
            client,
            provider_key,
        }
    }
}

#[async_trait]
impl MediaSource for HttpSource {
    async fn open(&self, url: &str) -> Result<MediaStream, GenerationError> {
        let mut request = self.client.get(url);
        if let Some(key) = self.provider_key.as_deref().filter(|_| is_provider_storage(url)) {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(|e| GenerationError::MediaFetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !res.status().is_success() {
            return Err(GenerationError::MediaFetch {
                url: url.to_string(),
                reason: format!("upstream returned {}", res.status()),
            });
        }

        let content_type = content_type_for(
            url,
            res.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        );
        let content_length = res.content_length();
        let source = url.to_string();
        let body = res
            .bytes_stream()
            .map_err(move |e| GenerationError::MediaFetch {
                url: source.clone(),
                reason: e.to_string(),
            })
            .boxed();

        Ok(MediaStream {
            content_type,
            content_length,
            body,
        })
    }
}

/// Result of `fetch_image_or_placeholder`.
#[derive(Debug, Clone)]
pub struct Relayed {
    pub media: Media,
    pub substituted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehostOutcome {
    Stored,
    AlreadyStored,
    /// Source unreachable; the placeholder URL was returned.
    SourceUnavailable,
    /// Storage policy refused the upload; a public fallback URL was returned.
    PolicyFallback,
}

impl RehostOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RehostOutcome::Stored => "stored",
            RehostOutcome::AlreadyStored => "already_stored",
            RehostOutcome::SourceUnavailable => "source_unavailable",
            RehostOutcome::PolicyFallback => "policy_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rehosted {
    pub url: String,
    pub outcome: RehostOutcome,
}

impl Rehosted {
    pub fn is_substitute(&self) -> bool {
        matches!(
            self.outcome,
            RehostOutcome::SourceUnavailable | RehostOutcome::PolicyFallback
        )
    }
}

/// Media produced by a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub source_url: String,
    pub persisted_url: Option<String>,
    pub content_type: Option<String>,
}

impl MediaAsset {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            persisted_url: None,
            content_type: None,
        }
    }
}

fn fallback_url(kind: MediaKind, source_url: &str) -> String {
    match kind {
        MediaKind::Image => PLACEHOLDER_IMAGE_URL.to_string(),
        MediaKind::Video => {
            if source_url.starts_with("https://") && !is_provider_storage(source_url) {
                source_url.to_string()
            } else {
                SAMPLE_VIDEO_URL.to_string()
            }
        }
    }
}

pub struct MediaRelay {
    source: Arc<dyn MediaSource>,
    store: Arc<dyn ObjectStore>,
}

impl MediaRelay {
    pub fn new(source: Arc<dyn MediaSource>, store: Arc<dyn ObjectStore>) -> Self {
        Self { source, store }
    }

    /// Opens `url` for streaming. Base64 `data:` URLs are decoded in place.
    pub async fn open(&self, url: &str) -> Result<MediaStream, GenerationError> {
        if url.starts_with("data:") {
            let media = decode_data_url(url)?;
            return Ok(MediaStream::from_bytes(media.bytes, media.content_type));
        }
        self.source.open(url).await
    }

    pub async fn fetch(&self, url: &str) -> Result<Media, GenerationError> {
        self.open(url).await?.collect(url, MAX_MEDIA_BYTES).await
    }

    /// Removes a stored object. Missing objects are not an error.
    pub async fn discard(&self, key: &str) -> Result<(), GenerationError> {
        match self.store.exists(key).await {
            Ok(false) => Ok(()),
            Ok(true) => self
                .store
                .delete(key)
                .await
                .map_err(|e| GenerationError::Persistence(e.to_string())),
            Err(e) => Err(GenerationError::Persistence(e.to_string())),
        }
    }

    /// Never fails: an unreachable image is replaced by the bundled placeholder.
    pub async fn fetch_image_or_placeholder(&self, url: &str) -> Relayed {
        match self.fetch(url).await {
            Ok(media) => Relayed {
                media,
                substituted: false,
            },
            Err(e) => {
                tracing::warn!(
                    substituted = "placeholder",
                    source_url = %url,
                    error = %e,
                    "image fetch failed, serving placeholder"
                );
                metrics::counter!("catkeeper_media_substitutions_total", "kind" => "image", "reason" => "fetch")
                    .increment(1);
                Relayed {
                    media: Media {
                        bytes: Bytes::from_static(PLACEHOLDER_IMAGE),
                        content_type: "image/png".to_string(),
                    },
                    substituted: true,
                }
            }
        }
    }

    /// Copies `asset` into durable storage under `key`.
    ///
    /// An asset that already has a persisted URL, or a key that already exists,
    /// is not uploaded again.
    pub async fn persist(
        &self,
        asset: &mut MediaAsset,
        key: &str,
        kind: MediaKind,
    ) -> Result<Rehosted, GenerationError> {
        let rehosted = self.persist_inner(asset, key, kind).await?;
        metrics::counter!("catkeeper_rehost_total", "kind" => kind.as_str(), "outcome" => rehosted.outcome.as_str())
            .increment(1);
        Ok(rehosted)
    }

    async fn persist_inner(
        &self,
        asset: &mut MediaAsset,
        key: &str,
        kind: MediaKind,
    ) -> Result<Rehosted, GenerationError> {
        if let Some(url) = &asset.persisted_url {
            return Ok(Rehosted {
                url: url.clone(),
                outcome: RehostOutcome::AlreadyStored,
            });
        }

        let exists = self
            .store
            .exists(key)
            .await
            .map_err(|e| GenerationError::Persistence(e.to_string()))?;
        if exists {
            let url = self.store.public_url(key);
            tracing::debug!(object = %key, "object already stored, skipping upload");
            asset.persisted_url = Some(url.clone());
            return Ok(Rehosted {
                url,
                outcome: RehostOutcome::AlreadyStored,
            });
        }

        let media = match self.fetch(&asset.source_url).await {
            Ok(media) => media,
            Err(e) => {
                tracing::warn!(
                    substituted = "placeholder",
                    kind = kind.as_str(),
                    error = %e,
                    "source media unavailable, using placeholder url"
                );
                metrics::counter!("catkeeper_media_substitutions_total", "kind" => kind.as_str(), "reason" => "fetch")
                    .increment(1);
                let url = match kind {
                    MediaKind::Image => PLACEHOLDER_IMAGE_URL,
                    MediaKind::Video => SAMPLE_VIDEO_URL,
                };
                return Ok(Rehosted {
                    url: url.to_string(),
                    outcome: RehostOutcome::SourceUnavailable,
                });
            }
        };

        let content_type = if media.content_type == OCTET_STREAM {
            kind.default_content_type().to_string()
        } else {
            media.content_type
        };

        match self.store.put(key, media.bytes, &content_type).await {
            Ok(()) => {
                let url = self.store.public_url(key);
                asset.persisted_url = Some(url.clone());
                asset.content_type = Some(content_type);
                Ok(Rehosted {
                    url,
                    outcome: RehostOutcome::Stored,
                })
            }
            Err(StorageError::PolicyRejected(reason)) => {
                tracing::warn!(
                    substituted = "fallback_url",
                    kind = kind.as_str(),
                    reason = %reason,
                    "storage policy rejected upload, using fallback url"
                );
                metrics::counter!("catkeeper_media_substitutions_total", "kind" => kind.as_str(), "reason" => "policy")
                    .increment(1);
                Ok(Rehosted {
                    url: fallback_url(kind, &asset.source_url),
                    outcome: RehostOutcome::PolicyFallback,
                })
            }
            Err(e) => Err(GenerationError::Persistence(e.to_string())),
        }
    }
}
