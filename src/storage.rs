use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use google_cloud_storage::client::Client as GcsClient;
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};

/// Durable object storage for re-hosted media.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Never overwrites: callers check `exists` first.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Long-lived URL for an object. Does not check that it exists.
    fn public_url(&self, key: &str) -> String;
}

pub struct GcsStore {
    client: GcsClient,
    bucket: String,
    public_base_url: String,
}

impl GcsStore {
    pub fn new(client: GcsClient, bucket: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

fn classify(e: google_cloud_storage::http::Error) -> StorageError {
    match &e {
        google_cloud_storage::http::Error::Response(resp) if resp.code == 401 || resp.code == 403 => {
            StorageError::PolicyRejected(resp.message.clone())
        }
        _ => StorageError::Backend(e.to_string()),
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };
        match self.client.get_object(&request).await {
            Ok(_) => Ok(true),
            Err(google_cloud_storage::http::Error::Response(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(classify(e)),
        }
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
        let upload_type = UploadType::Simple(Media {
            name: key.to_string().into(),
            content_type: content_type.to_string().into(),
            content_length: Some(data.len() as u64),
        });

        self.client
            .upload_object(
                &UploadObjectRequest {
                    bucket: self.bucket.clone(),
                    ..Default::default()
                },
                data,
                &upload_type,
            )
            .await
            .map_err(classify)?;

        tracing::info!(bucket = %self.bucket, object = %key, "uploaded object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object(&DeleteObjectRequest {
                bucket: self.bucket.clone(),
                object: key.to_string(),
                ..Default::default()
            })
            .await
            .map_err(classify)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket, key)
    }
}
