//! Supabase Storage implementation of the BlobStore trait

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use super::traits::BlobStore;
use crate::error::StorageError;
use crate::http_client::{check_storage_response, storage_send_error, SupabaseClient};
use crate::models::{join_path, BlobObject, DEFAULT_CONTENT_TYPE};

/// One entry of a storage listing
#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    /// Folders have no object id
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<ObjectMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMetadata {
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default, rename = "lastModified")]
    last_modified: Option<DateTime<Utc>>,
}

impl ListedObject {
    fn into_blob(self) -> Option<BlobObject> {
        self.id.as_ref()?;
        let metadata = self.metadata.unwrap_or_default();
        let mut blob = BlobObject::new(self.name, metadata.size.unwrap_or(0)).with_content_type(
            metadata
                .mimetype
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        );
        if let Some(at) = metadata.last_modified.or(self.updated_at) {
            blob = blob.with_last_modified(at);
        }
        Some(blob)
    }
}

/// Blob store backed by one Supabase Storage bucket
pub struct SupabaseStorage {
    client: SupabaseClient,
    bucket: String,
    page_size: usize,
}

impl SupabaseStorage {
    /// Create a store for `bucket` in the given project
    pub fn new(client: SupabaseClient, bucket: impl Into<String>, page_size: usize) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            page_size: page_size.max(1),
        }
    }

    fn object_url(&self, path: &str) -> String {
        self.client
            .endpoint(&format!("storage/v1/object/{}", join_path(&self.bucket, path)))
    }
}

#[async_trait]
impl BlobStore for SupabaseStorage {
    async fn list(&self, folder: &str) -> Result<Vec<BlobObject>, StorageError> {
        let url = self
            .client
            .endpoint(&format!("storage/v1/object/list/{}", self.bucket));
        let prefix = folder.trim_matches('/');
        let mut objects = Vec::new();
        let mut offset = 0usize;

        loop {
            let body = serde_json::json!({
                "prefix": prefix,
                "limit": self.page_size,
                "offset": offset,
                "sortBy": {"column": "name", "order": "asc"},
            });
            let response = self
                .client
                .http()
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(storage_send_error)?;

            let page: Vec<ListedObject> = check_storage_response(response, prefix)
                .await?
                .json()
                .await
                .map_err(|e| StorageError::InvalidData(e.to_string()))?;

            let fetched = page.len();
            objects.extend(page.into_iter().filter_map(ListedObject::into_blob));

            if fetched < self.page_size {
                break;
            }
            offset += fetched;
        }

        debug!(bucket = %self.bucket, folder = prefix, objects = objects.len(), "Listed folder");
        Ok(objects)
    }

    async fn download(&self, path: &str) -> Result<Bytes, StorageError> {
        let response = self
            .client
            .http()
            .get(self.object_url(path))
            .send()
            .await
            .map_err(storage_send_error)?;

        check_storage_response(response, path)
            .await?
            .bytes()
            .await
            .map_err(storage_send_error)
    }

    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = data.len();
        let response = self
            .client
            .http()
            .post(self.object_url(path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await
            .map_err(storage_send_error)?;
        check_storage_response(response, path).await?;

        debug!(path = path, size = size, "Uploaded object");
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        if paths.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .http()
            .delete(
                self.client
                    .endpoint(&format!("storage/v1/object/{}", self.bucket)),
            )
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(storage_send_error)?;
        check_storage_response(response, &self.bucket).await?;

        debug!(bucket = %self.bucket, removed = paths.len(), "Removed objects");
        Ok(())
    }
}
