//! Filesystem-based blob store
//!
//! Each object is stored as a file below the root directory, with its MIME
//! type kept in an accompanying `.meta.json` file.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::traits::BlobStore;
use crate::error::StorageError;
use crate::models::{BlobObject, DEFAULT_CONTENT_TYPE};

const META_SUFFIX: &str = ".meta.json";

/// Sidecar metadata stored next to each object
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMeta {
    content_type: String,
}

/// Blob store rooted at a local directory
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a storage path below the root, refusing to escape it
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::InvalidData(format!(
                "path escapes storage root: {}",
                path
            )));
        }
        Ok(self.root.join(relative))
    }

    fn meta_path(data_path: &Path) -> PathBuf {
        let mut name = data_path.as_os_str().to_owned();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }

    async fn read_content_type(data_path: &Path) -> String {
        match fs::read_to_string(Self::meta_path(data_path)).await {
            Ok(raw) => serde_json::from_str::<StoredMeta>(&raw)
                .map(|m| m.content_type)
                .unwrap_or_else(|_| DEFAULT_CONTENT_TYPE.to_string()),
            Err(_) => DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for FilesystemStore {
    async fn list(&self, folder: &str) -> Result<Vec<BlobObject>, StorageError> {
        let dir = self.resolve(folder)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.ends_with(META_SUFFIX) {
                continue;
            }

            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }

            let mut object = BlobObject::new(file_name, meta.len())
                .with_content_type(Self::read_content_type(&entry.path()).await);
            if let Ok(modified) = meta.modified() {
                object = object.with_last_modified(DateTime::<Utc>::from(modified));
            }
            objects.push(object);
        }

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    async fn download(&self, path: &str) -> Result<Bytes, StorageError> {
        let data_path = self.resolve(path)?;
        match fs::read(&data_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let data_path = self.resolve(path)?;

        // Ensure parent directory exists
        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&data_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::Duplicate(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&data).await?;
        file.flush().await?;

        let meta = StoredMeta {
            content_type: content_type.to_string(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        fs::write(Self::meta_path(&data_path), meta_json).await?;

        debug!(path = path, size = data.len(), "Stored object");
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        for path in paths {
            let data_path = self.resolve(path)?;
            for target in [Self::meta_path(&data_path), data_path] {
                match fs::remove_file(&target).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}
