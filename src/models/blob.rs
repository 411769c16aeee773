//! Object storage entries

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME type assumed when storage reports none
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// One object in a storage folder listing
///
/// Identity for diffing is `name`; staleness is judged by
/// `(last_modified, size)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobObject {
    /// File name within the folder
    pub name: String,

    /// Size in bytes
    pub size: u64,

    /// Last modification time reported by storage
    pub last_modified: Option<DateTime<Utc>>,

    /// MIME type
    pub content_type: String,
}

impl BlobObject {
    /// Create a listing entry with the default content type
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Set the modification time
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Full storage path of this object under `folder`
    pub fn path(&self, folder: &str) -> String {
        join_path(folder, &self.name)
    }
}

/// A blob whose bytes have been fetched and await upload
#[derive(Debug, Clone)]
pub struct DownloadedBlob {
    /// Full storage path
    pub path: String,
    /// Object contents
    pub data: Bytes,
    /// MIME type to upload with
    pub content_type: String,
}

/// Join a folder and an object name into a storage path
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}
