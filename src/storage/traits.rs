//! Blob store trait
//!
//! Defines the object-storage operations the sync engine needs from one
//! environment's bucket.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;
use crate::models::BlobObject;

/// Object storage for a single bucket
///
/// Paths are `folder/name`, relative to the bucket root.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// List the objects directly inside `folder`
    ///
    /// Sub-folders are not listed. A folder that does not exist lists as empty.
    async fn list(&self, folder: &str) -> Result<Vec<BlobObject>, StorageError>;

    /// Fetch the contents of an object
    async fn download(&self, path: &str) -> Result<Bytes, StorageError>;

    /// Create an object
    ///
    /// Never overwrites: an existing object at `path` yields
    /// [`StorageError::Duplicate`].
    async fn upload(&self, path: &str, data: Bytes, content_type: &str)
        -> Result<(), StorageError>;

    /// Remove several objects in one call
    ///
    /// Paths that do not exist are ignored.
    async fn remove(&self, paths: &[String]) -> Result<(), StorageError>;
}
