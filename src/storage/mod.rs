//! Durable blob storage used as a plain byte bucket.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

pub mod s3;

pub use s3::S3BlobStore;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found")]
    NotFound,

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bucket and key of one stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobLocation {
    pub bucket: String,
    pub key: String,
}

impl BlobLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// `s3://bucket/key` form understood by AWS services
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Key/value object store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, location: &BlobLocation, body: Vec<u8>, content_type: &str)
        -> StorageResult<()>;

    /// Upload a local file
    async fn put_file(
        &self,
        location: &BlobLocation,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()> {
        let body = tokio::fs::read(path).await?;
        self.put(location, body, content_type).await
    }

    async fn get(&self, location: &BlobLocation) -> StorageResult<Vec<u8>>;

    async fn delete(&self, location: &BlobLocation) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_location_uri() {
        let location = BlobLocation::new("raw-audio", "audio/abc_1234.mp3");
        assert_eq!(location.uri(), "s3://raw-audio/audio/abc_1234.mp3");
        assert_eq!(location.to_string(), location.uri());
    }

    #[test]
    fn test_storage_error_messages_omit_keys() {
        assert_eq!(StorageError::NotFound.to_string(), "Object not found");
        assert_eq!(
            StorageError::UploadFailed("AccessDenied".into()).to_string(),
            "Upload failed: AccessDenied"
        );
    }
}
