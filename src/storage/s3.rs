use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::path::Path;
use tracing::{debug, info};

use super::{BlobLocation, BlobStore, StorageError, StorageResult};

/// [`BlobStore`] backed by Amazon S3
#[derive(Clone)]
pub struct S3BlobStore {
    client: S3Client,
}

impl S3BlobStore {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: S3Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        location: &BlobLocation,
        body: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} bytes to {}", body.len(), location);

        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn put_file(
        &self,
        location: &BlobLocation,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded {} to {}", path.display(), location);
        Ok(())
    }

    async fn get(&self, location: &BlobLocation) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", location);

        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|s| s.is_no_such_key()).unwrap_or(false) {
                    StorageError::NotFound
                } else {
                    StorageError::DownloadFailed(DisplayErrorContext(&e).to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn delete(&self, location: &BlobLocation) -> StorageResult<()> {
        debug!("Deleting {}", location);

        self.client
            .delete_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}
