//! Presigned URL generation

use super::types::{BlobResult, BlobStore};
use aws_sdk_s3::presigning::PresigningConfig;
use std::time::Duration;

impl BlobStore {
    fn presigning(expires_in: Duration) -> BlobResult<PresigningConfig> {
        Ok(PresigningConfig::builder().expires_in(expires_in).build()?)
    }

    /// Presigned GET for an object in the permanent bucket.
    pub async fn download_url(&self, object_name: &str, expires_in: Duration) -> BlobResult<String> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_name)
            .presigned(Self::presigning(expires_in)?)
            .await?;
        Ok(request.uri().to_string())
    }

    /// Presigned GET for a watermarked copy in the temporary bucket.
    pub async fn temp_download_url(
        &self,
        object_name: &str,
        expires_in: Duration,
    ) -> BlobResult<String> {
        let request = self
            .client
            .get_object()
            .bucket(&self.temp_bucket)
            .key(object_name)
            .presigned(Self::presigning(expires_in)?)
            .await?;
        Ok(request.uri().to_string())
    }

    /// Presigned PUT for uploading a dataset object to the permanent bucket.
    pub async fn upload_url(&self, object_name: &str, expires_in: Duration) -> BlobResult<String> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object_name)
            .presigned(Self::presigning(expires_in)?)
            .await?;
        Ok(request.uri().to_string())
    }

    /// Presigned PUT for streaming a watermarked copy into the temporary bucket.
    pub async fn temp_upload_url(
        &self,
        object_name: &str,
        expires_in: Duration,
    ) -> BlobResult<String> {
        let request = self
            .client
            .put_object()
            .bucket(&self.temp_bucket)
            .key(object_name)
            .presigned(Self::presigning(expires_in)?)
            .await?;
        Ok(request.uri().to_string())
    }

    /// Presigned URL for uploading one part of a multipart upload.
    pub async fn part_upload_url(
        &self,
        object_name: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> BlobResult<String> {
        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(object_name)
            .upload_id(upload_id)
            .part_number(part_number)
            .presigned(Self::presigning(expires_in)?)
            .await?;
        Ok(request.uri().to_string())
    }
}
