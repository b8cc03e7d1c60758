//! Upload operations (multipart primitives, chunked streaming PUT)

use super::types::{BlobResult, BlobStore};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use log::debug;

impl BlobStore {
    /// Initiate a multipart upload into the permanent bucket.
    pub async fn initiate_multipart_upload(&self, object_name: &str) -> BlobResult<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(object_name)
            .content_type("application/octet-stream")
            .send()
            .await?;

        let upload_id = response
            .upload_id()
            .ok_or("No upload ID returned")?
            .to_string();
        Ok(upload_id)
    }

    /// Complete a multipart upload from `(part_number, etag)` pairs.
    pub async fn complete_multipart_upload(
        &self,
        object_name: &str,
        upload_id: &str,
        mut parts: Vec<(i32, String)>,
    ) -> BlobResult<()> {
        parts.sort_by_key(|(part_number, _)| *part_number);

        let completed_parts: Vec<CompletedPart> = parts
            .into_iter()
            .map(|(part_number, etag)| {
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build()
            })
            .collect();

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(object_name)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await?;
        Ok(())
    }

    pub async fn abort_multipart_upload(
        &self,
        object_name: &str,
        upload_id: &str,
    ) -> BlobResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(object_name)
            .upload_id(upload_id)
            .send()
            .await?;
        Ok(())
    }
}

/// Stream `body` to a presigned PUT URL as one object of unknown length.
///
/// No content-length header is set, so the transfer goes out chunked; the
/// destination must support incremental writes. An error item inside the
/// body stream aborts the request mid-transfer and the destination never
/// commits a complete object.
pub async fn stream_put(
    client: &reqwest::Client,
    upload_url: &str,
    body: reqwest::Body,
) -> BlobResult<()> {
    let response = client.put(upload_url).body(body).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(format!("streaming put failed: {} - {}", status, text).into());
    }
    debug!("stream_put_done: status_confirmed");
    Ok(())
}
