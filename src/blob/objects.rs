//! Object operations (streaming reads, deletes, listing)

use super::types::{BlobResult, BlobStore};
use tokio::io::{AsyncBufRead, BufReader};

impl BlobStore {
    /// Streaming reader over a dataset object, plus its size when the store
    /// reports one.
    pub async fn dataset_reader(
        &self,
        object_name: &str,
    ) -> BlobResult<(impl AsyncBufRead + Unpin + Send, Option<i64>)> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_name)
            .send()
            .await?;

        let size = response.content_length();
        Ok((BufReader::new(response.body.into_async_read()), size))
    }

    /// Delete an object from the permanent bucket. Deleting an absent object
    /// succeeds, so retries stay idempotent.
    pub async fn delete_object(&self, object_name: &str) -> BlobResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_name)
            .send()
            .await?;
        Ok(())
    }

    /// Delete a watermarked copy from the temporary bucket.
    pub async fn delete_temp_object(&self, object_name: &str) -> BlobResult<()> {
        self.client
            .delete_object()
            .bucket(&self.temp_bucket)
            .key(object_name)
            .send()
            .await?;
        Ok(())
    }

    /// Keys of all objects currently in the temporary bucket.
    pub async fn list_temp_objects(&self) -> BlobResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.temp_bucket)
                .max_keys(1000);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await?;
            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(String::from);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(keys)
    }
}
