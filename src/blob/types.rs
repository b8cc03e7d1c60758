//! Blob store config and client creation

use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};

pub type BlobResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// S3-compatible endpoint, e.g. `http://127.0.0.1:9000`
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Permanent bucket holding the original dataset objects
    pub bucket: String,
    /// Temporary bucket holding watermarked per-buyer copies
    pub temp_bucket: String,
}

/// Client for the two-bucket dataset layout.
#[derive(Clone)]
pub struct BlobStore {
    pub(crate) client: Client,
    pub(crate) bucket: String,
    pub(crate) temp_bucket: String,
}

impl BlobStore {
    pub fn connect(config: &BlobConfig) -> BlobStore {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "datamark-provider",
        );

        let s3_config = S3ConfigBuilder::new()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint_url)
            .force_path_style(true)
            .build();

        BlobStore {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            temp_bucket: config.temp_bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn temp_bucket(&self) -> &str {
        &self.temp_bucket
    }
}
