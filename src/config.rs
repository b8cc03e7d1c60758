//! JSON configuration loading

use crate::blob::BlobConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type ConfigResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path of the relational store database file
    pub db_path: PathBuf,
    pub blob: BlobConfig,
    /// Lifetime of presigned URLs and of cached job state
    #[serde(default = "default_url_ttl_minutes")]
    pub url_ttl_minutes: u64,
    /// Temporary copies older than this are removed by cleanup
    #[serde(default = "default_temp_max_age_hours")]
    pub temp_max_age_hours: u64,
}

fn default_url_ttl_minutes() -> u64 {
    60
}

fn default_temp_max_age_hours() -> u64 {
    24
}

impl Config {
    pub async fn load(path: &Path) -> ConfigResult<Config> {
        let raw = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_minutes * 60)
    }

    pub fn temp_max_age(&self) -> Duration {
        Duration::from_secs(self.temp_max_age_hours * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_parses_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            r#"{
                "db_path": "/var/lib/datamark/datamark.db",
                "blob": {
                    "endpoint_url": "http://127.0.0.1:9000",
                    "region": "auto",
                    "access_key_id": "key",
                    "secret_access_key": "secret",
                    "bucket": "datasets",
                    "temp_bucket": "datasets-temp"
                },
                "url_ttl_minutes": 30
            }"#,
        )
        .await
        .unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.blob.bucket, "datasets");
        assert_eq!(config.url_ttl(), Duration::from_secs(1800));
        // Defaults fill omitted fields
        assert_eq!(config.temp_max_age(), Duration::from_secs(24 * 3600));
    }

    #[tokio::test]
    async fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{\"db_path\": ").await.unwrap();
        assert!(Config::load(&path).await.is_err());
    }
}
