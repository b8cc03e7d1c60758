//! Key/value cache seam with TTL semantics
//!
//! Progress values and cached result URLs live behind this trait; production
//! deployments point it at an external cache, tests and single-process
//! setups use the in-memory implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub type CacheResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[async_trait]
pub trait KvCache: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Fetch the live value under `key`, if any.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;
}

/// In-memory TTL cache. Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let cache = MemoryCache::new();
        cache
            .set("job:1", "42".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("job:1").await.unwrap(), Some("42".to_string()));
        assert_eq!(cache.get("job:2").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("job:1", "42".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("job:1").await.unwrap(), Some("42".to_string()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("job:1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_refreshes_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("job:1", "10".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        cache
            .set("job:1", "20".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("job:1").await.unwrap(), Some("20".to_string()));
    }
}
