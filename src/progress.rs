//! Download job progress tracking
//!
//! Progress for one paid-download job lives in the key/value cache under a
//! `(buyer, dataset)` key, TTL-bound to the lifetime of the temporary object.
//! The result URL gets its own sub-key and is only ever written once the job
//! has reached 100.

use crate::cache::{CacheResult, KvCache};
use std::sync::Arc;
use std::time::Duration;

/// Key prefix for paid-download jobs, shared by progress and URL entries
const PAID_DOWNLOAD_TASK_ID: &str = "paid_download";

/// Terminal progress of a completed job
pub const PROGRESS_DONE: i64 = 100;

/// Reserved out-of-range sentinel for a terminally failed job.
///
/// Distinct from the initial `0` written at dispatch, so a poller arriving
/// late can tell "failed" apart from "not yet advanced".
pub const PROGRESS_FAILED: i64 = -1;

/// TTL-bound progress and result-URL store for download jobs.
#[derive(Clone)]
pub struct ProgressTracker {
    cache: Arc<dyn KvCache>,
    ttl: Duration,
}

impl ProgressTracker {
    pub fn new(cache: Arc<dyn KvCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn job_key(buyer: i64, dataset: i64) -> String {
        format!("{}:{}-{}", PAID_DOWNLOAD_TASK_ID, buyer, dataset)
    }

    fn url_key(buyer: i64, dataset: i64) -> String {
        format!("{}:{}-{}:url", PAID_DOWNLOAD_TASK_ID, buyer, dataset)
    }

    /// Record job progress: 0..=100, or [`PROGRESS_FAILED`].
    pub async fn set_progress(&self, buyer: i64, dataset: i64, percent: i64) -> CacheResult<()> {
        self.cache
            .set(&Self::job_key(buyer, dataset), percent.to_string(), self.ttl)
            .await
    }

    /// Current progress, or `None` when no job is live for the key.
    pub async fn progress(&self, buyer: i64, dataset: i64) -> CacheResult<Option<i64>> {
        let value = self.cache.get(&Self::job_key(buyer, dataset)).await?;
        match value {
            Some(raw) => Ok(Some(raw.parse::<i64>()?)),
            None => Ok(None),
        }
    }

    /// Cache the presigned result URL. Callers only invoke this once the
    /// job's progress has reached [`PROGRESS_DONE`].
    pub async fn set_result_url(&self, buyer: i64, dataset: i64, url: &str) -> CacheResult<()> {
        self.cache
            .set(&Self::url_key(buyer, dataset), url.to_string(), self.ttl)
            .await
    }

    /// Previously cached result URL, if still live.
    pub async fn result_url(&self, buyer: i64, dataset: i64) -> CacheResult<Option<String>> {
        self.cache.get(&Self::url_key(buyer, dataset)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(Arc::new(MemoryCache::new()), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn progress_round_trips_per_job() {
        let t = tracker();
        t.set_progress(7, 3, 0).await.unwrap();
        t.set_progress(7, 3, 55).await.unwrap();
        assert_eq!(t.progress(7, 3).await.unwrap(), Some(55));
        assert_eq!(t.progress(7, 4).await.unwrap(), None);
    }

    #[tokio::test]
    async fn jobs_for_different_buyers_do_not_interfere() {
        let t = tracker();
        t.set_progress(1, 9, 10).await.unwrap();
        t.set_progress(2, 9, 90).await.unwrap();
        assert_eq!(t.progress(1, 9).await.unwrap(), Some(10));
        assert_eq!(t.progress(2, 9).await.unwrap(), Some(90));
    }

    #[tokio::test]
    async fn failed_sentinel_survives_round_trip() {
        let t = tracker();
        t.set_progress(5, 5, PROGRESS_FAILED).await.unwrap();
        assert_eq!(t.progress(5, 5).await.unwrap(), Some(PROGRESS_FAILED));
    }

    #[tokio::test]
    async fn url_slot_is_separate_from_progress() {
        let t = tracker();
        t.set_progress(1, 1, PROGRESS_DONE).await.unwrap();
        assert_eq!(t.result_url(1, 1).await.unwrap(), None);
        t.set_result_url(1, 1, "https://example.com/tmp/obj")
            .await
            .unwrap();
        assert_eq!(
            t.result_url(1, 1).await.unwrap(),
            Some("https://example.com/tmp/obj".to_string())
        );
        assert_eq!(t.progress(1, 1).await.unwrap(), Some(PROGRESS_DONE));
    }
}
