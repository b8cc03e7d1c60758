//! Paid-download orchestration: start, poll, cancel

use super::types::{DownloadPoll, StartOutcome};
use super::worker;
use crate::blob::BlobStore;
use crate::db::{datasets, Db, Tx};
use crate::progress::{ProgressTracker, PROGRESS_DONE};
use log::{info, warn};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Live pipeline entry. The id distinguishes a job from one that later
/// superseded it under the same key.
struct JobHandle {
    id: u64,
    cancel: CancellationToken,
}

/// Entry point for buyer-facing paid downloads.
///
/// One job per `(buyer, dataset)` pair is live at a time; starting again
/// while a pipeline runs cancels the previous run and the new job takes
/// over the progress key.
pub struct DownloadService {
    db: Db,
    blob: BlobStore,
    tracker: ProgressTracker,
    http: reqwest::Client,
    url_ttl: Duration,
    jobs: Arc<Mutex<HashMap<String, JobHandle>>>,
    next_job_id: AtomicU64,
}

impl DownloadService {
    pub fn new(db: Db, blob: BlobStore, tracker: ProgressTracker, url_ttl: Duration) -> Self {
        Self {
            db,
            blob,
            tracker,
            http: reqwest::Client::new(),
            url_ttl,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_job_id: AtomicU64::new(0),
        }
    }

    fn job_key(buyer_id: i64, dataset_id: i64) -> String {
        format!("{}-{}", buyer_id, dataset_id)
    }

    /// Start (or short-circuit) a paid download for a purchased dataset.
    ///
    /// Returns [`StartOutcome::Ready`] when a watermarked copy from an
    /// earlier run is still live in the cache; otherwise records the
    /// download, dispatches the pipeline, and returns the temporary object
    /// name to poll with.
    pub async fn start_paid_download(
        &self,
        buyer_id: i64,
        dataset_id: i64,
    ) -> Result<StartOutcome, String> {
        // A cached URL means a still-valid copy already exists
        let cached = self
            .tracker
            .result_url(buyer_id, dataset_id)
            .await
            .map_err(|e| format!("Failed to read cached result: {}", e))?;
        if let Some(url) = cached {
            info!("paid_download_cached: {}-{}", buyer_id, dataset_id);
            return Ok(StartOutcome::Ready(url));
        }

        let (object_name, file_size) = self
            .db
            .dataset_object(dataset_id)
            .await
            .map_err(|e| format!("Failed to look up dataset: {}", e))?;
        let purchased_at = self
            .db
            .purchase_timestamp(buyer_id, dataset_id)
            .await
            .map_err(|e| format!("Failed to look up purchase: {}", e))?;

        {
            let conn = self.db.lock().await;
            let tx = Tx::begin(&conn)
                .await
                .map_err(|e| format!("Failed to begin transaction: {}", e))?;
            if let Err(e) = datasets::add_download_record_tx(&tx, buyer_id, dataset_id).await {
                let _ = tx.rollback().await;
                return Err(format!("Failed to record download: {}", e));
            }
            if let Err(e) = datasets::bump_download_count_tx(&tx, dataset_id).await {
                let _ = tx.rollback().await;
                return Err(format!("Failed to bump download count: {}", e));
            }
            tx.commit()
                .await
                .map_err(|e| format!("Failed to commit download record: {}", e))?;
        }

        let (source, size_hint) = self
            .blob
            .dataset_reader(&object_name)
            .await
            .map_err(|e| format!("Failed to open dataset object: {}", e))?;
        let effective_size = if file_size > 0 {
            file_size
        } else {
            size_hint.unwrap_or(0)
        };

        let temp_object = format!("{}_{}", buyer_id, object_name);
        let upload_url = self
            .blob
            .temp_upload_url(&temp_object, self.url_ttl)
            .await
            .map_err(|e| format!("Failed to presign upload: {}", e))?;

        self.tracker
            .set_progress(buyer_id, dataset_id, 0)
            .await
            .map_err(|e| format!("Failed to initialize progress: {}", e))?;

        let cancel = CancellationToken::new();
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let key = Self::job_key(buyer_id, dataset_id);
        {
            let mut jobs = self.jobs.lock().await;
            if let Some(previous) = jobs.insert(
                key.clone(),
                JobHandle {
                    id: job_id,
                    cancel: cancel.clone(),
                },
            ) {
                // Superseded: the old pipeline stops, this job owns the key
                warn!("paid_download_superseded: {}-{}", buyer_id, dataset_id);
                previous.cancel.cancel();
            }
        }

        let (tx, rx) = mpsc::channel::<io::Result<Vec<u8>>>(1);
        tokio::spawn(worker::run_producer(
            source,
            purchased_at.to_string(),
            effective_size,
            tx,
            self.tracker.clone(),
            buyer_id,
            dataset_id,
            cancel.clone(),
        ));
        let jobs = Arc::clone(&self.jobs);
        let uploader = worker::run_uploader(
            self.http.clone(),
            upload_url,
            rx,
            self.tracker.clone(),
            buyer_id,
            dataset_id,
            cancel,
        );
        tokio::spawn(async move {
            uploader.await;
            // Drop the registry entry once the pipeline is terminal, unless
            // a newer job has taken over the key
            let mut jobs = jobs.lock().await;
            if jobs.get(&key).is_some_and(|job| job.id == job_id) {
                jobs.remove(&key);
            }
        });

        info!(
            "paid_download_started: {}-{} object={}",
            buyer_id, dataset_id, temp_object
        );
        Ok(StartOutcome::Started(temp_object))
    }

    /// Poll the job for `(buyer, dataset)`; `object_name` is the temporary
    /// object returned at start. The result URL is presigned once, on the
    /// first poll that observes 100, then served from the cache.
    pub async fn poll_download(
        &self,
        buyer_id: i64,
        dataset_id: i64,
        object_name: &str,
    ) -> Result<DownloadPoll, String> {
        let progress = self
            .tracker
            .progress(buyer_id, dataset_id)
            .await
            .map_err(|e| format!("Failed to read progress: {}", e))?
            .ok_or_else(|| {
                format!(
                    "No download job in flight for buyer {} dataset {}",
                    buyer_id, dataset_id
                )
            })?;

        if progress != PROGRESS_DONE {
            return Ok(DownloadPoll {
                progress,
                url: None,
            });
        }

        let cached = self
            .tracker
            .result_url(buyer_id, dataset_id)
            .await
            .map_err(|e| format!("Failed to read cached result: {}", e))?;
        let url = match cached {
            Some(url) => url,
            None => {
                let url = self
                    .blob
                    .temp_download_url(object_name, self.url_ttl)
                    .await
                    .map_err(|e| format!("Failed to presign download: {}", e))?;
                self.tracker
                    .set_result_url(buyer_id, dataset_id, &url)
                    .await
                    .map_err(|e| format!("Failed to cache result: {}", e))?;
                url
            }
        };

        Ok(DownloadPoll {
            progress,
            url: Some(url),
        })
    }

    /// Cancel the live job for `(buyer, dataset)`; true when one was live.
    pub async fn cancel_download(&self, buyer_id: i64, dataset_id: i64) -> bool {
        let mut jobs = self.jobs.lock().await;
        match jobs.remove(&Self::job_key(buyer_id, dataset_id)) {
            Some(job) => {
                job.cancel.cancel();
                info!("paid_download_cancelled: {}-{}", buyer_id, dataset_id);
                true
            }
            None => false,
        }
    }
}
