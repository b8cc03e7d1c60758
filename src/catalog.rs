//! Catalog operations: registration, uploads, purchases, delete/restore
//!
//! Hosts the transactional outbox integration. Deleting a dataset soft
//! deletes the row and records one outbox task per external store in the
//! same transaction; restoring compensates by clearing the mark and
//! cancelling whichever of those tasks is still pending.

use crate::blob::BlobStore;
use crate::db::{datasets, outbox, Db, EventType, TaskPayload, Tx};
use crate::db::datasets::NewDataset;
use crate::preview::{PreviewDoc, PreviewStore};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Seller- and admin-facing catalog surface.
pub struct CatalogService {
    db: Db,
    blob: BlobStore,
    previews: Arc<dyn PreviewStore>,
    url_ttl: Duration,
}

impl CatalogService {
    pub fn new(db: Db, blob: BlobStore, previews: Arc<dyn PreviewStore>, url_ttl: Duration) -> Self {
        Self {
            db,
            blob,
            previews,
            url_ttl,
        }
    }

    /// Register a dataset row after its object upload completed; returns the id.
    pub async fn register_dataset(&self, dataset: &NewDataset) -> Result<i64, String> {
        let dataset_id = self
            .db
            .insert_dataset(dataset)
            .await
            .map_err(|e| format!("Failed to register dataset: {}", e))?;
        info!(
            "dataset_registered: {} object={}",
            dataset_id, dataset.object_name
        );
        Ok(dataset_id)
    }

    pub async fn save_preview(&self, doc: PreviewDoc) -> Result<(), String> {
        self.previews
            .insert_preview(doc)
            .await
            .map_err(|e| format!("Failed to save preview: {}", e))
    }

    pub async fn preview(&self, object_name: &str) -> Result<Option<PreviewDoc>, String> {
        self.previews
            .preview(object_name)
            .await
            .map_err(|e| format!("Failed to load preview: {}", e))
    }

    /// Record a confirmed purchase; returns the timestamp later embedded in
    /// the buyer's watermarked copy.
    pub async fn record_purchase(&self, buyer_id: i64, dataset_id: i64) -> Result<i64, String> {
        if self
            .db
            .dataset(dataset_id)
            .await
            .map_err(|e| format!("Failed to look up dataset: {}", e))?
            .is_none()
        {
            return Err(format!("Dataset {} not found", dataset_id));
        }

        let purchased_at = chrono::Utc::now().timestamp();
        self.db
            .record_purchase(buyer_id, dataset_id, purchased_at)
            .await
            .map_err(|e| format!("Failed to record purchase: {}", e))?;
        info!(
            "purchase_recorded: {}-{} purchased_at={}",
            buyer_id, dataset_id, purchased_at
        );
        Ok(purchased_at)
    }

    /// Presigned single-shot PUT for uploading a dataset object.
    pub async fn upload_url(&self, object_name: &str) -> Result<String, String> {
        self.blob
            .upload_url(object_name, self.url_ttl)
            .await
            .map_err(|e| format!("Failed to presign upload: {}", e))
    }

    pub async fn initiate_multipart_upload(&self, object_name: &str) -> Result<String, String> {
        self.blob
            .initiate_multipart_upload(object_name)
            .await
            .map_err(|e| format!("Failed to initiate multipart upload: {}", e))
    }

    pub async fn part_upload_url(
        &self,
        object_name: &str,
        upload_id: &str,
        part_number: i32,
    ) -> Result<String, String> {
        self.blob
            .part_upload_url(object_name, upload_id, part_number, self.url_ttl)
            .await
            .map_err(|e| format!("Failed to presign part upload: {}", e))
    }

    pub async fn complete_multipart_upload(
        &self,
        object_name: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<(), String> {
        self.blob
            .complete_multipart_upload(object_name, upload_id, parts)
            .await
            .map_err(|e| format!("Failed to complete multipart upload: {}", e))
    }

    pub async fn abort_multipart_upload(
        &self,
        object_name: &str,
        upload_id: &str,
    ) -> Result<(), String> {
        self.blob
            .abort_multipart_upload(object_name, upload_id)
            .await
            .map_err(|e| format!("Failed to abort multipart upload: {}", e))
    }

    /// Record a free download and hand out a presigned GET on the original
    /// object. Free datasets carry no watermark.
    pub async fn free_download_url(&self, buyer_id: i64, dataset_id: i64) -> Result<String, String> {
        let record = self
            .db
            .dataset(dataset_id)
            .await
            .map_err(|e| format!("Failed to look up dataset: {}", e))?
            .ok_or_else(|| format!("Dataset {} not found", dataset_id))?;
        if !record.is_free {
            return Err(format!("Dataset {} is not free", dataset_id));
        }

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

        self.blob
            .download_url(&record.object_name, self.url_ttl)
            .await
            .map_err(|e| format!("Failed to presign download: {}", e))
    }

    /// Soft delete a dataset and enqueue the external-store deletions.
    ///
    /// Row mutation and both outbox tasks commit atomically; the actual blob
    /// and preview deletions happen later, when a relay sweep drains them.
    pub async fn delete_dataset(&self, dataset_id: i64) -> Result<(), String> {
        let conn = self.db.lock().await;
        let tx = Tx::begin(&conn)
            .await
            .map_err(|e| format!("Failed to begin transaction: {}", e))?;

        let object_name = match datasets::object_name_tx(tx.conn(), dataset_id).await {
            Ok(name) => name,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(format!("Failed to look up dataset: {}", e));
            }
        };
        if let Err(e) = datasets::soft_delete_tx(&tx, dataset_id).await {
            let _ = tx.rollback().await;
            return Err(format!("Failed to delete dataset: {}", e));
        }

        let payload = TaskPayload {
            object_name: object_name.clone(),
        };
        for event_type in [EventType::DeleteObject, EventType::DeletePreview] {
            if let Err(e) = outbox::insert_task_tx(&tx, event_type, &payload).await {
                let _ = tx.rollback().await;
                return Err(format!("Failed to enqueue {} task: {}", event_type, e));
            }
        }

        tx.commit()
            .await
            .map_err(|e| format!("Failed to commit delete: {}", e))?;
        info!("dataset_deleted: {} object={}", dataset_id, object_name);
        Ok(())
    }

    /// Restore a soft-deleted dataset and cancel its still-pending deletion
    /// tasks. A task a sweep already completed stays done; restore only
    /// prevents deletions that have not happened yet.
    pub async fn restore_dataset(&self, dataset_id: i64) -> Result<(), String> {
        let conn = self.db.lock().await;
        let tx = Tx::begin(&conn)
            .await
            .map_err(|e| format!("Failed to begin transaction: {}", e))?;

        let object_name = match datasets::object_name_tx(tx.conn(), dataset_id).await {
            Ok(name) => name,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(format!("Failed to look up dataset: {}", e));
            }
        };
        if let Err(e) = datasets::restore_tx(&tx, dataset_id).await {
            let _ = tx.rollback().await;
            return Err(format!("Failed to restore dataset: {}", e));
        }

        for event_type in [EventType::DeleteObject, EventType::DeletePreview] {
            match outbox::cancel_task_tx(&tx, event_type, &object_name).await {
                Ok(cancelled) => {
                    debug!(
                        "outbox_task_cancelled: {} event_type={} cancelled={}",
                        dataset_id, event_type, cancelled
                    );
                }
                Err(e) => {
                    let _ = tx.rollback().await;
                    return Err(format!("Failed to cancel {} task: {}", event_type, e));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| format!("Failed to commit restore: {}", e))?;
        info!("dataset_restored: {} object={}", dataset_id, object_name);
        Ok(())
    }

    /// Delete temporary-bucket copies older than `max_age`.
    ///
    /// The upload timestamp rides in the object name as its last `_`-separated
    /// segment (extension stripped); names that do not parse are left alone.
    pub async fn cleanup_temp_objects(&self, max_age: Duration) -> Result<usize, String> {
        let keys = self
            .blob
            .list_temp_objects()
            .await
            .map_err(|e| format!("Failed to list temporary objects: {}", e))?;

        let now = chrono::Utc::now().timestamp();
        let mut removed = 0;
        for key in keys {
            let Some(uploaded_at) = object_timestamp(&key) else {
                continue;
            };
            let age = now.saturating_sub(uploaded_at);
            if age < max_age.as_secs() as i64 {
                continue;
            }
            match self.blob.delete_temp_object(&key).await {
                Ok(()) => {
                    removed += 1;
                    debug!("temp_object_removed: {} age_secs={}", key, age);
                }
                Err(e) => warn!("temp_cleanup_failed: {} error={}", key, e),
            }
        }

        if removed > 0 {
            info!("temp_cleanup_done: removed={}", removed);
        }
        Ok(removed)
    }
}

/// Unix timestamp encoded in an object name like `7_42_1700000000.jsonl`.
fn object_timestamp(key: &str) -> Option<i64> {
    let segment = key.rsplit('_').next()?;
    let digits = segment.split('.').next().unwrap_or(segment);
    digits.parse::<i64>().ok()
}
