//! Outbox relay - sweep-driven executor for cross-store side effects
//!
//! Deleting a dataset touches the relational store, the blob store, and the
//! preview document store, which cannot be updated in one atomic operation.
//! The domain transaction records an outbox task per side effect; the sweep
//! drains pending tasks at-least-once. Side effects are idempotent, so a
//! task that runs twice (crash after execute, overlapping sweeps) is safe.

use crate::blob::BlobStore;
use crate::db::{Db, EventType, OutboxTask};
use crate::preview::PreviewStore;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;

pub type StoreResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Blob-store side of the relay: delete one object by name.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Must treat a missing object as success.
    async fn delete_object(&self, object_name: &str) -> StoreResult<()>;
}

#[async_trait]
impl ObjectStore for BlobStore {
    async fn delete_object(&self, object_name: &str) -> StoreResult<()> {
        BlobStore::delete_object(self, object_name).await
    }
}

/// Executes pending outbox tasks against the external stores.
#[derive(Clone)]
pub struct OutboxRelay {
    db: Db,
    objects: Arc<dyn ObjectStore>,
    previews: Arc<dyn PreviewStore>,
}

impl OutboxRelay {
    pub fn new(db: Db, objects: Arc<dyn ObjectStore>, previews: Arc<dyn PreviewStore>) -> Self {
        Self {
            db,
            objects,
            previews,
        }
    }

    /// Drain pending tasks once; returns how many this invocation marked done.
    ///
    /// A failed side effect leaves its task pending for a future sweep -
    /// retries are unbounded and failures never surface to callers. Safe to
    /// invoke concurrently with itself: the side effects are idempotent and
    /// the done transition is conditional on the task still being pending.
    pub async fn sweep(&self) -> Result<usize, String> {
        let tasks = self
            .db
            .pending_tasks()
            .await
            .map_err(|e| format!("Failed to fetch pending tasks: {}", e))?;

        debug!("outbox_sweep_start: pending={}", tasks.len());
        let mut completed = 0;
        for task in tasks {
            if self.execute(&task).await {
                match self.db.mark_task_done(task.id).await {
                    Ok(true) => completed += 1,
                    // Another sweep got there first
                    Ok(false) => {}
                    Err(e) => warn!("outbox_mark_done_failed: {} error={}", task.id, e),
                }
            }
        }

        if completed > 0 {
            info!("outbox_sweep_done: completed={}", completed);
        }
        Ok(completed)
    }

    /// Run one task's side effect; true on success.
    async fn execute(&self, task: &OutboxTask) -> bool {
        let Some(event_type) = EventType::parse(&task.event_type) else {
            warn!(
                "outbox_unknown_event: {} event_type={}",
                task.id, task.event_type
            );
            return false;
        };

        let payload = match task.payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("outbox_bad_payload: {} error={}", task.id, e);
                return false;
            }
        };

        let result = match event_type {
            EventType::DeleteObject => self.objects.delete_object(&payload.object_name).await,
            EventType::DeletePreview => self.previews.delete_preview(&payload.object_name).await,
        };

        match result {
            Ok(()) => {
                debug!(
                    "outbox_task_executed: {} event_type={} object={}",
                    task.id, task.event_type, payload.object_name
                );
                true
            }
            Err(e) => {
                // Stays pending; the next sweep retries
                warn!(
                    "outbox_task_failed: {} event_type={} object={} error={}",
                    task.id, task.event_type, payload.object_name, e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{outbox, TaskPayload, TaskStatus, Tx};
    use crate::preview::{MemoryPreviewStore, PreviewDoc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Object store double that counts deletions and can be told to fail.
    #[derive(Default)]
    struct FlakyObjectStore {
        deletes: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl ObjectStore for FlakyObjectStore {
        async fn delete_object(&self, _object_name: &str) -> StoreResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err("connection refused".into());
            }
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn open_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(&dir.path().join("relay.db")).await.unwrap();
        (dir, db)
    }

    async fn insert_pending(db: &Db, event_type: EventType, object_name: &str) {
        let conn = db.lock().await;
        let tx = Tx::begin(&conn).await.unwrap();
        outbox::insert_task_tx(
            &tx,
            event_type,
            &TaskPayload {
                object_name: object_name.to_string(),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn sweep_executes_and_marks_done() {
        let (_dir, db) = open_db().await;
        let objects = Arc::new(FlakyObjectStore::default());
        let previews = Arc::new(MemoryPreviewStore::new());
        previews
            .insert_preview(PreviewDoc {
                object_name: "a.jsonl".to_string(),
                file_size: 10,
                preview_data: vec![],
            })
            .await
            .unwrap();

        insert_pending(&db, EventType::DeleteObject, "a.jsonl").await;
        insert_pending(&db, EventType::DeletePreview, "a.jsonl").await;

        let relay = OutboxRelay::new(db.clone(), objects.clone(), previews.clone());
        assert_eq!(relay.sweep().await.unwrap(), 2);

        assert_eq!(objects.deletes.load(Ordering::SeqCst), 1);
        assert!(previews.preview("a.jsonl").await.unwrap().is_none());
        assert!(db.pending_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_side_effect_leaves_task_pending_for_retry() {
        let (_dir, db) = open_db().await;
        let objects = Arc::new(FlakyObjectStore::default());
        objects.failing.store(true, Ordering::SeqCst);
        let relay = OutboxRelay::new(
            db.clone(),
            objects.clone(),
            Arc::new(MemoryPreviewStore::new()),
        );

        insert_pending(&db, EventType::DeleteObject, "b.jsonl").await;

        assert_eq!(relay.sweep().await.unwrap(), 0);
        assert_eq!(db.pending_tasks().await.unwrap().len(), 1);

        // The store recovers; the next sweep completes the task
        objects.failing.store(false, Ordering::SeqCst);
        assert_eq!(relay.sweep().await.unwrap(), 1);
        assert!(db.pending_tasks().await.unwrap().is_empty());
        assert_eq!(objects.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn done_tasks_are_never_re_executed() {
        let (_dir, db) = open_db().await;
        let objects = Arc::new(FlakyObjectStore::default());
        let relay = OutboxRelay::new(
            db.clone(),
            objects.clone(),
            Arc::new(MemoryPreviewStore::new()),
        );

        insert_pending(&db, EventType::DeleteObject, "c.jsonl").await;
        assert_eq!(relay.sweep().await.unwrap(), 1);
        assert_eq!(relay.sweep().await.unwrap(), 0);
        assert_eq!(objects.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_mark_done_transitions_exactly_once() {
        let (_dir, db) = open_db().await;
        insert_pending(&db, EventType::DeleteObject, "d.jsonl").await;
        let task = db.pending_tasks().await.unwrap().remove(0);
        assert_eq!(task.status, TaskStatus::Pending);

        // Two sweeps racing on the same executed task: one wins the
        // conditional update, the other observes a no-op
        assert!(db.mark_task_done(task.id).await.unwrap());
        assert!(!db.mark_task_done(task.id).await.unwrap());

        let stored = db.outbox_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Done);
    }
}
