//! Transactional outbox task log
//!
//! A task row is inserted on the same connection, inside the same
//! transaction, as the domain mutation it accompanies: it exists if and only
//! if that mutation committed. Tasks move pending -> done via a sweep, or are
//! removed entirely by a compensating cancellation before execution.

use super::{changes, Db, DbResult, Tx};
use serde::{Deserialize, Serialize};

/// Closed set of cross-store side effects the relay knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Delete the dataset object from blob storage
    DeleteObject,
    /// Delete the cached preview document
    DeletePreview,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::DeleteObject => write!(f, "delete_object"),
            EventType::DeletePreview => write!(f, "delete_preview"),
        }
    }
}

impl EventType {
    pub fn parse(s: &str) -> Option<EventType> {
        match s {
            "delete_object" => Some(EventType::DeleteObject),
            "delete_preview" => Some(EventType::DeletePreview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Done,
    /// Declared in the schema, never assigned; reserved for a future
    /// bounded-retry policy.
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "done" => TaskStatus::Done,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Pending,
        }
    }
}

/// Structured task payload. Serialized as JSON into the payload column; the
/// target object name is additionally stored in its own column so that
/// cancellation matches on structured fields rather than string equality of
/// a serialized blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    #[serde(rename = "objectName")]
    pub object_name: String,
}

#[derive(Debug, Clone)]
pub struct OutboxTask {
    pub id: i64,
    pub event_type: String,
    pub payload: String,
    pub object_name: String,
    pub status: TaskStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OutboxTask {
    pub fn payload(&self) -> DbResult<TaskPayload> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

pub fn get_table_sql() -> &'static str {
    "
    CREATE TABLE IF NOT EXISTS outbox (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        object_name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'done', 'failed')),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_outbox_status ON outbox(status);
    CREATE INDEX IF NOT EXISTS idx_outbox_type_object ON outbox(event_type, object_name);
    "
}

/// Insert a pending task inside the caller's transaction.
pub(crate) async fn insert_task_tx(
    tx: &Tx<'_>,
    event_type: EventType,
    payload: &TaskPayload,
) -> DbResult<()> {
    let now = chrono::Utc::now().timestamp();
    let serialized = serde_json::to_string(payload)?;
    tx.conn()
        .execute(
            "INSERT INTO outbox (event_type, payload, object_name, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
            turso::params![
                event_type.to_string(),
                serialized,
                payload.object_name.clone(),
                now,
            ],
        )
        .await?;
    Ok(())
}

/// Delete a still-pending task matching event type and target object inside
/// the caller's transaction. No-op when nothing matches; returns the number
/// of tasks removed.
pub(crate) async fn cancel_task_tx(
    tx: &Tx<'_>,
    event_type: EventType,
    object_name: &str,
) -> DbResult<i64> {
    tx.conn()
        .execute(
            "DELETE FROM outbox
             WHERE event_type = ?1 AND object_name = ?2 AND status = 'pending'",
            turso::params![event_type.to_string(), object_name],
        )
        .await?;
    changes(tx.conn()).await
}

fn task_from_row(row: &turso::Row) -> DbResult<OutboxTask> {
    Ok(OutboxTask {
        id: row.get(0)?,
        event_type: row.get(1)?,
        payload: row.get(2)?,
        object_name: row.get(3)?,
        status: TaskStatus::from(row.get::<String>(4)?),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl Db {
    /// All tasks awaiting execution, oldest first.
    pub async fn pending_tasks(&self) -> DbResult<Vec<OutboxTask>> {
        let conn = self.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, event_type, payload, object_name, status, created_at, updated_at
                 FROM outbox WHERE status = 'pending'
                 ORDER BY created_at ASC",
                (),
            )
            .await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(task_from_row(&row)?);
        }
        Ok(tasks)
    }

    /// Transition a task pending -> done. Returns false when the task was
    /// already done or gone, which makes overlapping sweeps a safe no-op.
    pub async fn mark_task_done(&self, task_id: i64) -> DbResult<bool> {
        let conn = self.lock().await;
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "UPDATE outbox SET status = 'done', updated_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            turso::params![now, task_id],
        )
        .await?;
        Ok(changes(&conn).await? > 0)
    }

    /// Task by id, regardless of status.
    pub async fn outbox_task(&self, task_id: i64) -> DbResult<Option<OutboxTask>> {
        let conn = self.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, event_type, payload, object_name, status, created_at, updated_at
                 FROM outbox WHERE id = ?1",
                turso::params![task_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(task_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    #[tokio::test]
    async fn committed_tasks_survive_reopening_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.db");

        {
            let db = Db::open(&path).await.unwrap();
            let conn = db.lock().await;
            let tx = Tx::begin(&conn).await.unwrap();
            insert_task_tx(
                &tx,
                EventType::DeleteObject,
                &TaskPayload {
                    object_name: "durable.jsonl".to_string(),
                },
            )
            .await
            .unwrap();
            tx.commit().await.unwrap();
        }

        let reopened = Db::open(&path).await.unwrap();
        let tasks = reopened.pending_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].object_name, "durable.jsonl");
        assert_eq!(tasks[0].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn rolled_back_tasks_are_never_visible() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(&dir.path().join("outbox.db")).await.unwrap();
        {
            let conn = db.lock().await;
            let tx = Tx::begin(&conn).await.unwrap();
            insert_task_tx(
                &tx,
                EventType::DeletePreview,
                &TaskPayload {
                    object_name: "ghost.jsonl".to_string(),
                },
            )
            .await
            .unwrap();
            tx.rollback().await.unwrap();
        }
        assert!(db.pending_tasks().await.unwrap().is_empty());
    }

    #[test]
    fn outbox_sql_contains_table_and_indexes() {
        let sql = get_table_sql();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS outbox"));
        assert!(sql.contains("idx_outbox_status"));
        assert!(sql.contains("idx_outbox_type_object"));
        assert!(sql.contains("CHECK (status IN ('pending', 'done', 'failed'))"));
    }

    #[test]
    fn event_type_round_trips_through_strings() {
        assert_eq!(
            EventType::parse(&EventType::DeleteObject.to_string()),
            Some(EventType::DeleteObject)
        );
        assert_eq!(
            EventType::parse(&EventType::DeletePreview.to_string()),
            Some(EventType::DeletePreview)
        );
        assert_eq!(EventType::parse("resize_thumbnail"), None);
    }

    #[test]
    fn task_payload_serializes_object_name() {
        let payload = TaskPayload {
            object_name: "7_1700000000.jsonl".to_string(),
        };
        let raw = serde_json::to_string(&payload).unwrap();
        assert_eq!(raw, r#"{"objectName":"7_1700000000.jsonl"}"#);
    }
}
