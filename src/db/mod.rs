//! Relational store (turso/SQLite)
//!
//! Access is serialized through a `tokio::sync::Mutex` around the single
//! connection; turso's page cache is not safe under concurrent access on the
//! pre releases. Multi-step domain mutations take the lock once and run an
//! explicit transaction through [`Tx`].

use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use turso::{Builder, Connection};

pub mod datasets;
pub mod outbox;
pub mod purchases;

pub use datasets::DatasetRecord;
pub use outbox::{EventType, OutboxTask, TaskPayload, TaskStatus};
pub use purchases::Purchase;

pub type DbResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Handle to the relational store. Cheap to clone.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the database at `path` and ensure all tables exist.
    pub async fn open(path: &Path) -> DbResult<Db> {
        let path = path.to_str().ok_or("database path is not valid UTF-8")?;
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        conn.execute_batch(datasets::get_table_sql()).await?;
        conn.execute_batch(purchases::get_table_sql()).await?;
        conn.execute_batch(outbox::get_table_sql()).await?;

        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the serialized connection.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Explicit transaction over the locked connection.
///
/// Every error path must call [`Tx::rollback`]; `begin` additionally clears
/// any transaction a panicked or aborted caller left open on the connection,
/// so one broken mutation cannot poison the next.
pub(crate) struct Tx<'a> {
    conn: &'a Connection,
    open: bool,
}

impl<'a> Tx<'a> {
    pub async fn begin(conn: &'a Connection) -> DbResult<Tx<'a>> {
        // Clears a transaction left open by an earlier abort; the error for
        // "no transaction is active" is expected and ignored.
        let _ = conn.execute("ROLLBACK", ()).await;
        conn.execute("BEGIN", ()).await?;
        Ok(Tx { conn, open: true })
    }

    pub fn conn(&self) -> &'a Connection {
        self.conn
    }

    pub async fn commit(mut self) -> DbResult<()> {
        self.conn.execute("COMMIT", ()).await?;
        self.open = false;
        Ok(())
    }

    pub async fn rollback(mut self) -> DbResult<()> {
        self.conn.execute("ROLLBACK", ()).await?;
        self.open = false;
        Ok(())
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if self.open {
            // Rolled back by the next begin on this connection.
            log::warn!("transaction dropped without commit or rollback");
        }
    }
}

/// Rows affected by the most recent statement on `conn`.
pub(crate) async fn changes(conn: &Connection) -> DbResult<i64> {
    let mut rows = conn.query("SELECT changes()", ()).await?;
    let count = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };
    // Drain the cursor: dropping an unfinished Rows aborts an open transaction.
    while rows.next().await?.is_some() {}
    Ok(count)
}
