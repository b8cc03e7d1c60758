use super::{changes, Db, DbResult, Tx};
use serde::{Deserialize, Serialize};
use turso::Connection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: i64,
    pub title: String,
    pub category: String,
    pub price: f64,
    pub is_free: bool,
    pub object_name: String,
    pub file_size: i64,
    pub author: String,
    pub download_count: i64,
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// New dataset row, as registered after a completed upload
#[derive(Debug, Clone, Deserialize)]
pub struct NewDataset {
    pub title: String,
    pub category: String,
    pub price: f64,
    pub is_free: bool,
    pub object_name: String,
    pub file_size: i64,
    pub author: String,
}

pub fn get_table_sql() -> &'static str {
    "
    CREATE TABLE IF NOT EXISTS datasets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        category TEXT NOT NULL,
        price REAL NOT NULL DEFAULT 0,
        is_free INTEGER NOT NULL DEFAULT 0,
        object_name TEXT NOT NULL UNIQUE,
        file_size INTEGER NOT NULL,
        author TEXT NOT NULL,
        download_count INTEGER NOT NULL DEFAULT 0,
        deleted_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_datasets_category ON datasets(category);
    CREATE INDEX IF NOT EXISTS idx_datasets_deleted ON datasets(deleted_at);

    -- One row per download handed out, free or paid
    CREATE TABLE IF NOT EXISTS download_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        buyer_id INTEGER NOT NULL,
        dataset_id INTEGER NOT NULL REFERENCES datasets(id),
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_download_records_buyer ON download_records(buyer_id, dataset_id);
    "
}

fn record_from_row(row: &turso::Row) -> DbResult<DatasetRecord> {
    Ok(DatasetRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        category: row.get(2)?,
        price: row.get(3)?,
        is_free: row.get::<i64>(4)? != 0,
        object_name: row.get(5)?,
        file_size: row.get(6)?,
        author: row.get(7)?,
        download_count: row.get(8)?,
        deleted_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const RECORD_COLUMNS: &str = "id, title, category, price, is_free, object_name, file_size, \
     author, download_count, deleted_at, created_at, updated_at";

impl Db {
    /// Insert a dataset row; returns its id.
    pub async fn insert_dataset(&self, dataset: &NewDataset) -> DbResult<i64> {
        let conn = self.lock().await;
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO datasets
             (title, category, price, is_free, object_name, file_size, author, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            turso::params![
                dataset.title.clone(),
                dataset.category.clone(),
                dataset.price,
                dataset.is_free as i64,
                dataset.object_name.clone(),
                dataset.file_size,
                dataset.author.clone(),
                now,
                now,
            ],
        )
        .await?;

        let mut rows = conn.query("SELECT last_insert_rowid()", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Err("no row id after dataset insert".into()),
        }
    }

    /// Fetch a live (not soft-deleted) dataset row.
    pub async fn dataset(&self, dataset_id: i64) -> DbResult<Option<DatasetRecord>> {
        let conn = self.lock().await;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM datasets WHERE id = ?1 AND deleted_at IS NULL",
                    RECORD_COLUMNS
                ),
                turso::params![dataset_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(record_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Object name and file size for a live dataset.
    pub async fn dataset_object(&self, dataset_id: i64) -> DbResult<(String, i64)> {
        let conn = self.lock().await;
        let mut rows = conn
            .query(
                "SELECT object_name, file_size FROM datasets
                 WHERE id = ?1 AND deleted_at IS NULL",
                turso::params![dataset_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok((row.get(0)?, row.get(1)?)),
            None => Err(format!("dataset {} not found", dataset_id).into()),
        }
    }
}

/// Object name regardless of soft-delete state (restore needs deleted rows).
pub(crate) async fn object_name_tx(conn: &Connection, dataset_id: i64) -> DbResult<String> {
    let mut rows = conn
        .query(
            "SELECT object_name FROM datasets WHERE id = ?1",
            turso::params![dataset_id],
        )
        .await?;

    let name: Option<String> = match rows.next().await? {
        Some(row) => Some(row.get(0)?),
        None => None,
    };
    // Drain the cursor: dropping an unfinished Rows aborts an open transaction.
    while rows.next().await?.is_some() {}
    name.ok_or_else(|| format!("dataset {} not found", dataset_id).into())
}

/// Soft-delete a dataset row. Errors when the row is missing or already deleted.
pub(crate) async fn soft_delete_tx(tx: &Tx<'_>, dataset_id: i64) -> DbResult<()> {
    let now = chrono::Utc::now().timestamp();
    tx.conn()
        .execute(
            "UPDATE datasets SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            turso::params![now, dataset_id],
        )
        .await?;
    if changes(tx.conn()).await? == 0 {
        return Err(format!("dataset {} not found or already deleted", dataset_id).into());
    }
    Ok(())
}

/// Clear the soft-delete mark. Errors when the row is missing or not deleted.
pub(crate) async fn restore_tx(tx: &Tx<'_>, dataset_id: i64) -> DbResult<()> {
    let now = chrono::Utc::now().timestamp();
    tx.conn()
        .execute(
            "UPDATE datasets SET deleted_at = NULL, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NOT NULL",
            turso::params![now, dataset_id],
        )
        .await?;
    if changes(tx.conn()).await? == 0 {
        return Err(format!("dataset {} not found or not deleted", dataset_id).into());
    }
    Ok(())
}

pub(crate) async fn add_download_record_tx(
    tx: &Tx<'_>,
    buyer_id: i64,
    dataset_id: i64,
) -> DbResult<()> {
    let now = chrono::Utc::now().timestamp();
    tx.conn()
        .execute(
            "INSERT INTO download_records (buyer_id, dataset_id, created_at) VALUES (?1, ?2, ?3)",
            turso::params![buyer_id, dataset_id, now],
        )
        .await?;
    Ok(())
}

pub(crate) async fn bump_download_count_tx(tx: &Tx<'_>, dataset_id: i64) -> DbResult<()> {
    let now = chrono::Utc::now().timestamp();
    tx.conn()
        .execute(
            "UPDATE datasets SET download_count = download_count + 1, updated_at = ?1
             WHERE id = ?2",
            turso::params![now, dataset_id],
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::get_table_sql;

    #[test]
    fn datasets_sql_contains_tables_and_indexes() {
        let sql = get_table_sql();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS datasets"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS download_records"));
        assert!(sql.contains("idx_datasets_deleted"));
        assert!(sql.contains("idx_download_records_buyer"));
    }
}
