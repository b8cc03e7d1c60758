use super::{Db, DbResult};
use serde::{Deserialize, Serialize};

/// A confirmed purchase of a paid dataset. The unix timestamp recorded here
/// is the value embedded into the buyer's watermarked copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: i64,
    pub buyer_id: i64,
    pub dataset_id: i64,
    pub purchased_at: i64,
}

pub fn get_table_sql() -> &'static str {
    "
    CREATE TABLE IF NOT EXISTS purchases (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        buyer_id INTEGER NOT NULL,
        dataset_id INTEGER NOT NULL REFERENCES datasets(id),
        purchased_at INTEGER NOT NULL,
        UNIQUE(buyer_id, dataset_id)
    );

    CREATE INDEX IF NOT EXISTS idx_purchases_buyer ON purchases(buyer_id);
    "
}

impl Db {
    pub async fn record_purchase(
        &self,
        buyer_id: i64,
        dataset_id: i64,
        purchased_at: i64,
    ) -> DbResult<()> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO purchases (buyer_id, dataset_id, purchased_at) VALUES (?1, ?2, ?3)",
            turso::params![buyer_id, dataset_id, purchased_at],
        )
        .await?;
        Ok(())
    }

    /// Purchase timestamp for a (buyer, dataset) pair; errors when the buyer
    /// never bought the dataset.
    pub async fn purchase_timestamp(&self, buyer_id: i64, dataset_id: i64) -> DbResult<i64> {
        let conn = self.lock().await;
        let mut rows = conn
            .query(
                "SELECT purchased_at FROM purchases WHERE buyer_id = ?1 AND dataset_id = ?2",
                turso::params![buyer_id, dataset_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Err(format!(
                "no purchase for buyer {} dataset {}",
                buyer_id, dataset_id
            )
            .into()),
        }
    }
}
