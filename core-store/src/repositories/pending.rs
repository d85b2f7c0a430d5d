//! Pending-sync queue repository
//!
//! Queue order is enqueue time, then id.

use crate::error::{Result, StoreError};
use crate::models::{PendingKind, PendingSyncItem};
use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use serde_json::Value;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Pending-sync repository interface
#[async_trait]
pub trait PendingSyncRepository: Send + Sync {
    /// Append a mutation to the queue
    async fn enqueue(&self, kind: PendingKind, data: &Value) -> Result<PendingSyncItem>;

    /// Every queued item, in queue order
    async fn list(&self) -> Result<Vec<PendingSyncItem>>;

    /// Remove an acknowledged item
    ///
    /// # Returns
    /// `Ok(false)` if the item was already gone
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Count queued items
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of PendingSyncRepository
pub struct SqlitePendingSyncRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqlitePendingSyncRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    kind: PendingKind,
    data: &Value,
    timestamp: i64,
) -> Result<PendingSyncItem> {
    let result = query("INSERT INTO pending_sync (kind, data, timestamp) VALUES (?, ?, ?)")
        .bind(kind.as_str())
        .bind(serde_json::to_string(data)?)
        .bind(timestamp)
        .execute(conn)
        .await?;

    Ok(PendingSyncItem {
        id: result.last_insert_rowid(),
        kind,
        data: data.clone(),
        timestamp,
    })
}

fn from_row((id, kind, data, timestamp): (i64, String, String, i64)) -> Result<PendingSyncItem> {
    let kind = PendingKind::parse(&kind)
        .ok_or_else(|| StoreError::invalid("pending_sync.kind", format!("unknown kind {}", kind)))?;

    Ok(PendingSyncItem {
        id,
        kind,
        data: serde_json::from_str(&data)?,
        timestamp,
    })
}

#[async_trait]
impl PendingSyncRepository for SqlitePendingSyncRepository {
    async fn enqueue(&self, kind: PendingKind, data: &Value) -> Result<PendingSyncItem> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, kind, data, self.clock.unix_timestamp_millis()).await
    }

    async fn list(&self) -> Result<Vec<PendingSyncItem>> {
        query_as::<_, (i64, String, String, i64)>(
            "SELECT id, kind, data, timestamp FROM pending_sync ORDER BY timestamp ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(from_row)
        .collect()
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = query("DELETE FROM pending_sync WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM pending_sync")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}
