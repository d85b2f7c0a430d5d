//! Progress repository trait and implementation
//!
//! Progress is append-only: a save never updates an existing row. Readers
//! pick the latest row per `(user, path, chapter)` by `timestamp`, with the
//! autoincrement id breaking ties between saves in the same millisecond.

use crate::error::{Result, StoreError};
use crate::models::{ProgressDraft, ProgressRecord};
use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use serde_json::{Map, Value};
use sqlx::{query, query_as, SqliteConnection, SqlitePool};
use std::sync::Arc;

type ProgressRow = (i64, String, String, String, i64, String);

/// Progress repository interface
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Append a new record stamped with the current time
    async fn append(&self, draft: &ProgressDraft) -> Result<ProgressRecord>;

    /// Most recent record for a user's chapter
    async fn latest(
        &self,
        user_id: &str,
        path_id: &str,
        chapter_id: &str,
    ) -> Result<Option<ProgressRecord>>;

    /// Every record of a user on a path, oldest first
    async fn history(&self, user_id: &str, path_id: &str) -> Result<Vec<ProgressRecord>>;

    /// Count stored records
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of ProgressRepository
pub struct SqliteProgressRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteProgressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    draft: &ProgressDraft,
    timestamp: i64,
) -> Result<ProgressRecord> {
    draft
        .validate()
        .map_err(|e| StoreError::invalid("ProgressDraft", e))?;

    let result = query(
        r#"
        INSERT INTO progress (user_id, path_id, chapter_id, timestamp, payload)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&draft.user_id)
    .bind(&draft.path_id)
    .bind(&draft.chapter_id)
    .bind(timestamp)
    .bind(serde_json::to_string(&draft.payload)?)
    .execute(conn)
    .await?;

    Ok(ProgressRecord {
        id: result.last_insert_rowid(),
        user_id: draft.user_id.clone(),
        path_id: draft.path_id.clone(),
        chapter_id: draft.chapter_id.clone(),
        timestamp,
        payload: draft.payload.clone(),
    })
}

fn from_row(row: ProgressRow) -> Result<ProgressRecord> {
    let (id, user_id, path_id, chapter_id, timestamp, payload) = row;
    let payload: Map<String, Value> = serde_json::from_str(&payload)?;

    Ok(ProgressRecord {
        id,
        user_id,
        path_id,
        chapter_id,
        timestamp,
        payload,
    })
}

#[async_trait]
impl ProgressRepository for SqliteProgressRepository {
    async fn append(&self, draft: &ProgressDraft) -> Result<ProgressRecord> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, draft, self.clock.unix_timestamp_millis()).await
    }

    async fn latest(
        &self,
        user_id: &str,
        path_id: &str,
        chapter_id: &str,
    ) -> Result<Option<ProgressRecord>> {
        let row = query_as::<_, ProgressRow>(
            r#"
            SELECT id, user_id, path_id, chapter_id, timestamp, payload
            FROM progress
            WHERE user_id = ? AND path_id = ? AND chapter_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(path_id)
        .bind(chapter_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(from_row).transpose()
    }

    async fn history(&self, user_id: &str, path_id: &str) -> Result<Vec<ProgressRecord>> {
        query_as::<_, ProgressRow>(
            r#"
            SELECT id, user_id, path_id, chapter_id, timestamp, payload
            FROM progress
            WHERE user_id = ? AND path_id = ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(path_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(from_row)
        .collect()
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM progress")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}
