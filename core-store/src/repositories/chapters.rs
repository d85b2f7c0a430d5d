//! Chapter repository trait and implementation

use crate::error::{Result, StoreError};
use crate::models::CachedChapter;
use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use sqlx::{query, query_as, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Chapter repository interface
#[async_trait]
pub trait ChapterRepository: Send + Sync {
    /// Insert or overwrite a chapter by id
    async fn put(&self, chapter: &CachedChapter) -> Result<()>;

    /// Find a chapter by its id
    async fn get(&self, id: &str) -> Result<Option<CachedChapter>>;

    /// All chapters of a path, via the `path_id` index
    async fn find_by_path(&self, path_id: &str) -> Result<Vec<CachedChapter>>;

    /// Delete a chapter by id
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete every chapter of a path, returning how many were removed
    async fn delete_by_path(&self, path_id: &str) -> Result<u64>;

    /// Count stored chapters
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of ChapterRepository
pub struct SqliteChapterRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteChapterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

pub(crate) async fn upsert(
    conn: &mut SqliteConnection,
    chapter: &CachedChapter,
    stored_at: i64,
) -> Result<()> {
    chapter
        .validate()
        .map_err(|e| StoreError::invalid("CachedChapter", e))?;

    query(
        r#"
        INSERT INTO chapters (id, path_id, data, stored_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            path_id = excluded.path_id,
            data = excluded.data,
            stored_at = excluded.stored_at
        "#,
    )
    .bind(&chapter.id)
    .bind(&chapter.path_id)
    .bind(serde_json::to_string(chapter)?)
    .bind(stored_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete_by_path_in(conn: &mut SqliteConnection, path_id: &str) -> Result<u64> {
    let result = query("DELETE FROM chapters WHERE path_id = ?")
        .bind(path_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

fn decode(rows: Vec<(String,)>) -> Result<Vec<CachedChapter>> {
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl ChapterRepository for SqliteChapterRepository {
    async fn put(&self, chapter: &CachedChapter) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, chapter, self.clock.unix_timestamp_millis()).await
    }

    async fn get(&self, id: &str) -> Result<Option<CachedChapter>> {
        let row = query_as::<_, (String,)>("SELECT data FROM chapters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(data,)| serde_json::from_str(&data).map_err(StoreError::from))
            .transpose()
    }

    async fn find_by_path(&self, path_id: &str) -> Result<Vec<CachedChapter>> {
        let rows = query_as::<_, (String,)>(
            "SELECT data FROM chapters WHERE path_id = ? ORDER BY stored_at ASC, id ASC",
        )
        .bind(path_id)
        .fetch_all(&self.pool)
        .await?;

        decode(rows)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM chapters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_path(&self, path_id: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        delete_by_path_in(&mut conn, path_id).await
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM chapters")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}
