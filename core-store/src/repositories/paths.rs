//! Learning path repository trait and implementation

use crate::error::{Result, StoreError};
use crate::models::CachedLearningPath;
use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use sqlx::{query, query_as, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Learning path repository interface
#[async_trait]
pub trait LearningPathRepository: Send + Sync {
    /// Insert or overwrite a path by id
    async fn put(&self, path: &CachedLearningPath) -> Result<()>;

    /// Find a path by its id
    ///
    /// # Returns
    /// - `Ok(Some(path))` if stored
    /// - `Ok(None)` if not stored
    async fn get(&self, id: &str) -> Result<Option<CachedLearningPath>>;

    /// All stored paths, ordered by id
    async fn all(&self) -> Result<Vec<CachedLearningPath>>;

    /// Delete a path by id
    ///
    /// # Returns
    /// `Ok(true)` if a row was removed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Count stored paths
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of LearningPathRepository
pub struct SqliteLearningPathRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteLearningPathRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

pub(crate) async fn upsert(
    conn: &mut SqliteConnection,
    path: &CachedLearningPath,
    stored_at: i64,
) -> Result<()> {
    path.validate()
        .map_err(|e| StoreError::invalid("CachedLearningPath", e))?;

    query(
        r#"
        INSERT INTO learning_paths (id, data, stored_at)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET data = excluded.data, stored_at = excluded.stored_at
        "#,
    )
    .bind(&path.id)
    .bind(serde_json::to_string(path)?)
    .bind(stored_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete_in(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    let result = query("DELETE FROM learning_paths WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl LearningPathRepository for SqliteLearningPathRepository {
    async fn put(&self, path: &CachedLearningPath) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, path, self.clock.unix_timestamp_millis()).await
    }

    async fn get(&self, id: &str) -> Result<Option<CachedLearningPath>> {
        let row = query_as::<_, (String,)>("SELECT data FROM learning_paths WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(data,)| serde_json::from_str(&data).map_err(StoreError::from))
            .transpose()
    }

    async fn all(&self) -> Result<Vec<CachedLearningPath>> {
        query_as::<_, (String,)>("SELECT data FROM learning_paths ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(data,)| serde_json::from_str(&data).map_err(StoreError::from))
            .collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        delete_in(&mut conn, id).await
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM learning_paths")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}
