//! Storage backends for cache regions.
//!
//! - [`SqliteCacheStorage`] persists entries in a `cache_entries` table next
//!   to the offline store.
//! - [`MemoryCacheStorage`] keeps entries in process memory; used in tests and
//!   when no database could be opened.

use crate::error::Result;
use crate::region::{CacheRegion, CachedResponse};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sqlx::{query, query_as, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

/// Repository-style interface over region entries.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Prepare the backend (create tables if needed).
    async fn initialize(&self) -> Result<()>;

    async fn get(&self, region: CacheRegion, key: &str) -> Result<Option<CachedResponse>>;

    /// Insert or overwrite an entry. Last writer wins.
    async fn put(&self, region: CacheRegion, key: &str, entry: &CachedResponse) -> Result<()>;

    async fn delete(&self, region: CacheRegion, key: &str) -> Result<bool>;

    /// Remove every entry of a region, returning how many were removed.
    async fn clear_region(&self, region: CacheRegion) -> Result<u64>;

    async fn entry_count(&self, region: CacheRegion) -> Result<u64>;
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite implementation of CacheStorage.
pub struct SqliteCacheStorage {
    pool: SqlitePool,
}

impl SqliteCacheStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

type EntryRow = (i64, String, Vec<u8>, i64);

#[async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn initialize(&self) -> Result<()> {
        query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                region TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                stored_at INTEGER NOT NULL,
                PRIMARY KEY (region, cache_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Cache entry table ready");
        Ok(())
    }

    async fn get(&self, region: CacheRegion, key: &str) -> Result<Option<CachedResponse>> {
        let row = query_as::<_, EntryRow>(
            "SELECT status, headers, body, stored_at FROM cache_entries WHERE region = ? AND cache_key = ?",
        )
        .bind(region.name())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some((status, headers, body, stored_at)) = row else {
            return Ok(None);
        };

        Ok(Some(CachedResponse {
            status: status as u16,
            headers: serde_json::from_str(&headers)?,
            body: Bytes::from(body),
            stored_at,
        }))
    }

    async fn put(&self, region: CacheRegion, key: &str, entry: &CachedResponse) -> Result<()> {
        query(
            r#"
            INSERT INTO cache_entries (region, cache_key, status, headers, body, stored_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(region, cache_key) DO UPDATE SET
                status = excluded.status,
                headers = excluded.headers,
                body = excluded.body,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(region.name())
        .bind(key)
        .bind(entry.status as i64)
        .bind(serde_json::to_string(&entry.headers)?)
        .bind(entry.body.as_ref())
        .bind(entry.stored_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, region: CacheRegion, key: &str) -> Result<bool> {
        let result = query("DELETE FROM cache_entries WHERE region = ? AND cache_key = ?")
            .bind(region.name())
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_region(&self, region: CacheRegion) -> Result<u64> {
        let result = query("DELETE FROM cache_entries WHERE region = ?")
            .bind(region.name())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn entry_count(&self, region: CacheRegion) -> Result<u64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM cache_entries WHERE region = ?")
            .bind(region.name())
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count as u64)
    }
}

// ============================================================================
// Memory
// ============================================================================

/// In-process CacheStorage.
#[derive(Default)]
pub struct MemoryCacheStorage {
    entries: RwLock<HashMap<(CacheRegion, String), CachedResponse>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, region: CacheRegion, key: &str) -> Result<Option<CachedResponse>> {
        Ok(self.entries.read().get(&(region, key.to_string())).cloned())
    }

    async fn put(&self, region: CacheRegion, key: &str, entry: &CachedResponse) -> Result<()> {
        self.entries
            .write()
            .insert((region, key.to_string()), entry.clone());
        Ok(())
    }

    async fn delete(&self, region: CacheRegion, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .remove(&(region, key.to_string()))
            .is_some())
    }

    async fn clear_region(&self, region: CacheRegion) -> Result<u64> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_region, _), _| *entry_region != region);
        Ok((before - entries.len()) as u64)
    }

    async fn entry_count(&self, region: CacheRegion) -> Result<u64> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|(entry_region, _)| *entry_region == region)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    fn entry(body: &'static str) -> CachedResponse {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "text/css".to_string());
        CachedResponse {
            status: 200,
            headers,
            body: Bytes::from_static(body.as_bytes()),
            stored_at: 7,
        }
    }

    async fn sqlite_storage() -> SqliteCacheStorage {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = SqliteCacheStorage::new(pool);
        storage.initialize().await.unwrap();
        storage
    }

    async fn exercise(storage: Arc<dyn CacheStorage>) {
        let key = "GET https://learn.example.com/app.css";

        assert!(storage.get(CacheRegion::StaticAssets, key).await.unwrap().is_none());

        storage.put(CacheRegion::StaticAssets, key, &entry("a{}")).await.unwrap();
        storage.put(CacheRegion::StaticAssets, key, &entry("b{}")).await.unwrap();
        storage.put(CacheRegion::ApiResponses, key, &entry("c{}")).await.unwrap();

        let stored = storage.get(CacheRegion::StaticAssets, key).await.unwrap().unwrap();
        assert_eq!(stored, entry("b{}"));
        assert_eq!(storage.entry_count(CacheRegion::StaticAssets).await.unwrap(), 1);

        assert_eq!(storage.clear_region(CacheRegion::StaticAssets).await.unwrap(), 1);
        assert_eq!(storage.entry_count(CacheRegion::ApiResponses).await.unwrap(), 1);

        assert!(storage.delete(CacheRegion::ApiResponses, key).await.unwrap());
        assert!(!storage.delete(CacheRegion::ApiResponses, key).await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_storage_regions_are_independent() {
        exercise(Arc::new(sqlite_storage().await)).await;
    }

    #[tokio::test]
    async fn test_memory_storage_regions_are_independent() {
        exercise(Arc::new(MemoryCacheStorage::new())).await;
    }

    #[tokio::test]
    async fn test_sqlite_initialize_is_idempotent() {
        let storage = sqlite_storage().await;
        storage.initialize().await.unwrap();
        assert_eq!(storage.entry_count(CacheRegion::LearningContent).await.unwrap(), 0);
    }
}
