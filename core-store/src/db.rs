//! SQLite pool behind the local durable store.
//!
//! Opening a pool applies the embedded `migrations/` (already-applied
//! versions are skipped) and then issues a trivial query, so a handle that
//! comes back is usable. File databases run in WAL mode.
//!
//! ```rust,ignore
//! use core_store::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("offline.db")).await?;
//! ```

use crate::error::{Result, StoreError};
use core_runtime::logging::strip_path;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the store lives and how its pool is sized.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `None` opens a private in-memory database
    pub path: Option<PathBuf>,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    /// Configuration for a database file, created if missing.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(database_path.into()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(1800)),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// Configuration for a private in-memory database.
    ///
    /// Every SQLite connection to `:memory:` is its own database, so the pool
    /// is pinned to a single connection that is never recycled.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: None,
            idle_timeout: None,
        }
    }

    /// Ignored for in-memory databases.
    pub fn max_connections(mut self, max: u32) -> Self {
        if self.path.is_some() {
            self.max_connections = max;
        }
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let options = match &self.path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            None => SqliteConnectOptions::from_str("sqlite::memory:")?,
        };

        Ok(options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true))
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => strip_path(&path.to_string_lossy()).to_string(),
            None => ":memory:".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Open (or create) the store database and bring its schema up to date.
///
/// # Errors
///
/// [`StoreError::Database`] when the file cannot be opened or does not answer,
/// [`StoreError::Migration`] when the schema cannot be applied.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    info!(
        database = %config.describe(),
        max_connections = config.max_connections,
        "Opening offline store"
    );

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(config.connect_options()?)
        .await
        .map_err(|e| {
            warn!(error = %e, "Offline store could not be opened");
            StoreError::Database(e)
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// Create an in-memory pool with the schema applied.
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    debug!("Applying offline store migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Migration failed");
            StoreError::Migration(e.to_string())
        })?;

    info!(
        schema_version = schema_version(pool).await?,
        "Offline store schema is current"
    );
    Ok(())
}

/// Highest successfully applied schema version, `0` for an empty database.
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let (version,): (Option<i64>,) =
        sqlx::query_as("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn health_check(pool: &SqlitePool) -> Result<()> {
    let (one,): (i64,) = sqlx::query_as("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Offline store is not answering");
        StoreError::Database(e)
    })?;
    debug!(probe = one, "Offline store answered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn object_names(pool: &SqlitePool, kind: &str) -> Vec<String> {
        sqlx::query_as::<_, (String,)>(
            "SELECT name FROM sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .bind(kind)
        .fetch_all(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|(name,)| name)
        .collect()
    }

    #[tokio::test]
    async fn test_first_open_creates_collections_and_indices() {
        let pool = create_test_pool().await.unwrap();

        let tables = object_names(&pool, "table").await;
        for table in ["learning_paths", "chapters", "progress", "pending_sync"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }

        let indices = object_names(&pool, "index").await;
        for index in [
            "idx_chapters_path_id",
            "idx_progress_user_id",
            "idx_progress_path_id",
            "idx_progress_chapter_id",
            "idx_pending_sync_timestamp",
        ] {
            assert!(indices.contains(&index.to_string()), "missing index {index}");
        }

        assert_eq!(schema_version(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_pool_keeps_data_across_queries() {
        let pool = create_test_pool().await.unwrap();

        sqlx::query("INSERT INTO learning_paths (id, data, stored_at) VALUES ('p1', '{}', 0)")
            .execute(&pool)
            .await
            .unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM learning_paths")
                        .fetch_one(&pool)
                        .await
                        .unwrap();
                    count
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 1);
        }
    }

    #[test]
    fn test_in_memory_config_is_single_connection() {
        let config = DatabaseConfig::in_memory().max_connections(8);
        assert_eq!(config.max_connections, 1);
        assert!(config.idle_timeout.is_none());

        let config = DatabaseConfig::new("offline.db").max_connections(8);
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.describe(), "offline.db");
    }
}
