//! # Local Durable Store
//!
//! [`LocalStore`] owns the four offline collections and is the only writer of
//! them. Operations that touch more than one collection run in a single
//! SQLite transaction:
//!
//! - [`LocalStore::save_progress`] appends the progress row **and** its
//!   pending-sync item, so a crash can never leave a saved record that will
//!   not be synced.
//! - [`LocalStore::store_path_for_offline`] and [`LocalStore::remove_path`]
//!   keep a path and its chapters together.

use crate::db::{self, create_pool, DatabaseConfig};
use crate::error::{Result, StoreError};
use crate::models::{
    CachedChapter, CachedLearningPath, PendingKind, PendingSyncItem, ProgressDraft,
    ProgressRecord, StoreStatistics,
};
use crate::repositories::{
    chapters, paths, pending, progress, ChapterRepository, LearningPathRepository,
    PendingSyncRepository, ProgressRepository, SqliteChapterRepository,
    SqliteLearningPathRepository, SqlitePendingSyncRepository, SqliteProgressRepository,
};
use bridge_traits::time::{Clock, SystemClock};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Handle to the offline database. Cheap to clone.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    paths: Arc<SqliteLearningPathRepository>,
    chapters: Arc<SqliteChapterRepository>,
    progress: Arc<SqliteProgressRepository>,
    pending: Arc<SqlitePendingSyncRepository>,
}

impl LocalStore {
    /// Open (or create) the store and bring its schema up to date.
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::from_pool(pool))
    }

    /// Private in-memory store, mostly for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::open(DatabaseConfig::in_memory()).await
    }

    /// Wrap a pool that already has the schema applied.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self::build(pool, Arc::new(SystemClock))
    }

    /// Replace the time source used to stamp rows.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::build(self.pool, clock)
    }

    fn build(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self {
            paths: Arc::new(SqliteLearningPathRepository::with_clock(
                pool.clone(),
                clock.clone(),
            )),
            chapters: Arc::new(SqliteChapterRepository::with_clock(
                pool.clone(),
                clock.clone(),
            )),
            progress: Arc::new(SqliteProgressRepository::with_clock(
                pool.clone(),
                clock.clone(),
            )),
            pending: Arc::new(SqlitePendingSyncRepository::with_clock(
                pool.clone(),
                clock.clone(),
            )),
            pool,
            clock,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The pending-sync queue, for the sync processor.
    pub fn pending_queue(&self) -> Arc<dyn PendingSyncRepository> {
        self.pending.clone()
    }

    pub async fn schema_version(&self) -> Result<i64> {
        db::schema_version(&self.pool).await
    }

    // ---- learning paths ------------------------------------------------

    pub async fn put_path(&self, path: &CachedLearningPath) -> Result<()> {
        self.paths.put(path).await
    }

    pub async fn get_path(&self, id: &str) -> Result<Option<CachedLearningPath>> {
        self.paths.get(id).await
    }

    pub async fn all_paths(&self) -> Result<Vec<CachedLearningPath>> {
        self.paths.all().await
    }

    pub async fn delete_path(&self, id: &str) -> Result<bool> {
        self.paths.delete(id).await
    }

    // ---- chapters ------------------------------------------------------

    pub async fn put_chapter(&self, chapter: &CachedChapter) -> Result<()> {
        self.chapters.put(chapter).await
    }

    pub async fn get_chapter(&self, id: &str) -> Result<Option<CachedChapter>> {
        self.chapters.get(id).await
    }

    pub async fn chapters_for_path(&self, path_id: &str) -> Result<Vec<CachedChapter>> {
        self.chapters.find_by_path(path_id).await
    }

    pub async fn delete_chapter(&self, id: &str) -> Result<bool> {
        self.chapters.delete(id).await
    }

    /// Save a path and its chapters for offline reading.
    ///
    /// Chapters must belong to `path`; chapters stored earlier for the same
    /// path but missing from `chapters` are dropped.
    #[instrument(skip(self, path, chapters), fields(path_id = %path.id, chapters = chapters.len()))]
    pub async fn store_path_for_offline(
        &self,
        path: &CachedLearningPath,
        chapters: &[CachedChapter],
    ) -> Result<()> {
        if let Some(stray) = chapters.iter().find(|c| c.path_id != path.id) {
            return Err(StoreError::invalid(
                "CachedChapter",
                format!("chapter {} belongs to path {}", stray.id, stray.path_id),
            ));
        }

        let stored_at = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;

        paths::upsert(&mut tx, path, stored_at).await?;
        chapters::delete_by_path_in(&mut tx, &path.id).await?;
        for chapter in chapters {
            chapters::upsert(&mut tx, chapter, stored_at).await?;
        }

        tx.commit().await?;

        info!("Stored learning path for offline use");
        Ok(())
    }

    /// Remove a path and all of its chapters.
    ///
    /// # Returns
    /// `Ok(false)` if the path was not stored
    #[instrument(skip(self))]
    pub async fn remove_path(&self, path_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let chapters_removed = chapters::delete_by_path_in(&mut tx, path_id).await?;
        let removed = paths::delete_in(&mut tx, path_id).await?;

        tx.commit().await?;

        debug!(removed, chapters_removed, "Removed offline copy");
        Ok(removed)
    }

    // ---- progress ------------------------------------------------------

    /// Append a progress record and queue it for the server.
    ///
    /// The record and its `PROGRESS` pending item commit together or not at
    /// all.
    #[instrument(skip(self, draft), fields(path_id = %draft.path_id, chapter_id = %draft.chapter_id))]
    pub async fn save_progress(&self, draft: &ProgressDraft) -> Result<ProgressRecord> {
        let timestamp = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let record = progress::insert(&mut tx, draft, timestamp).await?;
        let item = pending::insert(
            &mut tx,
            PendingKind::Progress,
            &serde_json::to_value(&record)?,
            timestamp,
        )
        .await?;

        tx.commit().await?;

        debug!(
            record_id = record.id,
            pending_id = item.id,
            "Progress saved and queued for sync"
        );
        Ok(record)
    }

    pub async fn get_progress(
        &self,
        user_id: &str,
        path_id: &str,
        chapter_id: &str,
    ) -> Result<Option<ProgressRecord>> {
        self.progress.latest(user_id, path_id, chapter_id).await
    }

    pub async fn progress_history(
        &self,
        user_id: &str,
        path_id: &str,
    ) -> Result<Vec<ProgressRecord>> {
        self.progress.history(user_id, path_id).await
    }

    // ---- pending sync --------------------------------------------------

    pub async fn pending_items(&self) -> Result<Vec<PendingSyncItem>> {
        self.pending.list().await
    }

    pub async fn delete_pending_item(&self, id: i64) -> Result<bool> {
        self.pending.delete(id).await
    }

    pub async fn pending_count(&self) -> Result<u64> {
        Ok(self.pending.count().await? as u64)
    }

    /// Row counts per collection.
    pub async fn statistics(&self) -> Result<StoreStatistics> {
        Ok(StoreStatistics {
            learning_paths: self.paths.count().await? as u64,
            chapters: self.chapters.count().await? as u64,
            progress_records: self.progress.count().await? as u64,
            pending_sync: self.pending.count().await? as u64,
        })
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("pool_size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::ManualClock;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_progress_queues_one_item() {
        let store = LocalStore::in_memory()
            .await
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(42_000)));

        let record = store
            .save_progress(&ProgressDraft::new("u1", "p1", "c1").with("completed", true))
            .await
            .unwrap();
        assert_eq!(record.timestamp, 42_000);

        let items = store.pending_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, PendingKind::Progress);
        assert_eq!(items[0].data["chapterId"], json!("c1"));
        assert_eq!(items[0].data["completed"], json!(true));
        assert_eq!(items[0].data["id"], json!(record.id));
    }

    #[tokio::test]
    async fn test_rejected_progress_writes_nothing() {
        let store = LocalStore::in_memory().await.unwrap();

        let result = store.save_progress(&ProgressDraft::new("u1", "", "c1")).await;
        assert!(matches!(result, Err(StoreError::InvalidInput { .. })));

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats, StoreStatistics::default());
    }

    #[tokio::test]
    async fn test_store_path_replaces_previous_chapters() {
        let store = LocalStore::in_memory().await.unwrap();
        let path = CachedLearningPath::new("p1", "Path");

        store
            .store_path_for_offline(
                &path,
                &[CachedChapter::new("c1", "p1"), CachedChapter::new("c2", "p1")],
            )
            .await
            .unwrap();
        store
            .store_path_for_offline(&path, &[CachedChapter::new("c3", "p1")])
            .await
            .unwrap();

        let ids: Vec<String> = store
            .chapters_for_path("p1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["c3"]);
    }

    #[tokio::test]
    async fn test_store_path_rejects_foreign_chapter() {
        let store = LocalStore::in_memory().await.unwrap();

        let result = store
            .store_path_for_offline(
                &CachedLearningPath::new("p1", "Path"),
                &[CachedChapter::new("c1", "p2")],
            )
            .await;

        assert!(result.is_err());
        assert!(store.get_path("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_path_drops_chapters() {
        let store = LocalStore::in_memory().await.unwrap();
        store
            .store_path_for_offline(
                &CachedLearningPath::new("p1", "Path"),
                &[CachedChapter::new("c1", "p1")],
            )
            .await
            .unwrap();
        store.put_chapter(&CachedChapter::new("x1", "p2")).await.unwrap();

        assert!(store.remove_path("p1").await.unwrap());
        assert!(!store.remove_path("p1").await.unwrap());

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.learning_paths, 0);
        assert_eq!(stats.chapters, 1);
    }
}
