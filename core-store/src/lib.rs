//! # Offline Store
//!
//! Durable local storage for the offline engine: saved learning paths and
//! chapters, append-only progress records, and the queue of mutations the
//! server has not yet acknowledged.
//!
//! ## Overview
//!
//! - [`db`] opens the SQLite pool and applies the embedded, versioned schema
//! - [`repositories`] holds one repository per collection
//! - [`LocalStore`] is the façade the engine talks to
//!
//! ```rust,ignore
//! use core_store::{DatabaseConfig, LocalStore, ProgressDraft};
//!
//! let store = LocalStore::open(DatabaseConfig::new("offline.db")).await?;
//! store.save_progress(&ProgressDraft::new("u1", "rust-101", "intro")).await?;
//! ```

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use db::DatabaseConfig;
pub use error::{Result, StoreError};
pub use models::{
    CachedChapter, CachedLearningPath, PendingKind, PendingSyncItem, ProgressDraft,
    ProgressRecord, StoreStatistics,
};
pub use repositories::PendingSyncRepository;
pub use store::LocalStore;
