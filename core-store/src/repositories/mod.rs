//! # Repository Pattern Implementation
//!
//! One repository per collection of the offline store. Traits define the
//! access interface; the SQLite implementations use sqlx against the shared
//! pool.
//!
//! Writes that must commit together with another collection also exist as
//! free functions over a `&mut SqliteConnection`, so [`LocalStore`] can run
//! them inside one transaction.
//!
//! - `LearningPathRepository` - saved learning paths, keyed by id
//! - `ChapterRepository` - chapters, indexed by their path id
//! - `ProgressRepository` - append-only progress records
//! - `PendingSyncRepository` - mutations waiting for the server
//!
//! [`LocalStore`]: crate::LocalStore

pub mod chapters;
pub mod paths;
pub mod pending;
pub mod progress;

pub use chapters::{ChapterRepository, SqliteChapterRepository};
pub use paths::{LearningPathRepository, SqliteLearningPathRepository};
pub use pending::{PendingSyncRepository, SqlitePendingSyncRepository};
pub use progress::{ProgressRepository, SqliteProgressRepository};
