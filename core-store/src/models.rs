//! Entities persisted by the local durable store.
//!
//! Content entities keep every field they arrive with: the engine reads only
//! the identifiers, everything else is carried through `extra` untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A learning path saved for offline use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLearningPath {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub stages: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedLearningPath {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            stages: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("learning path id cannot be empty".to_string());
        }
        Ok(())
    }
}

/// A chapter belonging to a saved learning path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedChapter {
    pub id: String,
    pub path_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedChapter {
    pub fn new(id: impl Into<String>, path_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path_id: path_id.into(),
            extra: Map::new(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("chapter id cannot be empty".to_string());
        }
        if self.path_id.trim().is_empty() {
            return Err("chapter path id cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Progress as submitted by the page, before the store stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDraft {
    pub user_id: String,
    pub path_id: String,
    pub chapter_id: String,
    /// Free-form progress data (completion, score, position, ...)
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ProgressDraft {
    pub fn new(
        user_id: impl Into<String>,
        path_id: impl Into<String>,
        chapter_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            path_id: path_id.into(),
            chapter_id: chapter_id.into(),
            payload: Map::new(),
        }
    }

    /// Adds a payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, value) in [
            ("userId", &self.user_id),
            ("pathId", &self.path_id),
            ("chapterId", &self.chapter_id),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{} cannot be empty", name));
            }
        }

        if let Some(reserved) = ["id", "timestamp"]
            .iter()
            .find(|key| self.payload.contains_key(**key))
        {
            return Err(format!("payload field '{}' is reserved", reserved));
        }

        Ok(())
    }
}

/// A stored progress row. Rows are never updated; a newer save is a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: i64,
    pub user_id: String,
    pub path_id: String,
    pub chapter_id: String,
    /// Creation time, Unix epoch milliseconds
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Kind of mutation waiting in the pending-sync queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingKind {
    Progress,
}

impl PendingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingKind::Progress => "PROGRESS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PROGRESS" => Some(PendingKind::Progress),
            _ => None,
        }
    }
}

impl std::fmt::Display for PendingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation not yet acknowledged by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSyncItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: PendingKind,
    pub data: Value,
    /// Enqueue time, Unix epoch milliseconds
    pub timestamp: i64,
}

/// Row counts per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatistics {
    pub learning_paths: u64,
    pub chapters: u64,
    pub progress_records: u64,
    pub pending_sync: u64,
}
