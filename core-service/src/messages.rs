//! Page → engine messages.
//!
//! Messages arrive as JSON objects tagged by `type`:
//!
//! ```json
//! { "type": "CACHE_LEARNING_PATH", "pathId": "rust-101", "path": { "id": "rust-101", "title": "Rust 101" } }
//! ```

use core_store::CachedLearningPath;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineMessage {
    /// Put a learning path into the content cache region.
    #[serde(rename_all = "camelCase")]
    CacheLearningPath {
        path_id: String,
        path: CachedLearningPath,
    },
}

impl EngineMessage {
    pub fn cache_learning_path(path: CachedLearningPath) -> Self {
        EngineMessage::CacheLearningPath {
            path_id: path.id.clone(),
            path,
        }
    }

    /// Wire tag of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineMessage::CacheLearningPath { .. } => "CACHE_LEARNING_PATH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_wire_format() {
        let message: EngineMessage = serde_json::from_value(json!({
            "type": "CACHE_LEARNING_PATH",
            "pathId": "rust-101",
            "path": {"id": "rust-101", "title": "Rust 101", "stages": []}
        }))
        .unwrap();

        let EngineMessage::CacheLearningPath { path_id, path } = &message;
        assert_eq!(path_id, "rust-101");
        assert_eq!(path.title, "Rust 101");
        assert_eq!(message.kind(), "CACHE_LEARNING_PATH");
    }

    #[test]
    fn test_serializes_with_tag() {
        let message = EngineMessage::cache_learning_path(CachedLearningPath::new("p1", "P"));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "CACHE_LEARNING_PATH");
        assert_eq!(value["pathId"], "p1");
    }
}
