use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] BridgeError),

    #[error("Unknown cache region: {0}")]
    UnknownRegion(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
