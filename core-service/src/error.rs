use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Offline store is unavailable")]
    StoreUnavailable,

    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Store error: {0}")]
    Store(#[from] core_store::StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Cannot encode offline content: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid route pattern: {0}")]
    Route(#[from] regex::Error),

    #[error("Message channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, EngineError>;
