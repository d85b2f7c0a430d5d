use bridge_traits::error::BridgeError;
use core_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Offline store error: {0}")]
    Store(#[from] StoreError),

    #[error("Remote call failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Server rejected item with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed pending item {item_id}: {message}")]
    MalformedItem { item_id: i64, message: String },

    #[error("Background scheduling failed: {0}")]
    Scheduling(String),
}

impl SyncError {
    /// Whether the server was never reached.
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Bridge(e) if e.is_network())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
