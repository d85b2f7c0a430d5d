//! # Progress Sync
//!
//! Delivers locally saved mutations to the server once connectivity allows.
//!
//! ## Components
//!
//! - **Processor** (`processor`): drains the pending-sync queue with a
//!   re-entrancy guard, inline or through a background task
//! - **Remote** (`remote`): the [`ProgressApi`] seam and its HTTP
//!   implementation

pub mod error;
pub mod processor;
pub mod remote;

pub use error::{Result, SyncError};
pub use processor::{DrainOutcome, DrainReport, ItemFailure, SyncQueueProcessor, SYNC_TASK_TAG};
pub use remote::{HttpProgressApi, ProgressApi};
