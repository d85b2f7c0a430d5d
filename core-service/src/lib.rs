//! Offline engine façade.
//!
//! This crate wires host-provided bridge implementations (HTTP, network
//! monitor, background executor) into the store, cache and sync crates and
//! exposes the result as one [`OfflineEngine`]. Desktop apps typically enable
//! the `desktop-shims` feature, which defaults the bridges to `bridge-desktop`.
//!
//! ```rust,ignore
//! use core_service::{InterceptedRequest, OfflineConfig, OfflineEngine};
//!
//! let config = OfflineConfig::builder()
//!     .database_path("offline.db")
//!     .base_url("https://learn.example.com")
//!     .build()?;
//! let engine = OfflineEngine::start(config).await?;
//! let response = engine
//!     .handle_request(InterceptedRequest::navigate(HttpRequest::get("https://learn.example.com/")))
//!     .await;
//! ```

pub mod engine;
pub mod error;
pub mod messages;
pub mod router;

pub use engine::{OfflineEngine, PrecacheReport};
pub use error::{EngineError, Result};
pub use messages::EngineMessage;
pub use router::{ContentResource, InterceptedRequest, RequestClass, RequestKind, RequestRouter};

pub use bridge_traits::http::{HttpMethod, HttpRequest, HttpResponse};
pub use core_cache::{CacheOutcome, CacheRegion};
pub use core_runtime::config::{OfflineConfig, OfflineConfigBuilder, RouteConfig, SyncSettings};
pub use core_runtime::events::{CoreEvent, EventStream, SyncEvent};
pub use core_store::{CachedChapter, CachedLearningPath, ProgressDraft, ProgressRecord, StoreStatistics};
pub use core_sync::{DrainOutcome, DrainReport};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{ManualNetworkMonitor, ReqwestHttpClient, TokioBackgroundExecutor};
