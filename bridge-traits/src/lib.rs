//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! The offline engine never talks to a browser, an OS scheduler or a socket
//! directly. Everything it needs from the host is expressed as a trait here:
//!
//! - [`HttpClient`](http::HttpClient) - the network side of request interception
//!   and the remote sync endpoint
//! - [`NetworkMonitor`](network::NetworkMonitor) - raw connectivity signals
//! - [`BackgroundExecutor`](background::BackgroundExecutor) - deferred-task
//!   scheduler used by the sync queue ("background sync")
//! - [`Clock`](time::Clock) - time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Mobile   | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map "no response could be obtained" failures to
//! [`BridgeError::Network`] so callers can tell an unreachable server apart from
//! a server that answered with an error status.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared across the engine's tasks behind an `Arc`.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyHttpClient {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl HttpClient for MyHttpClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         // Implementation
//!         todo!()
//!     }
//! }
//! ```

pub mod background;
pub mod error;
pub mod http;
pub mod network;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::{BackgroundExecutor, TaskConstraints, TaskHandler, TaskId, TaskStatus};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
