//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `NetworkMonitor` using a socket reachability probe, or a manually driven
//!   monitor for hosts that already receive OS connectivity callbacks
//! - `BackgroundExecutor` using the Tokio task pool
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient, TokioBackgroundExecutor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let monitor = Arc::new(DesktopNetworkMonitor::new());
//!     let http_client = Arc::new(ReqwestHttpClient::new()?);
//!     let executor = Arc::new(TokioBackgroundExecutor::with_network_monitor(Some(monitor.clone())));
//!
//!     // Hand these to OfflineConfig::builder()
//! }
//! ```

mod background;
mod http;
mod network;

pub use background::TokioBackgroundExecutor;
pub use http::ReqwestHttpClient;
pub use network::{DesktopNetworkMonitor, ManualNetworkMonitor};
