//! Workspace façade crate.
//!
//! Host applications depend on `learnpath-offline` and pick a feature instead
//! of wiring each workspace crate by hand. `desktop-shims` (default) pulls in
//! the reqwest/tokio bridge implementations; `engine` exposes the engine
//! without desktop defaults so a host can inject its own bridges.

#[cfg(any(feature = "engine", feature = "desktop-shims"))]
pub use core_service::*;
