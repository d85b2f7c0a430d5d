//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the offline engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - Connectivity state machine shared by every engine component
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the store, cache, sync and
//! service crates depend on. It establishes the logging conventions, the event
//! broadcasting mechanism and the single source of truth for "are we offline".

pub mod config;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod logging;

pub use connectivity::{ConnectivityMonitor, ConnectivitySubscription, SyncTrigger};
pub use error::{Error, Result};
