//! # Engine Configuration Module
//!
//! Provides configuration management for the offline engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an
//! [`OfflineConfig`] that holds the host bridges and the routing/sync settings.
//! It enforces fail-fast validation so a misconfigured engine never starts.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - network side of every intercepted request and of the
//!   remote progress endpoint
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - platform connectivity signals (without it the engine
//!   starts online and relies on hosts calling `handle_signal`)
//! - `BackgroundExecutor` - deferred sync; without it drains run in-process
//!
//! When the `desktop-shims` feature is enabled, the reqwest client and the
//! desktop network monitor are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::OfflineConfig;
//!
//! let config = OfflineConfig::builder()
//!     .database_path("/var/lib/learnpath/offline.db")
//!     .base_url("https://learn.example.com")
//!     .build()?;
//! # Ok::<(), core_runtime::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{BackgroundExecutor, HttpClient, NetworkMonitor};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the durable store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// SQLite file, created on first open.
    File(PathBuf),
    /// Private in-memory database; contents vanish with the engine.
    InMemory,
}

/// URL classification rules used by the request router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Path suffixes served cache-first (e.g. `.js`, `.woff2`)
    pub static_extensions: Vec<String>,
    /// Path prefixes served cache-first (e.g. `/static/`)
    pub static_prefixes: Vec<String>,
    /// Path prefixes served network-first
    pub api_prefixes: Vec<String>,
    /// Resource names matched as `/{resource}/{pathId}(/chapters(/{chapterId})?)?`,
    /// optionally under `/api/`. The first one names the URLs written when
    /// content is cached explicitly.
    pub content_resources: Vec<String>,
    /// Cached page served to navigations that fail while offline
    pub offline_page: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        let strings =
            |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };

        Self {
            static_extensions: strings(&[
                ".js", ".css", ".png", ".jpg", ".jpeg", ".svg", ".ico", ".woff", ".woff2", ".ttf",
                ".webp", ".gif",
            ]),
            static_prefixes: strings(&["/static/", "/assets/"]),
            api_prefixes: strings(&[
                "/api/auth",
                "/api/progress",
                "/api/users",
                "/api/learning-paths",
                "/api/paths",
                "/api/chapters",
                "/api/exercises",
            ]),
            content_resources: strings(&["learning-paths", "paths"]),
            offline_page: "/offline.html".to_string(),
        }
    }
}

impl RouteConfig {
    fn validate(&self) -> Result<()> {
        if self.content_resources.is_empty() {
            return Err(Error::Config(
                "At least one learning content resource name is required".to_string(),
            ));
        }

        if let Some(bad) = self
            .content_resources
            .iter()
            .find(|r| r.is_empty() || r.contains('/'))
        {
            return Err(Error::Config(format!(
                "Content resource '{}' must be a single non-empty path segment",
                bad
            )));
        }

        let prefixed = self
            .static_prefixes
            .iter()
            .chain(self.api_prefixes.iter())
            .chain(std::iter::once(&self.offline_page));
        for prefix in prefixed {
            if !prefix.starts_with('/') {
                return Err(Error::Config(format!(
                    "Route prefix '{}' must start with '/'",
                    prefix
                )));
            }
        }

        if let Some(bad) = self.static_extensions.iter().find(|e| !e.starts_with('.')) {
            return Err(Error::Config(format!(
                "Static extension '{}' must start with '.'",
                bad
            )));
        }

        Ok(())
    }
}

/// Settings for the pending-queue processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Path appended to `base_url` for progress submissions
    pub progress_endpoint: String,
    /// Tag of the one-shot background task
    pub task_tag: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            progress_endpoint: "/api/progress".to_string(),
            task_tag: "sync-learning-progress".to_string(),
        }
    }
}

/// Engine configuration.
///
/// Use [`OfflineConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct OfflineConfig {
    /// Durable store location
    pub database: DatabaseLocation,

    /// Origin of the learning platform, e.g. `https://learn.example.com`
    pub base_url: String,

    /// HTTP client for intercepted requests and sync submissions
    pub http_client: Arc<dyn HttpClient>,

    /// Network connectivity monitor (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Background task executor (optional)
    pub background_executor: Option<Arc<dyn BackgroundExecutor>>,

    /// Request classification rules
    pub routes: RouteConfig,

    /// Sync queue settings
    pub sync: SyncSettings,

    /// Event bus buffer size
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for OfflineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineConfig")
            .field("database", &self.database)
            .field("base_url", &self.base_url)
            .field("http_client", &"HttpClient { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field(
                "background_executor",
                &self
                    .background_executor
                    .as_ref()
                    .map(|_| "BackgroundExecutor { ... }"),
            )
            .field("routes", &self.routes)
            .field("sync", &self.sync)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl OfflineConfig {
    /// Creates a new builder for constructing an `OfflineConfig`.
    pub fn builder() -> OfflineConfigBuilder {
        OfflineConfigBuilder::default()
    }

    /// Full URL of the progress submission endpoint.
    pub fn progress_endpoint_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.sync.progress_endpoint
        )
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Base URL is an absolute http(s) URL
    /// - Route rules are well-formed
    /// - Sync endpoint and task tag are usable
    /// - Event buffer size is non-zero
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", self.base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Base URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        self.routes.validate()?;

        if !self.sync.progress_endpoint.starts_with('/') {
            return Err(Error::Config(
                "Progress endpoint must start with '/'".to_string(),
            ));
        }

        if self.sync.task_tag.trim().is_empty() {
            return Err(Error::Config(
                "Background sync task tag cannot be empty".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the network. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile/Web: inject the platform fetch implementation."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    use bridge_desktop::DesktopNetworkMonitor;

    Some(Arc::new(DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    None
}

/// Builder for constructing [`OfflineConfig`] instances.
#[derive(Default)]
pub struct OfflineConfigBuilder {
    database: Option<DatabaseLocation>,
    base_url: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    background_executor: Option<Arc<dyn BackgroundExecutor>>,
    routes: Option<RouteConfig>,
    sync: Option<SyncSettings>,
    event_buffer_size: Option<usize>,
}

impl OfflineConfigBuilder {
    /// Sets the SQLite database file path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    /// Uses a private in-memory database instead of a file.
    pub fn in_memory_database(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    /// Sets the platform origin used to build sync URLs.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the network monitor implementation.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Sets the background executor implementation.
    pub fn background_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.background_executor = Some(executor);
        self
    }

    /// Replaces the routing rules.
    pub fn routes(mut self, routes: RouteConfig) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Replaces the sync queue settings.
    pub fn sync(mut self, sync: SyncSettings) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `OfflineConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the database location or base URL is missing,
    ///   or any value fails validation
    /// - [`Error::CapabilityMissing`] if no `HttpClient` was provided and no
    ///   platform default is compiled in
    pub fn build(self) -> Result<OfflineConfig> {
        let database = self.database.ok_or_else(|| {
            Error::Config(
                "Database location is required. Use .database_path() or .in_memory_database()."
                    .to_string(),
            )
        })?;

        let base_url = self.base_url.ok_or_else(|| {
            Error::Config("Base URL is required. Use .base_url() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let network_monitor = self
            .network_monitor
            .or_else(provide_default_network_monitor);

        let config = OfflineConfig {
            database,
            base_url,
            http_client,
            network_monitor,
            background_executor: self.background_executor,
            routes: self.routes.unwrap_or_default(),
            sync: self.sync.unwrap_or_default(),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
