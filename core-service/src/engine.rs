//! # Offline Engine
//!
//! [`OfflineEngine`] is the single context object hosts hold. It wires the
//! connectivity monitor, the durable store, the cache regions, the request
//! router and the sync queue together.
//!
//! ## Degraded start
//!
//! If the store cannot be opened the engine still starts: cache regions fall
//! back to memory, content requests skip the store fallback, and store
//! operations return [`EngineError::StoreUnavailable`].

use crate::error::{EngineError, Result};
use crate::messages::EngineMessage;
use crate::router::{ContentResource, InterceptedRequest, RequestClass, RequestRouter};
use bridge_traits::http::{HttpMethod, HttpRequest, HttpResponse};
use core_cache::{
    offline_api_response, CacheManager, CacheOutcome, CacheRegion, CacheStorage,
    MemoryCacheStorage, SqliteCacheStorage,
};
use core_runtime::config::{DatabaseLocation, OfflineConfig};
use core_runtime::connectivity::{ConnectivityMonitor, ConnectivitySubscription};
use core_runtime::events::{EventBus, EventStream};
use core_store::{
    CachedChapter, CachedLearningPath, DatabaseConfig, LocalStore, ProgressDraft, ProgressRecord,
    StoreStatistics,
};
use core_sync::{DrainOutcome, HttpProgressApi, SyncQueueProcessor};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const MESSAGE_BUFFER: usize = 64;

/// Outcome of [`OfflineEngine::precache`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecacheReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

pub struct OfflineEngine {
    config: OfflineConfig,
    event_bus: EventBus,
    connectivity: Arc<ConnectivityMonitor>,
    store: Option<LocalStore>,
    cache: CacheManager,
    router: RequestRouter,
    sync: Option<Arc<SyncQueueProcessor>>,
    messages: mpsc::Sender<EngineMessage>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl OfflineEngine {
    /// Build the engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// Only for an invalid route configuration. A store that fails to open
    /// degrades the engine instead of failing it.
    #[instrument(skip(config), fields(base_url = %config.base_url))]
    pub async fn start(config: OfflineConfig) -> Result<Arc<Self>> {
        let event_bus = EventBus::new(config.event_buffer_size);
        let router = RequestRouter::new(config.routes.clone())?;

        let connectivity = Arc::new(match &config.network_monitor {
            Some(platform) => ConnectivityMonitor::from_platform(platform.as_ref(), event_bus.clone()).await,
            None => ConnectivityMonitor::new(true, event_bus.clone()),
        });

        let database = match &config.database {
            DatabaseLocation::File(path) => DatabaseConfig::new(path.clone()),
            DatabaseLocation::InMemory => DatabaseConfig::in_memory(),
        };
        let store = match LocalStore::open(database).await {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "Offline store unavailable, continuing without it");
                None
            }
        };

        let storage = cache_storage(store.as_ref()).await;
        let cache = CacheManager::new(storage, config.http_client.clone(), event_bus.clone());

        let sync = store.as_ref().map(|store| {
            let api = HttpProgressApi::new(config.http_client.clone(), config.progress_endpoint_url());
            let mut processor = SyncQueueProcessor::new(
                store.pending_queue(),
                Arc::new(api),
                connectivity.clone(),
                event_bus.clone(),
            );
            if let Some(executor) = &config.background_executor {
                processor = processor.with_background_executor(executor.clone(), config.sync.task_tag.clone());
            }
            let processor = Arc::new(processor);
            connectivity.set_sync_trigger(processor.trigger());
            processor
        });

        let (messages, inbox) = mpsc::channel(MESSAGE_BUFFER);

        let engine = Arc::new(Self {
            config,
            event_bus,
            connectivity,
            store,
            cache,
            router,
            sync,
            messages,
            tasks: Mutex::new(Vec::new()),
        });

        engine.spawn_message_pump(inbox);

        if let Some(platform) = engine.config.network_monitor.clone() {
            match engine.connectivity.watch_platform(platform).await {
                Ok(handle) => engine.tasks.lock().push(handle),
                Err(e) => warn!(error = %e, "Platform connectivity stream unavailable"),
            }
        }

        info!(
            offline = engine.connectivity.is_offline(),
            store = engine.store.is_some(),
            "Offline engine started"
        );
        Ok(engine)
    }

    fn spawn_message_pump(self: &Arc<Self>, mut inbox: mpsc::Receiver<EngineMessage>) {
        let engine: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let kind = message.kind();
                if let Err(e) = engine.handle_message(message).await {
                    warn!(message = kind, error = %e, "Page message failed");
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    // ---- accessors -----------------------------------------------------

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn is_offline(&self) -> bool {
        self.connectivity.is_offline()
    }

    pub fn subscribe_connectivity(&self) -> ConnectivitySubscription {
        self.connectivity.subscribe()
    }

    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&LocalStore> {
        self.store.as_ref().ok_or(EngineError::StoreUnavailable)
    }

    fn sync_processor(&self) -> Result<&Arc<SyncQueueProcessor>> {
        self.sync.as_ref().ok_or(EngineError::StoreUnavailable)
    }

    // ---- interception --------------------------------------------------

    /// Answer an intercepted request. Never fails: every path produces a
    /// response.
    #[instrument(skip(self, intercepted), fields(method = %intercepted.request.method, url = %intercepted.request.url))]
    pub async fn handle_request(&self, intercepted: InterceptedRequest) -> HttpResponse {
        let class = self.router.classify(&intercepted.request.url);
        let cacheable = intercepted.request.method == HttpMethod::Get;
        debug!(?class, cacheable, "Routing request");

        match class {
            RequestClass::Static if cacheable => {
                self.cache
                    .cache_first(CacheRegion::StaticAssets, intercepted.request)
                    .await
            }
            RequestClass::Api if cacheable => {
                self.cache
                    .network_first(CacheRegion::ApiResponses, intercepted.request)
                    .await
            }
            RequestClass::LearningContent(resource) if cacheable => {
                match self
                    .cache
                    .stale_while_revalidate(CacheRegion::LearningContent, intercepted.request)
                    .await
                {
                    CacheOutcome::Network(response) | CacheOutcome::Cached(response) => response,
                    CacheOutcome::Unavailable => self.from_store(&resource).await,
                }
            }
            RequestClass::Api | RequestClass::LearningContent(_) => {
                match self.cache.network_only(intercepted.request).await {
                    Ok(response) => response,
                    Err(e) => {
                        debug!(error = %e, "API write failed while offline");
                        offline_api_response()
                    }
                }
            }
            RequestClass::Static | RequestClass::Other => self.network_or_offline_page(intercepted).await,
        }
    }

    async fn network_or_offline_page(&self, intercepted: InterceptedRequest) -> HttpResponse {
        let is_navigation = intercepted.is_navigation();

        match self.cache.network_only(intercepted.request).await {
            Ok(response) => response,
            Err(e) if is_navigation => {
                debug!(error = %e, "Navigation failed, serving offline page");
                match self.cache.get(CacheRegion::StaticAssets, &self.offline_page_request()).await {
                    Ok(Some(page)) => page,
                    Ok(None) => offline_html(),
                    Err(e) => {
                        warn!(error = %e, "Offline page lookup failed");
                        offline_html()
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "Request failed while offline");
                HttpResponse::new(503, "Service unavailable offline")
                    .with_header("Content-Type", "text/plain; charset=utf-8")
            }
        }
    }

    fn offline_page_request(&self) -> HttpRequest {
        HttpRequest::get(self.absolute_url(&self.config.routes.offline_page))
    }

    fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Serve learning content from the durable store.
    async fn from_store(&self, resource: &ContentResource) -> HttpResponse {
        let Some(store) = &self.store else {
            return not_available_offline(resource);
        };

        match stored_content(store, resource).await {
            Ok(Some(body)) => {
                debug!(path_id = resource.path_id(), "Served from offline store");
                HttpResponse::new(200, body.to_string())
                    .with_header("Content-Type", "application/json")
                    .with_header("X-Offline-Source", "local-store")
            }
            Ok(None) => not_available_offline(resource),
            Err(e) => {
                warn!(error = %e, "Offline store lookup failed");
                not_available_offline(resource)
            }
        }
    }

    // ---- progress and sync ---------------------------------------------

    /// Save progress locally and queue it for the server. When online a
    /// drain is started in the background; the save does not wait for it.
    #[instrument(skip(self, draft), fields(path_id = %draft.path_id, chapter_id = %draft.chapter_id))]
    pub async fn save_progress(&self, draft: ProgressDraft) -> Result<ProgressRecord> {
        let record = self.store()?.save_progress(&draft).await?;

        if self.connectivity.is_online() {
            if let Some(processor) = self.sync.clone() {
                tokio::spawn(async move {
                    if let Err(e) = processor.drain().await {
                        warn!(error = %e, "Drain after save failed");
                    }
                });
            }
        }

        Ok(record)
    }

    pub async fn get_progress(
        &self,
        user_id: &str,
        path_id: &str,
        chapter_id: &str,
    ) -> Result<Option<ProgressRecord>> {
        Ok(self.store()?.get_progress(user_id, path_id, chapter_id).await?)
    }

    pub async fn pending_sync_count(&self) -> Result<u64> {
        Ok(self.store()?.pending_count().await?)
    }

    /// Drain the pending queue now. Shares the in-flight guard with
    /// reconnect drains.
    pub async fn sync_now(&self) -> Result<DrainOutcome> {
        Ok(self.sync_processor()?.drain().await?)
    }

    pub async fn statistics(&self) -> Result<StoreStatistics> {
        Ok(self.store()?.statistics().await?)
    }

    // ---- page messages -------------------------------------------------

    /// Sender for page messages; they are handled in order.
    pub fn message_sender(&self) -> mpsc::Sender<EngineMessage> {
        self.messages.clone()
    }

    pub async fn post_message(&self, message: EngineMessage) -> Result<()> {
        self.messages
            .send(message)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn handle_message(&self, message: EngineMessage) -> Result<()> {
        match message {
            EngineMessage::CacheLearningPath { path_id, path } => {
                let resource = ContentResource::Path { path_id };
                self.populate(&resource, &serde_json::to_value(&path)?).await
            }
        }
    }

    async fn populate(&self, resource: &ContentResource, body: &serde_json::Value) -> Result<()> {
        let request = HttpRequest::get(self.router.content_url(&self.config.base_url, resource));
        let response = HttpResponse::new(200, body.to_string())
            .with_header("Content-Type", "application/json");

        self.cache
            .put(CacheRegion::LearningContent, &request, &response)
            .await?;
        Ok(())
    }

    // ---- offline copies ------------------------------------------------

    /// Store a path and its chapters and seed the content region with them.
    #[instrument(skip(self, path, chapters), fields(path_id = %path.id))]
    pub async fn download_path_for_offline(
        &self,
        path: CachedLearningPath,
        chapters: Vec<CachedChapter>,
    ) -> Result<()> {
        self.store()?.store_path_for_offline(&path, &chapters).await?;

        let path_id = path.id.clone();
        self.populate(
            &ContentResource::Path {
                path_id: path_id.clone(),
            },
            &serde_json::to_value(&path)?,
        )
        .await?;
        self.populate(
            &ContentResource::ChapterList {
                path_id: path_id.clone(),
            },
            &serde_json::to_value(&chapters)?,
        )
        .await?;
        for chapter in &chapters {
            self.populate(
                &ContentResource::Chapter {
                    path_id: path_id.clone(),
                    chapter_id: chapter.id.clone(),
                },
                &serde_json::to_value(chapter)?,
            )
            .await?;
        }

        info!(chapters = chapters.len(), "Learning path available offline");
        Ok(())
    }

    /// Delete a path, its chapters, and their content-region entries.
    #[instrument(skip(self))]
    pub async fn remove_offline_copy(&self, path_id: &str) -> Result<bool> {
        let store = self.store()?;
        let chapters = store.chapters_for_path(path_id).await?;
        let removed = store.remove_path(path_id).await?;

        let mut resources = vec![
            ContentResource::Path {
                path_id: path_id.to_string(),
            },
            ContentResource::ChapterList {
                path_id: path_id.to_string(),
            },
        ];
        resources.extend(chapters.into_iter().map(|chapter| ContentResource::Chapter {
            path_id: path_id.to_string(),
            chapter_id: chapter.id,
        }));

        for resource in &resources {
            let request = HttpRequest::get(self.router.content_url(&self.config.base_url, resource));
            self.cache
                .delete(CacheRegion::LearningContent, &request)
                .await?;
        }

        Ok(removed)
    }

    pub async fn is_available_offline(&self, path_id: &str) -> Result<bool> {
        Ok(self.store()?.get_path(path_id).await?.is_some())
    }

    pub async fn offline_paths(&self) -> Result<Vec<CachedLearningPath>> {
        Ok(self.store()?.all_paths().await?)
    }

    /// Fetch app-shell resources into the static region. The offline page
    /// is always included.
    pub async fn precache(&self, paths: &[&str]) -> PrecacheReport {
        let mut report = PrecacheReport::default();
        let offline_page = self.config.routes.offline_page.clone();

        let all = std::iter::once(offline_page.as_str())
            .chain(paths.iter().copied().filter(|p| *p != offline_page));

        for path in all {
            let request = HttpRequest::get(self.absolute_url(path));
            let stored = match self.cache.network_only(request.clone()).await {
                Ok(response) if response.is_success() => self
                    .cache
                    .put(CacheRegion::StaticAssets, &request, &response)
                    .await
                    .is_ok(),
                Ok(_) | Err(_) => false,
            };

            if stored {
                report.cached.push(path.to_string());
            } else {
                report.failed.push(path.to_string());
            }
        }

        debug!(cached = report.cached.len(), failed = report.failed.len(), "Precache finished");
        report
    }
}

impl Drop for OfflineEngine {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for OfflineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineEngine")
            .field("base_url", &self.config.base_url)
            .field("offline", &self.is_offline())
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

async fn cache_storage(store: Option<&LocalStore>) -> Arc<dyn CacheStorage> {
    if let Some(store) = store {
        let storage = SqliteCacheStorage::new(store.pool().clone());
        match storage.initialize().await {
            Ok(()) => return Arc::new(storage),
            Err(e) => warn!(error = %e, "Persistent cache unavailable, using memory"),
        }
    }
    Arc::new(MemoryCacheStorage::new())
}

/// Stored entity for a content resource, `None` when it was never saved.
async fn stored_content(
    store: &LocalStore,
    resource: &ContentResource,
) -> Result<Option<serde_json::Value>> {
    let body = match resource {
        ContentResource::Path { path_id } => store
            .get_path(path_id)
            .await?
            .map(serde_json::to_value)
            .transpose()?,
        ContentResource::ChapterList { path_id } => {
            let path = store.get_path(path_id).await?;
            let chapters = store.chapters_for_path(path_id).await?;
            if path.is_none() && chapters.is_empty() {
                None
            } else {
                Some(serde_json::to_value(&chapters)?)
            }
        }
        ContentResource::Chapter {
            path_id,
            chapter_id,
        } => store
            .get_chapter(chapter_id)
            .await?
            .filter(|chapter| &chapter.path_id == path_id)
            .map(serde_json::to_value)
            .transpose()?,
    };
    Ok(body)
}

fn not_available_offline(resource: &ContentResource) -> HttpResponse {
    let body = json!({
        "error": "This content is not available offline",
        "offline": true,
        "pathId": resource.path_id(),
    });
    HttpResponse::new(404, body.to_string()).with_header("Content-Type", "application/json")
}

fn offline_html() -> HttpResponse {
    HttpResponse::new(
        503,
        "<!DOCTYPE html><html><head><title>Offline</title></head>\
         <body><h1>You are offline</h1><p>This page is not available offline.</p></body></html>",
    )
    .with_header("Content-Type", "text/html; charset=utf-8")
}
