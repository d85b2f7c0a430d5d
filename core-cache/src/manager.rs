//! # Cache Tier Manager
//!
//! Applies a region's strategy to an intercepted request:
//!
//! | Region | Strategy | Network failure, nothing cached |
//! |--------|----------|---------------------------------|
//! | `static-assets` | cache-first | synthetic 408 |
//! | `api-responses` | network-first | synthetic 503 JSON, `"offline": true` |
//! | `learning-content` | stale-while-revalidate | [`CacheOutcome::Unavailable`] |
//!
//! Only 2xx responses are ever written to a region. Storage errors never
//! reach the caller: a failed read is treated as a miss and a failed write is
//! logged and dropped, so every strategy still yields a response.

use crate::error::Result;
use crate::region::{cache_key, CacheRegion, CachedResponse};
use crate::storage::CacheStorage;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Result of a stale-while-revalidate lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Answered by the network (the region was empty).
    Network(HttpResponse),
    /// Answered from the region; a background refresh was started.
    Cached(HttpResponse),
    /// Neither the region nor the network could answer.
    Unavailable,
}

impl CacheOutcome {
    pub fn into_response(self) -> Option<HttpResponse> {
        match self {
            CacheOutcome::Network(response) | CacheOutcome::Cached(response) => Some(response),
            CacheOutcome::Unavailable => None,
        }
    }
}

/// Synthetic 408 for a static asset that is neither cached nor reachable.
pub fn resource_unavailable() -> HttpResponse {
    HttpResponse::new(408, "Resource unavailable offline")
        .with_header("Content-Type", "text/plain; charset=utf-8")
}

/// Synthetic 503 for an API request made while offline.
pub fn offline_api_response() -> HttpResponse {
    let body = json!({
        "error": "You are offline. This data is not available offline.",
        "offline": true,
    });
    HttpResponse::new(503, body.to_string()).with_header("Content-Type", "application/json")
}

/// Strategy engine over the three cache regions. Cheap to clone.
#[derive(Clone)]
pub struct CacheManager {
    storage: Arc<dyn CacheStorage>,
    http_client: Arc<dyn HttpClient>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        http_client: Arc<dyn HttpClient>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            storage,
            http_client,
            event_bus,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Serve from the region when present; otherwise fetch and keep a
    /// successful response.
    #[instrument(skip(self, request), fields(region = %region, url = %request.url))]
    pub async fn cache_first(&self, region: CacheRegion, request: HttpRequest) -> HttpResponse {
        let key = cache_key(&request);

        if let Some(entry) = self.lookup(region, &key).await {
            debug!("Cache hit");
            return entry.to_response();
        }

        match self.http_client.execute(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(region, &key, &response).await;
                }
                response
            }
            Err(e) => {
                debug!(error = %e, "Cache miss and network unavailable");
                resource_unavailable()
            }
        }
    }

    /// Fetch first and refresh the region on success; serve the cached
    /// entry when the network fails.
    #[instrument(skip(self, request), fields(region = %region, url = %request.url))]
    pub async fn network_first(&self, region: CacheRegion, request: HttpRequest) -> HttpResponse {
        let key = cache_key(&request);

        match self.http_client.execute(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(region, &key, &response).await;
                }
                response
            }
            Err(e) => match self.lookup(region, &key).await {
                Some(entry) => {
                    debug!(error = %e, "Network failed, serving cached response");
                    entry.to_response()
                }
                None => {
                    debug!(error = %e, "Network failed and nothing cached");
                    offline_api_response()
                }
            },
        }
    }

    /// Serve the cached entry immediately and refresh it in the background.
    /// On a miss, wait for the network.
    #[instrument(skip(self, request), fields(region = %region, url = %request.url))]
    pub async fn stale_while_revalidate(
        &self,
        region: CacheRegion,
        request: HttpRequest,
    ) -> CacheOutcome {
        let key = cache_key(&request);

        if let Some(entry) = self.lookup(region, &key).await {
            self.spawn_refresh(region, key, request);
            return CacheOutcome::Cached(entry.to_response());
        }

        match self.http_client.execute(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(region, &key, &response).await;
                }
                CacheOutcome::Network(response)
            }
            Err(e) => {
                debug!(error = %e, "Content not cached and network unavailable");
                CacheOutcome::Unavailable
            }
        }
    }

    /// Send a request without touching any region.
    pub async fn network_only(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.http_client.execute(request).await
    }

    fn spawn_refresh(&self, region: CacheRegion, key: String, request: HttpRequest) {
        let manager = self.clone();

        tokio::spawn(async move {
            let outcome = match manager.http_client.execute(request).await {
                Ok(response) if response.is_success() => {
                    match manager.write(region, &key, &response).await {
                        Ok(()) => Ok(()),
                        Err(e) => Err(e.to_string()),
                    }
                }
                Ok(response) => Err(format!("server answered {}", response.status)),
                Err(e) => Err(e.to_string()),
            };

            let event = match outcome {
                Ok(()) => {
                    debug!(region = %region, key = %key, "Background refresh stored");
                    CacheEvent::Refreshed {
                        region: region.name().to_string(),
                        key,
                    }
                }
                Err(message) => {
                    debug!(region = %region, key = %key, error = %message, "Background refresh failed");
                    CacheEvent::RefreshFailed {
                        region: region.name().to_string(),
                        key,
                        message,
                    }
                }
            };
            let _ = manager.event_bus.emit(CoreEvent::Cache(event));
        });
    }

    /// Explicitly place a response in a region.
    pub async fn put(
        &self,
        region: CacheRegion,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> Result<()> {
        let key = cache_key(request);
        self.write(region, &key, response).await?;

        let _ = self.event_bus.emit(CoreEvent::Cache(CacheEvent::Populated {
            region: region.name().to_string(),
            key,
        }));
        Ok(())
    }

    pub async fn get(
        &self,
        region: CacheRegion,
        request: &HttpRequest,
    ) -> Result<Option<HttpResponse>> {
        Ok(self
            .storage
            .get(region, &cache_key(request))
            .await?
            .map(|entry| entry.to_response()))
    }

    pub async fn delete(&self, region: CacheRegion, request: &HttpRequest) -> Result<bool> {
        self.storage.delete(region, &cache_key(request)).await
    }

    pub async fn clear_region(&self, region: CacheRegion) -> Result<u64> {
        self.storage.clear_region(region).await
    }

    pub async fn entry_count(&self, region: CacheRegion) -> Result<u64> {
        self.storage.entry_count(region).await
    }

    async fn write(&self, region: CacheRegion, key: &str, response: &HttpResponse) -> Result<()> {
        let entry = CachedResponse::from_response(response, self.clock.unix_timestamp_millis());
        self.storage.put(region, key, &entry).await
    }

    async fn lookup(&self, region: CacheRegion, key: &str) -> Option<CachedResponse> {
        match self.storage.get(region, key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(region = %region, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store(&self, region: CacheRegion, key: &str, response: &HttpResponse) {
        if let Err(e) = self.write(region, key, response).await {
            warn!(region = %region, error = %e, "Cache write failed");
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager").finish_non_exhaustive()
    }
}
