use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_cache::{CacheManager, CacheOutcome, CacheRegion, MemoryCacheStorage};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Server that answers from a script and counts calls.
#[derive(Default)]
struct ScriptedServer {
    replies: Mutex<VecDeque<BridgeResult<HttpResponse>>>,
    calls: AtomicUsize,
}

impl ScriptedServer {
    fn reply(&self, reply: BridgeResult<HttpResponse>) {
        self.replies.lock().push_back(reply);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for ScriptedServer {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(BridgeError::Network("no scripted reply".to_string())))
    }
}

fn offline() -> BridgeResult<HttpResponse> {
    Err(BridgeError::Network("offline".to_string()))
}

fn setup() -> (Arc<ScriptedServer>, CacheManager, EventBus) {
    let server = Arc::new(ScriptedServer::default());
    let events = EventBus::new(32);
    let manager = CacheManager::new(
        Arc::new(MemoryCacheStorage::new()),
        server.clone(),
        events.clone(),
    );
    (server, manager, events)
}

#[tokio::test]
async fn test_static_second_request_skips_network() {
    let (server, manager, _) = setup();
    server.reply(Ok(HttpResponse::new(200, "body{color:red}")));

    let url = "https://learn.example.com/styles/main.css";
    let first = manager
        .cache_first(CacheRegion::StaticAssets, HttpRequest::get(url))
        .await;
    let second = manager
        .cache_first(CacheRegion::StaticAssets, HttpRequest::get(url))
        .await;

    assert_eq!(server.calls(), 1);
    assert_eq!(first.body, second.body);
}

#[tokio::test]
async fn test_api_failure_serves_byte_identical_cached_body() {
    let (server, manager, _) = setup();
    let body: &[u8] = b"{\"user\":{\"id\":\"u1\",\"name\":\"Ada\"}}";
    server.reply(Ok(HttpResponse::new(200, body)));
    server.reply(offline());

    let url = "https://learn.example.com/api/users/me";
    let online = manager
        .network_first(CacheRegion::ApiResponses, HttpRequest::get(url))
        .await;
    let fallback = manager
        .network_first(CacheRegion::ApiResponses, HttpRequest::get(url))
        .await;

    assert_eq!(server.calls(), 2);
    assert_eq!(online.body.as_ref(), body);
    assert_eq!(fallback.status, 200);
    assert_eq!(fallback.body.as_ref(), body);
}

#[tokio::test]
async fn test_swr_hit_returns_stale_then_refreshes() {
    let (server, manager, events) = setup();
    let mut receiver = events.subscribe();
    server.reply(Ok(HttpResponse::new(200, "v1")));
    server.reply(Ok(HttpResponse::new(200, "v2")));

    let url = "https://learn.example.com/paths/rust-101";
    let first = manager
        .stale_while_revalidate(CacheRegion::LearningContent, HttpRequest::get(url))
        .await;
    assert!(matches!(first, CacheOutcome::Network(ref r) if r.body.as_ref() == b"v1"));

    let second = manager
        .stale_while_revalidate(CacheRegion::LearningContent, HttpRequest::get(url))
        .await;
    assert!(matches!(second, CacheOutcome::Cached(ref r) if r.body.as_ref() == b"v1"));

    let event = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, CoreEvent::Cache(CacheEvent::Refreshed { .. })));

    let third = manager
        .stale_while_revalidate(CacheRegion::LearningContent, HttpRequest::get(url))
        .await;
    assert!(matches!(third, CacheOutcome::Cached(ref r) if r.body.as_ref() == b"v2"));
}

#[tokio::test]
async fn test_swr_refresh_failure_keeps_entry() {
    let (server, manager, events) = setup();
    let mut receiver = events.subscribe();
    server.reply(Ok(HttpResponse::new(200, "v1")));
    server.reply(offline());

    let url = "https://learn.example.com/paths/rust-101/chapters";
    manager
        .stale_while_revalidate(CacheRegion::LearningContent, HttpRequest::get(url))
        .await;
    let cached = manager
        .stale_while_revalidate(CacheRegion::LearningContent, HttpRequest::get(url))
        .await;
    assert!(matches!(cached, CacheOutcome::Cached(_)));

    let event = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, CoreEvent::Cache(CacheEvent::RefreshFailed { .. })));

    let response = manager
        .get(CacheRegion::LearningContent, &HttpRequest::get(url))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.body.as_ref(), b"v1");
}
