use async_trait::async_trait;
use bridge_desktop::TokioBackgroundExecutor;
use bridge_traits::error::BridgeError;
use core_runtime::connectivity::ConnectivityMonitor;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_store::{LocalStore, ProgressDraft, ProgressRecord};
use core_sync::{DrainOutcome, ProgressApi, SyncError, SyncQueueProcessor, SYNC_TASK_TAG};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Server that refuses chosen chapters and records what it accepted.
#[derive(Default)]
struct ScriptedServer {
    refuse: Mutex<HashSet<String>>,
    accepted: Mutex<Vec<String>>,
    calls: Mutex<usize>,
}

impl ScriptedServer {
    fn refuse(&self, chapter_id: &str) {
        self.refuse.lock().insert(chapter_id.to_string());
    }

    fn accept_all(&self) {
        self.refuse.lock().clear();
    }

    fn calls(&self) -> usize {
        *self.calls.lock()
    }

    fn accepted(&self) -> Vec<String> {
        self.accepted.lock().clone()
    }
}

#[async_trait]
impl ProgressApi for ScriptedServer {
    async fn submit_progress(&self, record: &ProgressRecord) -> core_sync::Result<()> {
        *self.calls.lock() += 1;
        if self.refuse.lock().contains(&record.chapter_id) {
            return Err(SyncError::Bridge(BridgeError::Network(
                "connection reset".to_string(),
            )));
        }
        self.accepted.lock().push(record.chapter_id.clone());
        Ok(())
    }
}

struct Harness {
    store: LocalStore,
    server: Arc<ScriptedServer>,
    events: EventBus,
    connectivity: Arc<ConnectivityMonitor>,
}

async fn harness(online: bool) -> Harness {
    let events = EventBus::new(64);
    Harness {
        store: LocalStore::in_memory().await.unwrap(),
        server: Arc::new(ScriptedServer::default()),
        connectivity: Arc::new(ConnectivityMonitor::new(online, events.clone())),
        events,
    }
}

impl Harness {
    fn processor(&self) -> Arc<SyncQueueProcessor> {
        Arc::new(SyncQueueProcessor::new(
            self.store.pending_queue(),
            self.server.clone(),
            self.connectivity.clone(),
            self.events.clone(),
        ))
    }

    async fn save(&self, chapter_id: &str) {
        self.store
            .save_progress(&ProgressDraft::new("u1", "rust-101", chapter_id).with("done", true))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_empty_queue_makes_no_calls() {
    let h = harness(true).await;
    let processor = h.processor();

    assert_eq!(processor.drain().await.unwrap(), DrainOutcome::Idle);
    assert_eq!(h.server.calls(), 0);
}

#[tokio::test]
async fn test_failed_item_stays_until_later_drain() {
    let h = harness(true).await;
    let processor = h.processor();

    h.save("intro").await;
    h.save("borrowing").await;
    h.save("lifetimes").await;
    h.server.refuse("borrowing");

    let DrainOutcome::Completed(first) = processor.drain().await.unwrap() else {
        panic!("expected an in-process drain");
    };
    assert_eq!(first.synced.len(), 2);
    assert_eq!(first.failed.len(), 1);
    assert_eq!(h.server.accepted(), vec!["intro", "lifetimes"]);

    let remaining = h.store.pending_items().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, first.failed[0].item_id);
    assert_eq!(remaining[0].data["chapterId"], "borrowing");

    h.server.accept_all();
    let DrainOutcome::Completed(second) = processor.drain().await.unwrap() else {
        panic!("expected an in-process drain");
    };
    assert_eq!(second.synced, vec![remaining[0].id]);
    assert!(second.failed.is_empty());
    assert_eq!(h.server.calls(), 4);
    assert_eq!(h.store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_drain_emits_item_events_in_order() {
    let h = harness(true).await;
    let processor = h.processor();
    let mut receiver = h.events.subscribe();

    h.save("intro").await;
    h.server.refuse("intro");
    processor.drain().await.unwrap();

    assert!(matches!(
        receiver.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::DrainStarted { pending: 1 })
    ));
    assert!(matches!(
        receiver.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::ItemFailed { .. })
    ));
    assert!(matches!(
        receiver.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::DrainCompleted { synced: 0, failed: 1 })
    ));
}

#[tokio::test]
async fn test_background_executor_defers_and_drains() {
    let h = harness(true).await;
    let processor = Arc::new(
        SyncQueueProcessor::new(
            h.store.pending_queue(),
            h.server.clone(),
            h.connectivity.clone(),
            h.events.clone(),
        )
        .with_background_executor(Arc::new(TokioBackgroundExecutor::new()), SYNC_TASK_TAG),
    );
    let mut receiver = h.events.subscribe();

    h.save("intro").await;

    match processor.drain().await.unwrap() {
        DrainOutcome::Deferred(task_id) => assert_eq!(task_id.as_str(), SYNC_TASK_TAG),
        other => panic!("expected deferral, got {other:?}"),
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let CoreEvent::Sync(SyncEvent::DrainCompleted { synced, .. }) =
                receiver.recv().await.unwrap()
            {
                return synced;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(h.store.pending_count().await.unwrap(), 0);
    assert_eq!(h.server.accepted(), vec!["intro"]);
}

#[tokio::test]
async fn test_reconnect_triggers_drain() {
    let h = harness(false).await;
    let processor = h.processor();
    h.connectivity.set_sync_trigger(processor.trigger());
    let mut receiver = h.events.subscribe();

    h.save("intro").await;
    assert_eq!(processor.drain().await.unwrap(), DrainOutcome::Offline);

    assert!(h.connectivity.handle_signal(true));

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let CoreEvent::Sync(SyncEvent::DrainCompleted { .. }) =
                receiver.recv().await.unwrap()
            {
                break;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(h.store.pending_count().await.unwrap(), 0);
}

/// Server that holds its first submission until released.
struct HeldServer {
    hold_first: AtomicBool,
    entered: Notify,
    release: Notify,
    accepted: Mutex<Vec<String>>,
}

impl HeldServer {
    fn new() -> Self {
        Self {
            hold_first: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
            accepted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProgressApi for HeldServer {
    async fn submit_progress(&self, record: &ProgressRecord) -> core_sync::Result<()> {
        if self.hold_first.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.accepted.lock().push(record.chapter_id.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_save_during_drain_is_picked_up_before_it_ends() {
    let h = harness(true).await;
    let server = Arc::new(HeldServer::new());
    let processor = Arc::new(SyncQueueProcessor::new(
        h.store.pending_queue(),
        server.clone(),
        h.connectivity.clone(),
        h.events.clone(),
    ));

    h.save("intro").await;
    let running = tokio::spawn({
        let processor = processor.clone();
        async move { processor.drain().await }
    });
    server.entered.notified().await;

    h.save("borrowing").await;
    assert_eq!(processor.drain().await.unwrap(), DrainOutcome::AlreadyRunning);

    server.release.notify_one();
    let outcome = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let DrainOutcome::Completed(report) = outcome else {
        panic!("expected an in-process drain, got {outcome:?}");
    };
    assert_eq!(report.synced.len(), 2);
    assert!(report.failed.is_empty());
    assert_eq!(*server.accepted.lock(), vec!["intro", "borrowing"]);
    assert_eq!(h.store.pending_count().await.unwrap(), 0);
    assert!(!processor.is_draining());
}
