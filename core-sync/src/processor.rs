//! # Sync Queue Processor
//!
//! Walks the pending-sync queue and delivers each item to the server.
//!
//! ## Drain
//!
//! 1. A drain already in flight makes the new one return
//!    [`DrainOutcome::AlreadyRunning`] and leaves a rerun request. The
//!    running drain lists the queue again before it finishes, so items saved
//!    while it was sending are not left behind.
//! 2. An empty queue is [`DrainOutcome::Idle`]; no network call is made.
//! 3. While offline the drain is [`DrainOutcome::Offline`].
//! 4. With a background executor the work is handed to the tagged one-shot
//!    task and the drain is [`DrainOutcome::Deferred`]. The task later runs
//!    step 5.
//! 5. Otherwise every item is sent in queue order. An acknowledged item is
//!    deleted; a failed item stays queued and the loop continues.
//!
//! There is no backoff: failed items wait for the next trigger (reconnect,
//! a new save, or an explicit sync).

use crate::error::{Result, SyncError};
use crate::remote::ProgressApi;
use async_trait::async_trait;
use bridge_traits::background::{BackgroundExecutor, TaskConstraints, TaskHandler, TaskId};
use bridge_traits::error::BridgeError;
use core_runtime::connectivity::{ConnectivityMonitor, SyncTrigger};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_store::{PendingKind, PendingSyncItem, PendingSyncRepository, ProgressRecord};
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default tag of the background task that drains the queue.
pub const SYNC_TASK_TAG: &str = "sync-learning-progress";

/// Items the server refused or never received during one drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item_id: i64,
    pub message: String,
}

/// What an in-process drain did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Ids removed from the queue, in the order they were sent
    pub synced: Vec<i64>,
    /// Items kept for the next drain
    pub failed: Vec<ItemFailure>,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.synced.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of [`SyncQueueProcessor::drain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    AlreadyRunning,
    Idle,
    Offline,
    Deferred(TaskId),
    Completed(DrainReport),
}

impl DrainOutcome {
    /// Fold the outcome of a rerun pass into this one.
    fn then(self, next: DrainOutcome) -> DrainOutcome {
        match (self, next) {
            (DrainOutcome::Completed(mut report), DrainOutcome::Completed(more)) => {
                report.synced.extend(more.synced);
                report.failed.extend(more.failed);
                DrainOutcome::Completed(report)
            }
            (DrainOutcome::Completed(report), DrainOutcome::Offline) => {
                DrainOutcome::Completed(report)
            }
            (previous, DrainOutcome::Idle | DrainOutcome::AlreadyRunning) => previous,
            (_, next) => next,
        }
    }
}

/// Clears the in-flight flag when a drain ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| DrainGuard(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncQueueProcessor {
    queue: Arc<dyn PendingSyncRepository>,
    api: Arc<dyn ProgressApi>,
    connectivity: Arc<ConnectivityMonitor>,
    event_bus: EventBus,
    executor: Option<Arc<dyn BackgroundExecutor>>,
    task_tag: String,
    in_flight: AtomicBool,
    rerun: AtomicBool,
    handler_registered: AtomicBool,
}

impl SyncQueueProcessor {
    pub fn new(
        queue: Arc<dyn PendingSyncRepository>,
        api: Arc<dyn ProgressApi>,
        connectivity: Arc<ConnectivityMonitor>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            queue,
            api,
            connectivity,
            event_bus,
            executor: None,
            task_tag: SYNC_TASK_TAG.to_string(),
            in_flight: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            handler_registered: AtomicBool::new(false),
        }
    }

    /// Hand drains to a platform scheduler instead of running them inline.
    pub fn with_background_executor(
        mut self,
        executor: Arc<dyn BackgroundExecutor>,
        task_tag: impl Into<String>,
    ) -> Self {
        self.executor = Some(executor);
        self.task_tag = task_tag.into();
        self
    }

    pub fn task_tag(&self) -> &str {
        &self.task_tag
    }

    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Trigger to install on the connectivity monitor. Holds the processor
    /// weakly.
    pub fn trigger(self: &Arc<Self>) -> Arc<dyn SyncTrigger> {
        Arc::new(ProcessorTrigger {
            processor: Arc::downgrade(self),
        })
    }

    /// Take the in-flight flag, or leave a rerun request for its holder.
    ///
    /// The request is stored before the flag is checked again, and the
    /// holder releases the flag before it checks for requests, so one of the
    /// two always sees the other.
    fn begin(&self) -> Option<DrainGuard<'_>> {
        loop {
            if let Some(guard) = DrainGuard::acquire(&self.in_flight) {
                return Some(guard);
            }
            self.rerun.store(true, Ordering::SeqCst);
            if self.in_flight.load(Ordering::SeqCst) {
                debug!("Drain already in flight, rerun requested");
                return None;
            }
        }
    }

    fn take_rerun(&self) -> bool {
        self.rerun.swap(false, Ordering::SeqCst)
    }

    /// Run one drain, see the module documentation for the steps. Passes
    /// repeat while rerun requests arrived during the previous one.
    ///
    /// # Errors
    ///
    /// Only when the queue itself cannot be read. Per-item failures are
    /// reported in the [`DrainReport`].
    #[instrument(skip(self))]
    pub async fn drain(self: &Arc<Self>) -> Result<DrainOutcome> {
        let mut outcome = self.drain_pass().await?;
        if outcome == DrainOutcome::AlreadyRunning {
            return Ok(outcome);
        }
        while self.take_rerun() {
            debug!("Items queued during the drain, listing again");
            let next = self.drain_pass().await?;
            let taken_over = next == DrainOutcome::AlreadyRunning;
            outcome = outcome.then(next);
            if taken_over {
                break;
            }
        }
        Ok(outcome)
    }

    async fn drain_pass(self: &Arc<Self>) -> Result<DrainOutcome> {
        let Some(guard) = self.begin() else {
            return Ok(DrainOutcome::AlreadyRunning);
        };

        let items = self.queue.list().await?;
        if items.is_empty() {
            return Ok(DrainOutcome::Idle);
        }

        if self.connectivity.is_offline() {
            debug!(pending = items.len(), "Offline, leaving queue for later");
            return Ok(DrainOutcome::Offline);
        }

        if let Some(executor) = &self.executor {
            // The scheduled task takes the flag itself.
            drop(guard);
            match self.defer(executor).await {
                Ok(task_id) => {
                    info!(task = %task_id.as_str(), pending = items.len(), "Drain deferred to background task");
                    let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::DrainDeferred {
                        task_id: task_id.as_str().to_string(),
                    }));
                    return Ok(DrainOutcome::Deferred(task_id));
                }
                Err(e) => {
                    warn!(error = %e, "Background registration failed, draining in process");
                    return self.in_process_pass().await;
                }
            }
        }

        let report = self.process(items).await;
        drop(guard);
        Ok(DrainOutcome::Completed(report))
    }

    /// In-process drain, bypassing connectivity and the executor. This is
    /// what the background task runs.
    pub async fn drain_in_process(&self) -> Result<DrainOutcome> {
        let mut outcome = self.in_process_pass().await?;
        if outcome == DrainOutcome::AlreadyRunning {
            return Ok(outcome);
        }
        while self.take_rerun() {
            let next = self.in_process_pass().await?;
            let taken_over = next == DrainOutcome::AlreadyRunning;
            outcome = outcome.then(next);
            if taken_over {
                break;
            }
        }
        Ok(outcome)
    }

    async fn in_process_pass(&self) -> Result<DrainOutcome> {
        let Some(_guard) = self.begin() else {
            return Ok(DrainOutcome::AlreadyRunning);
        };

        let items = self.queue.list().await?;
        if items.is_empty() {
            return Ok(DrainOutcome::Idle);
        }

        Ok(DrainOutcome::Completed(self.process(items).await))
    }

    async fn defer(self: &Arc<Self>, executor: &Arc<dyn BackgroundExecutor>) -> Result<TaskId> {
        if !self.handler_registered.load(Ordering::Acquire) {
            executor
                .register_handler(&self.task_tag, self.background_handler())
                .await?;
            self.handler_registered.store(true, Ordering::Release);
        }

        executor
            .schedule_once(&self.task_tag, Duration::ZERO, TaskConstraints::default())
            .await
            .map_err(|e| SyncError::Scheduling(e.to_string()))
    }

    fn background_handler(self: &Arc<Self>) -> TaskHandler {
        let processor = Arc::downgrade(self);

        Arc::new(move || {
            let processor = processor.clone();
            async move {
                let Some(processor) = processor.upgrade() else {
                    return Ok(());
                };

                match processor.drain_in_process().await {
                    Ok(DrainOutcome::Completed(report)) if !report.is_clean() => {
                        Err(BridgeError::OperationFailed(format!(
                            "{} pending items could not be synced",
                            report.failed.len()
                        )))
                    }
                    Ok(_) => Ok(()),
                    Err(e) => Err(BridgeError::OperationFailed(e.to_string())),
                }
            }
            .boxed()
        })
    }

    async fn process(&self, items: Vec<PendingSyncItem>) -> DrainReport {
        info!(pending = items.len(), "Draining sync queue");
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::DrainStarted {
            pending: items.len() as u64,
        }));

        let mut report = DrainReport::default();

        for item in items {
            let item_id = item.id;

            match self.deliver(item).await {
                Ok(()) => {
                    debug!(item_id, "Pending item synced");
                    report.synced.push(item_id);
                    let _ = self
                        .event_bus
                        .emit(CoreEvent::Sync(SyncEvent::ItemSynced { item_id }));
                }
                Err(e) => {
                    warn!(item_id, error = %e, "Pending item kept for retry");
                    let message = e.to_string();
                    let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::ItemFailed {
                        item_id,
                        message: message.clone(),
                    }));
                    report.failed.push(ItemFailure { item_id, message });
                }
            }
        }

        info!(
            synced = report.synced.len(),
            failed = report.failed.len(),
            "Sync queue drained"
        );
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::DrainCompleted {
            synced: report.synced.len() as u64,
            failed: report.failed.len() as u64,
        }));

        report
    }

    /// Send one item and delete it once acknowledged.
    async fn deliver(&self, item: PendingSyncItem) -> Result<()> {
        match item.kind {
            PendingKind::Progress => {
                let record: ProgressRecord =
                    serde_json::from_value(item.data).map_err(|e| SyncError::MalformedItem {
                        item_id: item.id,
                        message: e.to_string(),
                    })?;
                self.api.submit_progress(&record).await?;
            }
        }

        if !self.queue.delete(item.id).await? {
            debug!(item_id = item.id, "Item already removed from queue");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SyncQueueProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueueProcessor")
            .field("task_tag", &self.task_tag)
            .field("background", &self.executor.is_some())
            .field("in_flight", &self.is_draining())
            .finish()
    }
}

struct ProcessorTrigger {
    processor: Weak<SyncQueueProcessor>,
}

#[async_trait]
impl SyncTrigger for ProcessorTrigger {
    async fn request_sync(&self) {
        let Some(processor) = self.processor.upgrade() else {
            return;
        };

        match processor.drain().await {
            Ok(outcome) => debug!(?outcome, "Reconnect drain finished"),
            Err(e) => warn!(error = %e, "Reconnect drain failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_store::{LocalStore, ProgressDraft};
    use mockall::mock;

    mock! {
        Api {}

        #[async_trait]
        impl ProgressApi for Api {
            async fn submit_progress(&self, record: &ProgressRecord) -> Result<()>;
        }
    }

    async fn processor(api: MockApi, online: bool) -> (Arc<SyncQueueProcessor>, LocalStore) {
        let store = LocalStore::in_memory().await.unwrap();
        let events = EventBus::new(32);
        let connectivity = Arc::new(ConnectivityMonitor::new(online, events.clone()));
        let processor = Arc::new(SyncQueueProcessor::new(
            store.pending_queue(),
            Arc::new(api),
            connectivity,
            events,
        ));
        (processor, store)
    }

    #[tokio::test]
    async fn test_offline_drain_makes_no_calls() {
        let mut api = MockApi::new();
        api.expect_submit_progress().never();
        let (processor, store) = processor(api, false).await;

        store
            .save_progress(&ProgressDraft::new("u1", "p1", "c1"))
            .await
            .unwrap();

        assert_eq!(processor.drain().await.unwrap(), DrainOutcome::Offline);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drain_guard_rejects_second_drain() {
        let (processor, _store) = processor(MockApi::new(), true).await;

        let guard = DrainGuard::acquire(&processor.in_flight).unwrap();
        assert!(processor.is_draining());
        assert_eq!(processor.drain().await.unwrap(), DrainOutcome::AlreadyRunning);
        assert_eq!(processor.drain_in_process().await.unwrap(), DrainOutcome::AlreadyRunning);
        assert!(processor.rerun.load(Ordering::SeqCst));

        drop(guard);
        assert!(!processor.is_draining());
        assert_eq!(processor.drain().await.unwrap(), DrainOutcome::Idle);
        assert!(!processor.rerun.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_malformed_item_is_kept() {
        let mut api = MockApi::new();
        api.expect_submit_progress().never();
        let (processor, store) = processor(api, true).await;

        store
            .pending_queue()
            .enqueue(PendingKind::Progress, &serde_json::json!({"unexpected": true}))
            .await
            .unwrap();

        let DrainOutcome::Completed(report) = processor.drain().await.unwrap() else {
            panic!("expected an in-process drain");
        };
        assert_eq!(report.failed.len(), 1);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[test]
    fn test_rerun_outcomes_merge() {
        let first = DrainOutcome::Completed(DrainReport {
            synced: vec![1],
            failed: vec![],
        });
        let second = DrainOutcome::Completed(DrainReport {
            synced: vec![2],
            failed: vec![ItemFailure {
                item_id: 3,
                message: "HTTP 500".to_string(),
            }],
        });

        let DrainOutcome::Completed(report) = first.clone().then(second) else {
            panic!("expected a merged report");
        };
        assert_eq!(report.synced, vec![1, 2]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(first.clone().then(DrainOutcome::Idle), first);
        assert_eq!(DrainOutcome::Idle.then(DrainOutcome::Offline), DrainOutcome::Offline);

        let deferred = DrainOutcome::Deferred(TaskId::new(SYNC_TASK_TAG));
        assert_eq!(deferred.clone().then(DrainOutcome::AlreadyRunning), deferred);
    }

    #[tokio::test]
    async fn test_trigger_does_not_keep_processor_alive() {
        let (processor, _store) = processor(MockApi::new(), true).await;
        let trigger = processor.trigger();

        drop(processor);
        trigger.request_sync().await;
    }
}
