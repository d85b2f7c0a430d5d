//! `BackgroundExecutor` on the tokio runtime.

use async_trait::async_trait;
use bridge_traits::{
    background::{BackgroundExecutor, TaskConstraints, TaskHandler, TaskId, TaskStatus},
    error::{BridgeError, Result},
    network::NetworkMonitor,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DEFAULT_RECHECK: Duration = Duration::from_secs(5);

#[derive(Default)]
struct TagState {
    handler: Option<TaskHandler>,
    status: Option<TaskStatus>,
    run: Option<JoinHandle<()>>,
}

type Tags = Arc<Mutex<HashMap<String, TagState>>>;

/// Desktop stand-in for the platform background sync facility.
///
/// A scheduled tag sleeps for its delay, then waits until the network
/// monitor reports online (when the constraints ask for it), then runs its
/// handler. Without a monitor, network constraints count as met.
pub struct TokioBackgroundExecutor {
    tags: Tags,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    recheck_interval: Duration,
}

impl TokioBackgroundExecutor {
    pub fn new() -> Self {
        Self::with_network_monitor(None)
    }

    pub fn with_network_monitor(monitor: Option<Arc<dyn NetworkMonitor>>) -> Self {
        Self {
            tags: Arc::new(Mutex::new(HashMap::new())),
            network_monitor: monitor,
            recheck_interval: DEFAULT_RECHECK,
        }
    }

    /// How often an unmet network constraint is re-checked.
    pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = interval;
        self
    }

    async fn set_status(tags: &Tags, tag: &str, status: TaskStatus) {
        if let Some(state) = tags.lock().await.get_mut(tag) {
            state.status = Some(status);
            if status != TaskStatus::Pending && status != TaskStatus::Running {
                state.run = None;
            }
        }
    }

    async fn network_ready(monitor: Option<&Arc<dyn NetworkMonitor>>) -> bool {
        let Some(monitor) = monitor else {
            return true;
        };
        match monitor.get_network_info().await {
            Ok(info) => info.is_online(),
            Err(e) => {
                warn!(error = %e, "Network monitor failed; holding task");
                false
            }
        }
    }

    async fn run(
        tags: Tags,
        tag: String,
        handler: TaskHandler,
        delay: Duration,
        constraints: TaskConstraints,
        monitor: Option<Arc<dyn NetworkMonitor>>,
        recheck: Duration,
    ) {
        tokio::time::sleep(delay).await;

        if constraints.requires_network {
            while !Self::network_ready(monitor.as_ref()).await {
                debug!(tag = %tag, "Waiting for network");
                tokio::time::sleep(recheck).await;
            }
        }

        Self::set_status(&tags, &tag, TaskStatus::Running).await;
        let status = match handler().await {
            Ok(()) => TaskStatus::Succeeded,
            Err(e) => {
                warn!(tag = %tag, error = %e, "Background task failed");
                TaskStatus::Failed
            }
        };
        Self::set_status(&tags, &tag, status).await;
    }
}

impl Default for TokioBackgroundExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundExecutor for TokioBackgroundExecutor {
    async fn register_handler(&self, tag: &str, handler: TaskHandler) -> Result<()> {
        self.tags
            .lock()
            .await
            .entry(tag.to_string())
            .or_default()
            .handler = Some(handler);
        Ok(())
    }

    async fn schedule_once(
        &self,
        tag: &str,
        delay: Duration,
        constraints: TaskConstraints,
    ) -> Result<TaskId> {
        let mut tags = self.tags.lock().await;
        let state = tags
            .get_mut(tag)
            .filter(|state| state.handler.is_some())
            .ok_or_else(|| BridgeError::NotAvailable(format!("No handler registered for '{}'", tag)))?;

        if state.status == Some(TaskStatus::Pending) {
            debug!(tag, "Task already pending");
            return Ok(TaskId::new(tag));
        }

        let Some(handler) = state.handler.clone() else {
            return Err(BridgeError::NotAvailable(format!("No handler registered for '{}'", tag)));
        };
        debug!(tag, delay_ms = delay.as_millis() as u64, "Scheduling one-shot task");

        state.status = Some(TaskStatus::Pending);
        state.run = Some(tokio::spawn(Self::run(
            Arc::clone(&self.tags),
            tag.to_string(),
            handler,
            delay,
            constraints,
            self.network_monitor.clone(),
            self.recheck_interval,
        )));

        Ok(TaskId::new(tag))
    }

    async fn cancel(&self, task_id: &TaskId) -> Result<bool> {
        let mut tags = self.tags.lock().await;
        let Some(state) = tags.get_mut(task_id.as_str()) else {
            return Ok(false);
        };
        if state.status != Some(TaskStatus::Pending) {
            return Ok(false);
        }

        if let Some(run) = state.run.take() {
            run.abort();
        }
        state.status = None;
        debug!(tag = %task_id, "Pending task cancelled");
        Ok(true)
    }

    async fn status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.tags
            .lock()
            .await
            .get(task_id.as_str())
            .and_then(|state| state.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ManualNetworkMonitor;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> TaskHandler {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    #[tokio::test]
    async fn test_scheduled_task_runs_once() {
        let executor = TokioBackgroundExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        executor.register_handler("sync", counting(&counter)).await.unwrap();

        let id = executor
            .schedule_once("sync", Duration::from_millis(20), TaskConstraints::default())
            .await
            .unwrap();
        assert_eq!(executor.status(&id).await, Some(TaskStatus::Pending));

        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(executor.status(&id).await, Some(TaskStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_unregistered_tag_is_refused() {
        let executor = TokioBackgroundExecutor::new();
        let result = executor
            .schedule_once("missing", Duration::ZERO, TaskConstraints::none())
            .await;

        assert!(matches!(result, Err(BridgeError::NotAvailable(_))));
        assert_eq!(executor.status(&TaskId::new("missing")).await, None);
    }

    #[tokio::test]
    async fn test_pending_tag_is_not_queued_twice() {
        let executor = TokioBackgroundExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        executor.register_handler("sync", counting(&counter)).await.unwrap();

        for _ in 0..3 {
            executor
                .schedule_once("sync", Duration::from_millis(40), TaskConstraints::none())
                .await
                .unwrap();
        }
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        executor
            .schedule_once("sync", Duration::ZERO, TaskConstraints::none())
            .await
            .unwrap();
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_pending_task() {
        let executor = TokioBackgroundExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        executor.register_handler("sync", counting(&counter)).await.unwrap();

        let id = executor
            .schedule_once("sync", Duration::from_secs(5), TaskConstraints::none())
            .await
            .unwrap();

        assert!(executor.cancel(&id).await.unwrap());
        assert!(!executor.cancel(&id).await.unwrap());
        assert_eq!(executor.status(&id).await, None);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_waits_for_network() {
        let monitor = Arc::new(ManualNetworkMonitor::new(false));
        let executor = TokioBackgroundExecutor::with_network_monitor(Some(monitor.clone() as Arc<dyn NetworkMonitor>))
            .with_recheck_interval(Duration::from_millis(20));
        let counter = Arc::new(AtomicUsize::new(0));
        executor.register_handler("sync", counting(&counter)).await.unwrap();

        executor
            .schedule_once("sync", Duration::ZERO, TaskConstraints::default())
            .await
            .unwrap();
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        monitor.set_online(true);
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_handler_is_reported() {
        let executor = TokioBackgroundExecutor::new();
        let handler: TaskHandler = Arc::new(|| {
            async { Err(BridgeError::Network("unreachable".to_string())) }.boxed()
        });
        executor.register_handler("sync", handler).await.unwrap();

        let id = executor
            .schedule_once("sync", Duration::ZERO, TaskConstraints::none())
            .await
            .unwrap();
        settle().await;

        assert_eq!(executor.status(&id).await, Some(TaskStatus::Failed));
    }
}
