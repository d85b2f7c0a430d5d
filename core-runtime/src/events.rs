//! # Engine Events
//!
//! Typed notifications published on a `tokio::sync::broadcast` channel. The
//! connectivity monitor, the sync processor and the cache manager publish;
//! hosts and tests subscribe.
//!
//! ```rust
//! use core_runtime::events::{ConnectivityEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut events = bus.subscribe();
//!
//! bus.emit(CoreEvent::Connectivity(ConnectivityEvent::WentOffline)).ok();
//! assert_eq!(
//!     events.recv().await.unwrap(),
//!     CoreEvent::Connectivity(ConnectivityEvent::WentOffline)
//! );
//! # }
//! ```
//!
//! Events never drive control flow. Publishers ignore the error returned
//! when nobody is subscribed, and a subscriber that falls more than the
//! buffer size behind gets `RecvError::Lagged` and keeps going.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError, TryRecvError};
pub use tokio::sync::broadcast::Receiver;

/// Events kept per subscriber before it starts lagging.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Everything published on the [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Online/offline transitions
    Connectivity(ConnectivityEvent),
    /// Pending-queue drain progress
    Sync(SyncEvent),
    /// Cache region maintenance
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Short label for logs and diagnostics.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Connectivity(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    /// How loudly a host should surface the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Connectivity(ConnectivityEvent::WentOffline) => EventSeverity::Warning,
            CoreEvent::Connectivity(ConnectivityEvent::WentOnline) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::ItemFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::DrainCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::DrainCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::RefreshFailed { .. }) => EventSeverity::Warning,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Genuine connectivity transitions. Repeated platform signals are collapsed
/// before anything is published.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConnectivityEvent {
    WentOnline,
    WentOffline,
}

impl ConnectivityEvent {
    /// Builds the event for a new offline flag.
    pub fn from_offline(offline: bool) -> Self {
        if offline {
            ConnectivityEvent::WentOffline
        } else {
            ConnectivityEvent::WentOnline
        }
    }

    fn description(&self) -> &str {
        match self {
            ConnectivityEvent::WentOnline => "Connectivity restored",
            ConnectivityEvent::WentOffline => "Connectivity lost",
        }
    }
}

/// Events related to draining the pending-sync queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// In-process drain started.
    DrainStarted {
        /// Items found in the queue when the drain began.
        pending: u64,
    },
    /// The server acknowledged an item and it was removed from the queue.
    ItemSynced {
        /// Pending item id.
        item_id: i64,
    },
    /// An item could not be delivered and stays queued.
    ItemFailed {
        /// Pending item id.
        item_id: i64,
        /// Human-readable error message.
        message: String,
    },
    /// In-process drain finished.
    DrainCompleted {
        /// Items removed from the queue.
        synced: u64,
        /// Items kept for the next drain.
        failed: u64,
    },
    /// The drain was handed to the platform background executor.
    DrainDeferred {
        /// Tag of the scheduled background task.
        task_id: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::DrainStarted { .. } => "Sync drain started",
            SyncEvent::ItemSynced { .. } => "Pending item synced",
            SyncEvent::ItemFailed { .. } => "Pending item failed",
            SyncEvent::DrainCompleted { .. } => "Sync drain completed",
            SyncEvent::DrainDeferred { .. } => "Sync drain deferred to background task",
        }
    }
}

/// Events related to cache region writes that happen off the request path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// A background revalidation stored a fresh response.
    Refreshed { region: String, key: String },
    /// A background revalidation failed; the cached entry was kept.
    RefreshFailed {
        region: String,
        key: String,
        message: String,
    },
    /// An entry was written explicitly (download for offline, page message).
    Populated { region: String, key: String },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::Refreshed { .. } => "Cache entry refreshed",
            CacheEvent::RefreshFailed { .. } => "Cache refresh failed",
            CacheEvent::Populated { .. } => "Cache entry populated",
        }
    }
}

/// Broadcast hub shared by every engine component. Clones publish into the
/// same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of subscribers reached, or an error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Subscriber with an optional predicate; events that fail it are skipped.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let sync_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn wanted(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |keep| keep(event))
    }

    /// Next matching event.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged` when events were dropped for this subscriber,
    /// `RecvError::Closed` once every publisher is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.wanted(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking [`recv`](Self::recv); `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.wanted(&event) {
                return Some(Ok(event));
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated(key: &str) -> CoreEvent {
        CoreEvent::Cache(CacheEvent::Populated {
            region: "learning-content".to_string(),
            key: key.to_string(),
        })
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_each_event() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);

        let mut first = bus.subscribe();
        let mut second = bus.clone().subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let started = CoreEvent::Sync(SyncEvent::DrainStarted { pending: 2 });
        assert_eq!(bus.emit(started.clone()).unwrap(), 2);
        assert_eq!(first.recv().await.unwrap(), started);
        assert_eq!(second.recv().await.unwrap(), started);
    }

    #[test]
    fn test_emit_without_subscribers_is_an_error() {
        let bus = EventBus::new(4);
        let went_online = CoreEvent::Connectivity(ConnectivityEvent::from_offline(false));

        assert!(bus.emit(went_online).is_err());
    }

    #[tokio::test]
    async fn test_filtered_stream_skips_other_categories() {
        let bus = EventBus::new(8);
        let mut sync_only =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Sync(_)));

        bus.emit(populated("GET https://learn.example.com/paths/p1")).ok();
        let synced = CoreEvent::Sync(SyncEvent::ItemSynced { item_id: 4 });
        bus.emit(synced.clone()).ok();

        assert_eq!(sync_only.recv().await.unwrap(), synced);
        assert!(sync_only.try_recv().is_none());
    }

    #[test]
    fn test_try_recv_reports_lag() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());

        for item_id in 0..5 {
            bus.emit(CoreEvent::Sync(SyncEvent::ItemSynced { item_id })).ok();
        }

        assert!(matches!(stream.try_recv(), Some(Err(RecvError::Lagged(3)))));
        assert_eq!(
            stream.try_recv().unwrap().unwrap(),
            CoreEvent::Sync(SyncEvent::ItemSynced { item_id: 3 })
        );
    }

    #[test]
    fn test_partial_drain_is_a_warning() {
        let partial = CoreEvent::Sync(SyncEvent::DrainCompleted { synced: 2, failed: 1 });
        let clean = CoreEvent::Sync(SyncEvent::DrainCompleted { synced: 3, failed: 0 });

        assert_eq!(partial.severity(), EventSeverity::Warning);
        assert_eq!(clean.severity(), EventSeverity::Info);
        assert_eq!(populated("k").severity(), EventSeverity::Debug);
        assert_eq!(
            CoreEvent::Connectivity(ConnectivityEvent::WentOffline).severity(),
            EventSeverity::Warning
        );
        assert_eq!(clean.description(), "Sync drain completed");
    }

    #[test]
    fn test_wire_shape() {
        let deferred = CoreEvent::Sync(SyncEvent::DrainDeferred {
            task_id: "sync-learning-progress".to_string(),
        });

        let value = serde_json::to_value(&deferred).unwrap();
        assert_eq!(value["type"], "Sync");
        assert_eq!(value["payload"]["event"], "DrainDeferred");
        assert_eq!(value["payload"]["task_id"], "sync-learning-progress");

        let back: CoreEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, deferred);
    }
}
