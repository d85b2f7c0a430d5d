//! # Connectivity Monitor
//!
//! Single source of truth for the engine's online/offline flag.
//!
//! Platform signals are noisy: browsers and operating systems repeat the same
//! status, and several sources (request failures, OS callbacks, polling) may
//! report at once. The monitor collapses those into genuine transitions:
//!
//! - subscribers observe each transition exactly once, in order, as long as
//!   they keep within `SUBSCRIPTION_BUFFER` transitions of the monitor; a
//!   subscriber that falls further behind skips ahead to the current state;
//! - a new subscriber first observes the state current at subscribe time;
//! - every transition is published on the [`EventBus`] as
//!   [`CoreEvent::Connectivity`];
//! - a transition *into* online fires the installed [`SyncTrigger`].
//!
//! ```ignore
//! let monitor = ConnectivityMonitor::new(true, event_bus);
//! let mut subscription = monitor.subscribe();
//! assert_eq!(subscription.next().await, Some(false)); // current state: online
//!
//! monitor.handle_signal(false);
//! monitor.handle_signal(false); // no-op
//! assert_eq!(subscription.next().await, Some(true));
//! ```

use crate::error::Result;
use crate::events::{ConnectivityEvent, CoreEvent, EventBus};
use async_trait::async_trait;
use bridge_traits::NetworkMonitor;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SUBSCRIPTION_BUFFER: usize = 32;

/// Work started when connectivity is regained.
///
/// Implemented by the sync queue processor; installed after construction so
/// the monitor does not depend on it.
#[async_trait]
pub trait SyncTrigger: Send + Sync {
    async fn request_sync(&self);
}

/// Tracks the binary offline flag and fans out transitions.
pub struct ConnectivityMonitor {
    offline: Arc<Mutex<bool>>,
    sender: broadcast::Sender<bool>,
    event_bus: EventBus,
    sync_trigger: RwLock<Option<Arc<dyn SyncTrigger>>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with a known initial state.
    pub fn new(initially_online: bool, event_bus: EventBus) -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIPTION_BUFFER);
        Self {
            offline: Arc::new(Mutex::new(!initially_online)),
            sender,
            event_bus,
            sync_trigger: RwLock::new(None),
        }
    }

    /// Creates a monitor seeded from the platform's current signal.
    ///
    /// A monitor that cannot answer is treated as online; the first failed
    /// request will say otherwise.
    pub async fn from_platform(platform: &dyn NetworkMonitor, event_bus: EventBus) -> Self {
        let online = match platform.get_network_info().await {
            Ok(info) => info.is_online(),
            Err(err) => {
                warn!(error = %err, "Network monitor unavailable; assuming online");
                true
            }
        };
        debug!(online, "Captured initial connectivity");
        Self::new(online, event_bus)
    }

    /// Installs the hook fired on every offline to online transition.
    pub fn set_sync_trigger(&self, trigger: Arc<dyn SyncTrigger>) {
        *self.sync_trigger.write() = Some(trigger);
    }

    pub fn is_offline(&self) -> bool {
        *self.offline.lock()
    }

    pub fn is_online(&self) -> bool {
        !self.is_offline()
    }

    /// Subscribes to offline-flag transitions.
    ///
    /// Dropping the returned subscription unsubscribes.
    pub fn subscribe(&self) -> ConnectivitySubscription {
        // Holding the state lock while creating the receiver means no
        // transition can slip between the snapshot and the first broadcast.
        let offline = self.offline.lock();
        ConnectivitySubscription {
            initial: Some(*offline),
            last: None,
            state: Arc::clone(&self.offline),
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Feeds a raw platform signal into the state machine.
    ///
    /// Returns `true` if the signal caused a transition.
    pub fn handle_signal(&self, online: bool) -> bool {
        let new_offline = !online;
        {
            let mut offline = self.offline.lock();
            if *offline == new_offline {
                return false;
            }
            *offline = new_offline;
            let _ = self.sender.send(new_offline);
        }

        info!(online, "Connectivity changed");
        self.event_bus
            .emit(CoreEvent::Connectivity(ConnectivityEvent::from_offline(
                new_offline,
            )))
            .ok();

        if online {
            self.fire_sync_trigger();
        }

        true
    }

    fn fire_sync_trigger(&self) {
        let Some(trigger) = self.sync_trigger.read().clone() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    trigger.request_sync().await;
                });
            }
            Err(_) => warn!("No async runtime available; skipping reconnect sync"),
        }
    }

    /// Pumps a platform change stream into [`handle_signal`](Self::handle_signal).
    ///
    /// The pump stops when the stream closes or the monitor is dropped.
    pub async fn watch_platform(
        self: &Arc<Self>,
        platform: Arc<dyn NetworkMonitor>,
    ) -> Result<JoinHandle<()>> {
        let mut changes = platform.subscribe_changes().await?;
        let monitor: Weak<Self> = Arc::downgrade(self);

        Ok(tokio::spawn(async move {
            while let Some(info) = changes.next().await {
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                monitor.handle_signal(info.is_online());
            }
            debug!("Platform connectivity stream ended");
        }))
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("offline", &self.is_offline())
            .field("subscribers", &self.subscriber_count())
            .field("has_sync_trigger", &self.sync_trigger.read().is_some())
            .finish()
    }
}

/// Receiver side of [`ConnectivityMonitor::subscribe`].
pub struct ConnectivitySubscription {
    initial: Option<bool>,
    last: Option<bool>,
    state: Arc<Mutex<bool>>,
    receiver: broadcast::Receiver<bool>,
}

impl ConnectivitySubscription {
    /// Next offline flag: first the state at subscribe time, then each
    /// transition. A lagging subscriber gets the current state instead of
    /// the transitions it missed. Returns `None` once the monitor is gone.
    pub async fn next(&mut self) -> Option<bool> {
        if let Some(initial) = self.initial.take() {
            return Some(self.yielded(initial));
        }

        loop {
            match self.receiver.recv().await {
                Ok(offline) => return Some(self.yielded(offline)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Connectivity subscriber lagged, skipping to current state");
                    if let Some(offline) = self.catch_up() {
                        return Some(offline);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`next`](Self::next).
    pub fn try_next(&mut self) -> Option<bool> {
        if let Some(initial) = self.initial.take() {
            return Some(self.yielded(initial));
        }

        loop {
            match self.receiver.try_recv() {
                Ok(offline) => return Some(self.yielded(offline)),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    if let Some(offline) = self.catch_up() {
                        return Some(offline);
                    }
                }
                Err(_) => return None,
            }
        }
    }

    fn yielded(&mut self, offline: bool) -> bool {
        self.last = Some(offline);
        offline
    }

    /// Discard the backlog and read the current state. Transitions are sent
    /// under the state lock, so everything received afterwards is newer.
    /// `None` when the state equals the last flag this subscriber saw.
    fn catch_up(&mut self) -> Option<bool> {
        let state = self.state.lock();
        while let Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) = self.receiver.try_recv() {}
        let offline = *state;
        drop(state);

        (self.last != Some(offline)).then(|| self.yielded(offline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{NetworkChangeStream, NetworkInfo, NetworkType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct CountingTrigger {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SyncTrigger for CountingTrigger {
        async fn request_sync(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_new_subscriber_sees_current_state() {
        let monitor = ConnectivityMonitor::new(false, EventBus::default());
        let mut subscription = monitor.subscribe();

        assert!(monitor.is_offline());
        assert_eq!(subscription.next().await, Some(true));
    }

    #[tokio::test]
    async fn test_repeated_signal_notifies_once() {
        let monitor = ConnectivityMonitor::new(false, EventBus::default());
        let mut subscription = monitor.subscribe();
        assert_eq!(subscription.try_next(), Some(true));

        assert!(monitor.handle_signal(true));
        assert!(!monitor.handle_signal(true));

        assert_eq!(subscription.try_next(), Some(false));
        assert_eq!(subscription.try_next(), None);
    }

    #[tokio::test]
    async fn test_transitions_arrive_in_order() {
        let monitor = ConnectivityMonitor::new(true, EventBus::default());
        let mut subscription = monitor.subscribe();

        monitor.handle_signal(false);
        monitor.handle_signal(true);
        monitor.handle_signal(false);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(subscription.next().await.unwrap());
        }
        assert_eq!(seen, vec![false, true, false, true]);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_to_current_state() {
        let monitor = ConnectivityMonitor::new(true, EventBus::default());
        let mut subscription = monitor.subscribe();
        assert_eq!(subscription.next().await, Some(false));

        for _ in 0..SUBSCRIPTION_BUFFER + 5 {
            monitor.handle_signal(false);
            monitor.handle_signal(true);
        }
        monitor.handle_signal(false);

        assert_eq!(subscription.next().await, Some(true));
        assert_eq!(subscription.try_next(), None);

        monitor.handle_signal(true);
        assert_eq!(subscription.next().await, Some(false));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_already_current_waits_for_next() {
        let monitor = ConnectivityMonitor::new(true, EventBus::default());
        let mut subscription = monitor.subscribe();
        assert_eq!(subscription.try_next(), Some(false));

        for _ in 0..SUBSCRIPTION_BUFFER + 5 {
            monitor.handle_signal(false);
            monitor.handle_signal(true);
        }

        assert_eq!(subscription.try_next(), None);
        monitor.handle_signal(false);
        assert_eq!(subscription.try_next(), Some(true));
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let monitor = ConnectivityMonitor::new(true, EventBus::default());
        let subscription = monitor.subscribe();
        assert_eq!(monitor.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(monitor.subscriber_count(), 0);
        assert!(monitor.handle_signal(false));
    }

    #[tokio::test]
    async fn test_transition_published_on_event_bus() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let monitor = ConnectivityMonitor::new(true, bus);

        monitor.handle_signal(true);
        monitor.handle_signal(false);

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Connectivity(ConnectivityEvent::WentOffline)
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sync_trigger_fires_only_on_reconnect() {
        let monitor = ConnectivityMonitor::new(true, EventBus::default());
        let trigger = Arc::new(CountingTrigger::default());
        monitor.set_sync_trigger(trigger.clone());

        monitor.handle_signal(false);
        monitor.handle_signal(true);
        monitor.handle_signal(true);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
    }

    struct ChannelMonitor {
        changes: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<NetworkInfo>>>,
        initial: NetworkInfo,
    }

    struct ChannelStream(mpsc::UnboundedReceiver<NetworkInfo>);

    #[async_trait]
    impl NetworkChangeStream for ChannelStream {
        async fn next(&mut self) -> Option<NetworkInfo> {
            self.0.recv().await
        }
    }

    #[async_trait]
    impl NetworkMonitor for ChannelMonitor {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
            Ok(self.initial)
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
            let receiver = self.changes.lock().take().ok_or_else(|| {
                bridge_traits::BridgeError::NotAvailable("already subscribed".to_string())
            })?;
            Ok(Box::new(ChannelStream(receiver)))
        }
    }

    #[tokio::test]
    async fn test_watch_platform_collapses_duplicates() {
        let (tx, rx) = mpsc::unbounded_channel();
        let platform = Arc::new(ChannelMonitor {
            changes: parking_lot::Mutex::new(Some(rx)),
            initial: NetworkInfo::disconnected(),
        });

        let monitor =
            Arc::new(ConnectivityMonitor::from_platform(platform.as_ref(), EventBus::default()).await);
        assert!(monitor.is_offline());

        let mut subscription = monitor.subscribe();
        assert_eq!(subscription.next().await, Some(true));

        let pump = monitor.watch_platform(platform.clone()).await.unwrap();

        tx.send(NetworkInfo::connected(NetworkType::WiFi)).unwrap();
        tx.send(NetworkInfo::connected(NetworkType::Ethernet)).unwrap();
        tx.send(NetworkInfo::disconnected()).unwrap();
        drop(tx);

        pump.await.unwrap();

        assert_eq!(subscription.next().await, Some(false));
        assert_eq!(subscription.next().await, Some(true));
        assert_eq!(subscription.try_next(), None);
    }
}
