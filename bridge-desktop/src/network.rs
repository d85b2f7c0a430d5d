//! Connectivity sources for desktop hosts.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_PROBE_ADDR: &str = "1.1.1.1:443";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Treats "a TCP connection to `probe_addr` succeeds" as online.
#[derive(Debug, Clone)]
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    poll_interval: Duration,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self::with_probe(DEFAULT_PROBE_ADDR, DEFAULT_POLL_INTERVAL)
    }

    /// Probe `host:port` every `poll_interval` once subscribed.
    pub fn with_probe(probe_addr: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            probe_addr: probe_addr.into(),
            poll_interval,
        }
    }

    async fn probe(&self) -> NetworkStatus {
        let connect = TcpStream::connect(self.probe_addr.as_str());
        match tokio::time::timeout(PROBE_TIMEOUT, connect).await {
            Ok(Ok(_)) => NetworkStatus::Connected,
            _ => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.probe().await;
        debug!(?status, probe = %self.probe_addr, "Probed connectivity");

        Ok(match status {
            NetworkStatus::Connected => NetworkInfo::connected(NetworkType::Other),
            _ => NetworkInfo::disconnected(),
        })
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.clone(),
        }))
    }
}

/// Polls the probe and reports every observation. Collapsing repeats is the
/// consumer's job.
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        tokio::time::sleep(self.monitor.poll_interval).await;
        self.monitor.get_network_info().await.ok()
    }
}

/// Network monitor driven by the host.
///
/// Hosts that already receive OS connectivity callbacks forward them through
/// [`ManualNetworkMonitor::set_online`]. Every call is emitted to subscribers,
/// including repeats of the current state.
pub struct ManualNetworkMonitor {
    online: AtomicBool,
    sender: broadcast::Sender<NetworkInfo>,
}

impl ManualNetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (sender, _) = broadcast::channel(32);
        Self {
            online: AtomicBool::new(initially_online),
            sender,
        }
    }

    /// Record a raw platform signal.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        let _ = self.sender.send(Self::info_for(online));
    }

    fn info_for(online: bool) -> NetworkInfo {
        if online {
            NetworkInfo::connected(NetworkType::Other)
        } else {
            NetworkInfo::disconnected()
        }
    }
}

#[async_trait]
impl NetworkMonitor for ManualNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        Ok(Self::info_for(self.online.load(Ordering::SeqCst)))
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(ManualNetworkChangeStream {
            receiver: self.sender.subscribe(),
        }))
    }
}

struct ManualNetworkChangeStream {
    receiver: broadcast::Receiver<NetworkInfo>,
}

#[async_trait]
impl NetworkChangeStream for ManualNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            match self.receiver.recv().await {
                Ok(info) => return Some(info),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Network change stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
