//! Connectivity signals from the host.
//!
//! A monitor reports what the platform sees, repeats included. Collapsing
//! repeats into transitions and fanning them out happens in
//! `core_runtime::connectivity`.

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Cellular,
    WiFi,
    Ethernet,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Connected,
    Disconnected,
    /// The platform cannot tell (captive portal, no permission, ...)
    Indeterminate,
}

/// One connectivity reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
}

impl NetworkInfo {
    pub fn connected(network_type: NetworkType) -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: Some(network_type),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
        }
    }

    /// Collapses the reading to the engine's single online flag. Only an
    /// explicit disconnect counts as offline; when in doubt requests are
    /// attempted and the fetch itself decides.
    pub fn is_online(&self) -> bool {
        self.status != NetworkStatus::Disconnected
    }
}

/// Source of connectivity readings.
///
/// The desktop bridge probes a socket; browsers expose `navigator.onLine`
/// with `online`/`offline` events; mobile hosts forward their OS callbacks.
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn starts_offline(monitor: &dyn NetworkMonitor) -> bool {
///     !monitor.get_network_info().await.map(|info| info.is_online()).unwrap_or(true)
/// }
/// ```
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Current reading.
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Stream of subsequent readings, repeats included.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

#[async_trait::async_trait]
pub trait NetworkChangeStream: Send {
    /// `None` once the platform stops reporting.
    async fn next(&mut self) -> Option<NetworkInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_reading_is_online() {
        let info = NetworkInfo::connected(NetworkType::WiFi);

        assert_eq!(info.network_type, Some(NetworkType::WiFi));
        assert!(info.is_online());
        assert!(!NetworkInfo::disconnected().is_online());
    }

    #[test]
    fn test_indeterminate_counts_as_online() {
        let unknown = NetworkInfo {
            status: NetworkStatus::Indeterminate,
            network_type: None,
        };
        assert!(unknown.is_online());
    }
}
