//! Interfaces the session depends on
//!
//! The session never touches a radio directly. Discovery, the telemetry
//! source and the command sink are supplied by a backend (WinRT on Windows,
//! in-memory mocks in tests).

use crate::domain::models::DiscoveredDevice;
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with the raw payload of every telemetry notification
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Advertisement predicate: target service UUID or a name tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    pub service: u128,
    /// Lower-case substrings matched against the advertised name
    pub name_tags: Vec<String>,
}

impl DeviceFilter {
    pub fn new(service: u128, name_tags: &[&str]) -> Self {
        Self {
            service,
            name_tags: name_tags.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn matches(&self, device: &DiscoveredDevice) -> bool {
        if device.services.contains(&self.service) {
            return true;
        }
        let name = device.name.to_lowercase();
        self.name_tags.iter().any(|tag| name.contains(tag.as_str()))
    }
}

/// BLE device discovery
#[async_trait]
pub trait Discovery: Send + Sync {
    /// First device matching `filter`, or `None` once `timeout` elapses
    async fn find(
        &self,
        filter: &DeviceFilter,
        timeout: Duration,
    ) -> Result<Option<DiscoveredDevice>, TransportError>;

    /// Every distinct device heard within `timeout`
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError>;
}

/// Telemetry-producing peripheral (Mario)
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn connect(&self, device: &DiscoveredDevice) -> Result<(), TransportError>;

    /// Enable notifications and route every payload to `handler`
    async fn subscribe(&self, handler: NotificationHandler) -> Result<(), TransportError>;

    /// Send a small binary command (e.g. a sensor enable) to the peripheral
    async fn write_command(&self, command: &[u8]) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Write modes a sink advertises for its command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteCapabilities {
    pub without_response: bool,
    pub with_response: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fire-and-forget
    WithoutResponse,
    /// Acknowledged by the peripheral
    WithResponse,
}

impl WriteMode {
    /// Prefer unacknowledged writes for latency; `None` if nothing is writable
    pub fn select(caps: WriteCapabilities) -> Option<Self> {
        if caps.without_response {
            Some(Self::WithoutResponse)
        } else if caps.with_response {
            Some(Self::WithResponse)
        } else {
            None
        }
    }
}

/// Command-consuming peripheral (micro:bit UART)
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Connect and report which write modes the UART channel supports
    async fn connect(&self, device: &DiscoveredDevice)
        -> Result<WriteCapabilities, TransportError>;

    /// Liveness predicate checked by the sender loop every tick
    fn is_connected(&self) -> bool;

    async fn write(&self, bytes: &[u8], mode: WriteMode) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, services: Vec<u128>) -> DiscoveredDevice {
        DiscoveredDevice {
            name: name.to_string(),
            address: 1,
            services,
            signal_strength: -60,
        }
    }

    #[test]
    fn test_filter_matches_service_or_name() {
        let filter = DeviceFilter::new(0xABCD, &["Mario"]);
        assert!(filter.matches(&device("", vec![0xABCD])));
        assert!(filter.matches(&device("LEGO Mario abc", vec![])));
        assert!(!filter.matches(&device("Luigi", vec![0x1234])));
    }

    #[test]
    fn test_write_mode_prefers_unacknowledged() {
        let both = WriteCapabilities {
            without_response: true,
            with_response: true,
        };
        assert_eq!(WriteMode::select(both), Some(WriteMode::WithoutResponse));

        let acked = WriteCapabilities {
            without_response: false,
            with_response: true,
        };
        assert_eq!(WriteMode::select(acked), Some(WriteMode::WithResponse));
        assert_eq!(WriteMode::select(WriteCapabilities::default()), None);
    }
}
