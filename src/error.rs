//! Error types for the bridge
//!
//! Fatal setup failures are [`BridgeError`]s and always name the peripheral
//! involved. Backend failures below the lifecycle are [`TransportError`]s.

use crate::domain::models::PeripheralRole;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a BLE backend (discovery, GATT access, writes)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not connected")]
    NotConnected,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("GATT operation failed with status: {0}")]
    Gatt(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(windows)]
impl From<windows::core::Error> for TransportError {
    fn from(e: windows::core::Error) -> Self {
        TransportError::Backend(format!("{} ({:?})", e.message(), e.code()))
    }
}

/// Fatal session errors. Any of these aborts setup and triggers teardown.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{role} not found within {timeout:?}. {}", role.remediation_hint())]
    DiscoveryFailure {
        role: PeripheralRole,
        timeout: Duration,
    },

    #[error("Scanning for {role} failed: {source}")]
    Discovery {
        role: PeripheralRole,
        #[source]
        source: TransportError,
    },

    #[error("Failed to connect to {role}: {source}. {}", role.remediation_hint())]
    ConnectFailure {
        role: PeripheralRole,
        #[source]
        source: TransportError,
    },

    #[error("Failed to subscribe on {role}: {source}")]
    SubscribeFailure {
        role: PeripheralRole,
        #[source]
        source: TransportError,
    },

    #[error("No writable UART characteristic found on {role}")]
    NoWritableChannel { role: PeripheralRole },

    #[error("Invalid {axis} tuning: {reason}")]
    InvalidTuning { axis: &'static str, reason: String },

    #[error("{role} link cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        role: PeripheralRole,
        from: crate::session::link::LinkState,
        to: crate::session::link::LinkState,
    },
}
