//! Bluetooth Module
//!
//! BLE backend for the bridge session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     BridgeSession                    │
//! │      (Discovery / TelemetrySource / CommandSink)     │
//! └──────────────────────────┬───────────────────────────┘
//!                            │
//!         ┌──────────────────┼──────────────────┐
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Scanner    │   │  MarioLink   │   │ MicrobitUart │
//! │              │   │              │   │              │
//! │ - adverts    │   │ - hub char   │   │ - NUS write  │
//! │ - filters    │   │ - notify     │   │   channel    │
//! └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                           └────── connection ┘
//!                              (GATT helpers)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - UUIDs, enable commands and advertisement filters
//! - `scanner` - advertisement watcher (Windows)
//! - `connection` - device open, GATT service and buffer helpers (Windows)
//! - `mario` - LEGO hub telemetry link (Windows)
//! - `uart` - micro:bit UART command sink (Windows)

pub mod protocol;

#[cfg(windows)]
pub mod connection;
#[cfg(windows)]
pub mod mario;
#[cfg(windows)]
pub mod scanner;
#[cfg(windows)]
pub mod uart;

use crate::error::TransportError;
use crate::session::transport::{CommandSink, Discovery, TelemetrySource};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The three collaborators a session needs, backed by the platform radio
pub struct BleBackend {
    pub discovery: Arc<dyn Discovery>,
    pub telemetry: Arc<dyn TelemetrySource>,
    pub sink: Arc<dyn CommandSink>,
}

impl BleBackend {
    #[cfg(windows)]
    pub fn platform() -> Result<Self, TransportError> {
        Ok(Self {
            discovery: Arc::new(scanner::BleScanner::new()),
            telemetry: Arc::new(mario::MarioLink::new()),
            sink: Arc::new(uart::MicrobitUart::new()),
        })
    }

    #[cfg(not(windows))]
    pub fn platform() -> Result<Self, TransportError> {
        Err(TransportError::Backend(
            "no BLE backend for this platform (Windows 10+ required)".to_string(),
        ))
    }
}

/// Run a cleanup GATT operation to completion, giving up after `limit`.
/// Failures are logged, never returned. Returns whether it succeeded.
pub async fn best_effort<F>(what: &str, limit: Duration, op: F) -> bool
where
    F: Future<Output = Result<(), TransportError>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("{} failed: {}", what, e);
            false
        }
        Err(_) => {
            debug!("{} timed out after {:?}", what, limit);
            false
        }
    }
}
