//! BLE Scanner Module
//!
//! Discovers Mario and the micro:bit from their advertisements.

use crate::domain::models::DiscoveredDevice;
use crate::error::TransportError;
use crate::session::transport::{DeviceFilter, Discovery};
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Foundation::TypedEventHandler;

/// Stops the watcher when the scan ends, however it ends
struct ActiveScan(BluetoothLEAdvertisementWatcher);

impl Drop for ActiveScan {
    fn drop(&mut self) {
        if let Err(e) = self.0.Stop() {
            warn!("Failed to stop BLE scan: {}", e.message());
        }
    }
}

#[derive(Default)]
pub struct BleScanner;

impl BleScanner {
    pub fn new() -> Self {
        Self
    }

    /// Start an active scan feeding every advertisement into `sender`
    fn start(sender: mpsc::UnboundedSender<DiscoveredDevice>) -> Result<ActiveScan, TransportError> {
        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let adv = args.Advertisement()?;
                    let service_uuids = adv.ServiceUuids()?;

                    let mut services = Vec::new();
                    for i in 0..service_uuids.Size()? {
                        services.push(service_uuids.GetAt(i)?.to_u128());
                    }

                    let _ = sender.send(DiscoveredDevice {
                        name: adv.LocalName()?.to_string(),
                        address: args.BluetoothAddress()?,
                        services,
                        signal_strength: args.RawSignalStrengthInDBm()?,
                    });
                }
                Ok(())
            },
        );

        watcher.Received(&handler)?;
        watcher.Start()?;
        Ok(ActiveScan(watcher))
    }
}

/// Merge into the per-address table and return the combined view
fn record(seen: &mut HashMap<u64, DiscoveredDevice>, adv: DiscoveredDevice) -> &DiscoveredDevice {
    match seen.entry(adv.address) {
        Entry::Occupied(entry) => {
            let known = entry.into_mut();
            known.merge(adv);
            known
        }
        Entry::Vacant(entry) => entry.insert(adv),
    }
}

#[async_trait]
impl Discovery for BleScanner {
    async fn find(
        &self,
        filter: &DeviceFilter,
        timeout: Duration,
    ) -> Result<Option<DiscoveredDevice>, TransportError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scan = Self::start(tx)?;
        let deadline = tokio::time::Instant::now() + timeout;
        let mut seen = HashMap::new();

        let found = loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(adv)) => {
                    let device = record(&mut seen, adv);
                    if filter.matches(device) {
                        debug!("Matched {} ({} dBm)", device, device.signal_strength);
                        break Some(device.clone());
                    }
                }
                Ok(None) | Err(_) => break None,
            }
        };

        drop(scan);
        Ok(found)
    }

    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        info!("Scanning for {:?}...", timeout);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scan = Self::start(tx)?;
        let deadline = tokio::time::Instant::now() + timeout;
        let mut seen = HashMap::new();

        while let Ok(Some(adv)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            record(&mut seen, adv);
        }

        drop(scan);
        let mut devices: Vec<_> = seen.into_values().collect();
        devices.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));
        Ok(devices)
    }
}
