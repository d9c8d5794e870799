//! LEGO Mario telemetry link
//!
//! One hub characteristic carries both directions: sensor enables are written
//! to it and IMU/RGB reports arrive on it as notifications.

use crate::domain::models::DiscoveredDevice;
use crate::error::TransportError;
use crate::infrastructure::bluetooth::connection::{self, OpenDevice};
use crate::infrastructure::bluetooth::{best_effort, protocol};
use crate::session::transport::{NotificationHandler, TelemetrySource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{info, warn};
use windows::core::GUID;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattClientCharacteristicConfigurationDescriptorValue, GattWriteOption,
    GattValueChangedEventArgs,
};
use windows::Foundation::TypedEventHandler;

/// Upper bound on turning notifications off during disconnect
const UNSUBSCRIBE_TIMEOUT: Duration = Duration::from_millis(500);

struct HubConnection {
    open: OpenDevice,
    hub: GattCharacteristic,
    notify_token: Option<i64>,
}

#[derive(Default)]
pub struct MarioLink {
    inner: Mutex<Option<HubConnection>>,
}

impl MarioLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> Result<GattCharacteristic, TransportError> {
        self.inner
            .lock()
            .as_ref()
            .map(|c| c.hub.clone())
            .ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl TelemetrySource for MarioLink {
    async fn connect(&self, device: &DiscoveredDevice) -> Result<(), TransportError> {
        let open = OpenDevice::connect(device.address).await?;
        let hub = match find_hub(&open).await {
            Ok(hub) => hub,
            Err(e) => {
                open.close();
                return Err(e);
            }
        };

        info!("Found LEGO hub characteristic");
        *self.inner.lock() = Some(HubConnection {
            open,
            hub,
            notify_token: None,
        });
        Ok(())
    }

    async fn subscribe(&self, handler: NotificationHandler) -> Result<(), TransportError> {
        let hub = self.hub()?;

        let value_handler = TypedEventHandler::new(
            move |_: windows::core::Ref<GattCharacteristic>,
                  args: windows::core::Ref<GattValueChangedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    if let Ok(value) = args.CharacteristicValue() {
                        if let Ok(bytes) = connection::from_buffer(&value) {
                            handler(&bytes);
                        }
                    }
                }
                Ok(())
            },
        );
        let token = hub.ValueChanged(&value_handler)?;
        if let Some(conn) = self.inner.lock().as_mut() {
            conn.notify_token = Some(token);
        }

        let status = hub
            .WriteClientCharacteristicConfigurationDescriptorAsync(
                GattClientCharacteristicConfigurationDescriptorValue::Notify,
            )?
            .await?;
        connection::check_status(status)?;
        info!("Notifications enabled");
        Ok(())
    }

    async fn write_command(&self, command: &[u8]) -> Result<(), TransportError> {
        let hub = self.hub()?;
        let op = {
            let buffer = connection::to_buffer(command)?;
            hub.WriteValueWithOptionAsync(&buffer, GattWriteOption::WriteWithoutResponse)?
        };
        connection::check_status(op.await?)
    }

    fn is_connected(&self) -> bool {
        self.inner
            .lock()
            .as_ref()
            .map_or(false, |c| c.open.is_connected())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let conn = self.inner.lock().take().ok_or(TransportError::NotConnected)?;

        if let Some(token) = conn.notify_token {
            if let Err(e) = conn.hub.RemoveValueChanged(token) {
                warn!("Failed to remove notification handler: {}", e.message());
            }
        }
        // Mario keeps streaming to a half-closed link otherwise
        let hub = conn.hub.clone();
        best_effort("Disabling notifications", UNSUBSCRIBE_TIMEOUT, async move {
            let op = hub.WriteClientCharacteristicConfigurationDescriptorAsync(
                GattClientCharacteristicConfigurationDescriptorValue::None,
            )?;
            connection::check_status(op.await?)
        })
        .await;

        conn.open.close();
        Ok(())
    }
}

async fn find_hub(open: &OpenDevice) -> Result<GattCharacteristic, TransportError> {
    let service = open.service(protocol::LEGO_HUB_SERVICE_UUID).await?;
    let target = GUID::from_u128(protocol::LEGO_HUB_CHAR_UUID);

    connection::characteristics(&service)
        .await?
        .into_iter()
        .find(|c| c.Uuid().map_or(false, |uuid| uuid == target))
        .ok_or_else(|| {
            TransportError::NotFound(format!(
                "characteristic {}",
                protocol::format_uuid(protocol::LEGO_HUB_CHAR_UUID)
            ))
        })
}
