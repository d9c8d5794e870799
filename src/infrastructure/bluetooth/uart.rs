//! micro:bit UART command sink
//!
//! The Nordic UART Service's writable characteristic is resolved by its
//! properties rather than its UUID; micro:bit firmware has swapped the TX and
//! RX UUIDs between releases.

use crate::domain::models::DiscoveredDevice;
use crate::error::TransportError;
use crate::infrastructure::bluetooth::connection::{self, OpenDevice};
use crate::infrastructure::bluetooth::protocol;
use crate::session::transport::{CommandSink, WriteCapabilities, WriteMode};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattCharacteristicProperties, GattWriteOption,
};

struct UartConnection {
    open: OpenDevice,
    rx: GattCharacteristic,
}

#[derive(Default)]
pub struct MicrobitUart {
    inner: Mutex<Option<UartConnection>>,
}

impl MicrobitUart {
    pub fn new() -> Self {
        Self::default()
    }
}

fn capabilities(characteristic: &GattCharacteristic) -> WriteCapabilities {
    WriteCapabilities {
        without_response: connection::has_property(
            characteristic,
            GattCharacteristicProperties::WriteWithoutResponse,
        ),
        with_response: connection::has_property(
            characteristic,
            GattCharacteristicProperties::Write,
        ),
    }
}

#[async_trait]
impl CommandSink for MicrobitUart {
    async fn connect(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<WriteCapabilities, TransportError> {
        let open = OpenDevice::connect(device.address).await?;

        let found = match open.service(protocol::NUS_SERVICE_UUID).await {
            Ok(service) => connection::characteristics(&service).await,
            Err(e) => Err(e),
        };
        let characteristics = match found {
            Ok(c) => c,
            Err(e) => {
                open.close();
                return Err(e);
            }
        };

        // No writable characteristic is reported as empty capabilities; the
        // session decides that this is fatal.
        let Some((rx, caps)) = characteristics
            .into_iter()
            .map(|c| {
                let caps = capabilities(&c);
                (c, caps)
            })
            .find(|(_, caps)| caps.without_response || caps.with_response)
        else {
            *self.inner.lock() = None;
            open.close();
            return Ok(WriteCapabilities::default());
        };

        info!(
            "UART write channel ready (without response: {}, with response: {})",
            caps.without_response, caps.with_response
        );
        *self.inner.lock() = Some(UartConnection { open, rx });
        Ok(caps)
    }

    fn is_connected(&self) -> bool {
        self.inner
            .lock()
            .as_ref()
            .map_or(false, |c| c.open.is_connected())
    }

    async fn write(&self, bytes: &[u8], mode: WriteMode) -> Result<(), TransportError> {
        let rx = self
            .inner
            .lock()
            .as_ref()
            .map(|c| c.rx.clone())
            .ok_or(TransportError::NotConnected)?;

        let option = match mode {
            WriteMode::WithoutResponse => GattWriteOption::WriteWithoutResponse,
            WriteMode::WithResponse => GattWriteOption::WriteWithResponse,
        };
        let op = {
            let buffer = connection::to_buffer(bytes)?;
            rx.WriteValueWithOptionAsync(&buffer, option)?
        };
        connection::check_status(op.await?)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let conn = self.inner.lock().take().ok_or(TransportError::NotConnected)?;
        conn.open.close();
        Ok(())
    }
}
