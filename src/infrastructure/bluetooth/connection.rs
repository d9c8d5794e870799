//! BLE Connection Module
//!
//! Device open, GATT service lookup and buffer conversion shared by the
//! Mario link and the micro:bit UART.

use crate::error::TransportError;
use crate::infrastructure::bluetooth::protocol;
use tracing::{info, warn};
use windows::core::GUID;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattCharacteristicProperties, GattCommunicationStatus,
    GattDeviceService, GattSession,
};
use windows::Devices::Bluetooth::{BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Storage::Streams::{DataReader, DataWriter, IBuffer};

/// An open device plus the session that keeps its link up
pub struct OpenDevice {
    pub device: BluetoothLEDevice,
    session: Option<GattSession>,
}

impl OpenDevice {
    /// Connect to a device by Bluetooth address
    pub async fn connect(address: u64) -> Result<Self, TransportError> {
        info!("Connecting to Bluetooth device: {:#X}", address);
        let device = BluetoothLEDevice::FromBluetoothAddressAsync(address)?.await?;

        // Without MaintainConnection Windows may drop an idle link
        let session = match Self::create_gatt_session(&device).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Failed to create GattSession, continuing anyway: {}", e);
                None
            }
        };

        Ok(Self { device, session })
    }

    async fn create_gatt_session(device: &BluetoothLEDevice) -> Result<GattSession, TransportError> {
        let device_id = device.BluetoothDeviceId()?;
        let session = GattSession::FromDeviceIdAsync(&device_id)?.await?;
        session.SetMaintainConnection(true)?;
        Ok(session)
    }

    pub fn is_connected(&self) -> bool {
        self.device
            .ConnectionStatus()
            .map(|s| s == BluetoothConnectionStatus::Connected)
            .unwrap_or(false)
    }

    /// First primary service with the given UUID
    pub async fn service(&self, uuid: u128) -> Result<GattDeviceService, TransportError> {
        let result = self
            .device
            .GetGattServicesForUuidAsync(GUID::from_u128(uuid))?
            .await?;
        check_status(result.Status()?)?;

        let services = result.Services()?;
        if services.Size()? == 0 {
            return Err(TransportError::NotFound(format!(
                "service {}",
                protocol::format_uuid(uuid)
            )));
        }
        Ok(services.GetAt(0)?)
    }

    pub fn close(self) {
        if let Some(session) = self.session {
            let _ = session.Close();
        }
        let _ = self.device.Close();
    }
}

/// Every characteristic of `service`, collected eagerly
pub async fn characteristics(
    service: &GattDeviceService,
) -> Result<Vec<GattCharacteristic>, TransportError> {
    let result = service.GetCharacteristicsAsync()?.await?;
    check_status(result.Status()?)?;

    let view = result.Characteristics()?;
    let mut out = Vec::new();
    for i in 0..view.Size()? {
        out.push(view.GetAt(i)?);
    }
    Ok(out)
}

pub fn has_property(
    characteristic: &GattCharacteristic,
    property: GattCharacteristicProperties,
) -> bool {
    characteristic
        .CharacteristicProperties()
        .map(|p| p.0 & property.0 != 0)
        .unwrap_or(false)
}

pub fn check_status(status: GattCommunicationStatus) -> Result<(), TransportError> {
    if status == GattCommunicationStatus::Success {
        Ok(())
    } else {
        Err(TransportError::Gatt(format!("{:?}", status)))
    }
}

pub fn to_buffer(bytes: &[u8]) -> Result<IBuffer, TransportError> {
    let writer = DataWriter::new()?;
    writer.WriteBytes(bytes)?;
    Ok(writer.DetachBuffer()?)
}

pub fn from_buffer(buffer: &IBuffer) -> Result<Vec<u8>, TransportError> {
    let reader = DataReader::FromBuffer(buffer)?;
    let mut bytes = vec![0u8; reader.UnconsumedBufferLength()? as usize];
    reader.ReadBytes(&mut bytes)?;
    Ok(bytes)
}
