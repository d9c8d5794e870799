//! LEGO Mario and micro:bit BLE protocol definitions
//!
//! Mario speaks the LEGO Wireless Protocol on a single hub characteristic;
//! sensor streams are enabled with "port input format setup" messages. The
//! micro:bit exposes the Nordic UART Service, and its writable characteristic
//! is resolved at connect time.

use crate::session::transport::DeviceFilter;

/// LEGO hub service
pub const LEGO_HUB_SERVICE_UUID: u128 = 0x00001623_1212_efde_1623_785feabcd123;

/// LEGO hub characteristic carrying both commands and notifications
pub const LEGO_HUB_CHAR_UUID: u128 = 0x00001624_1212_efde_1623_785feabcd123;

/// Nordic UART Service
pub const NUS_SERVICE_UUID: u128 = 0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E;

/// Port input format setup: IMU (port 0), mode 0, delta 5, notifications on
///
/// ```text
/// [0]   : Message length (0x0A)
/// [1]   : Hub id
/// [2]   : Message type 0x41 (port input format setup, single)
/// [3]   : Port id
/// [4]   : Mode
/// [5-8] : Delta interval (u32 LE)
/// [9]   : Notification enabled
/// ```
pub const SUBSCRIBE_IMU: [u8; 10] = [0x0A, 0x00, 0x41, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01];

/// Same for the RGB/barcode sensor on port 1. Enabled like the official app
/// does; its notifications are ignored.
pub const SUBSCRIBE_RGB: [u8; 10] = [0x0A, 0x00, 0x41, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01];

/// Commands sent after notifications are enabled, in order
pub const ENABLE_SEQUENCE: &[&[u8]] = &[&SUBSCRIBE_IMU, &SUBSCRIBE_RGB];

/// Delay before each enable command in milliseconds
pub const COMMAND_DELAY_MS: u64 = 200;

pub const MARIO_NAME_TAGS: &[&str] = &["mario"];
pub const MICROBIT_NAME_TAGS: &[&str] = &["bbc micro:bit", "micro:bit"];

pub fn controller_filter() -> DeviceFilter {
    DeviceFilter::new(LEGO_HUB_SERVICE_UUID, MARIO_NAME_TAGS)
}

pub fn actuator_filter() -> DeviceFilter {
    DeviceFilter::new(NUS_SERVICE_UUID, MICROBIT_NAME_TAGS)
}

/// Canonical lower-case 8-4-4-4-12 form
pub fn format_uuid(uuid: u128) -> String {
    let hex = format!("{:032x}", uuid);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
