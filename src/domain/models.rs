use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the bridge a peripheral sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralRole {
    /// Motion-sensing toy streaming tilt telemetry (LEGO Mario)
    Controller,
    /// Microcontroller receiving command frames over BLE UART (micro:bit)
    Actuator,
}

impl PeripheralRole {
    /// What the user should do when this peripheral cannot be reached
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            Self::Controller => "Press Mario's Bluetooth button and retry.",
            Self::Actuator => {
                "Make sure BLE UART is running on the micro:bit and it is not paired in the OS Bluetooth settings."
            }
        }
    }
}

impl fmt::Display for PeripheralRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => write!(f, "Mario"),
            Self::Actuator => write!(f, "micro:bit"),
        }
    }
}

/// Response tuning for one axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisTuning {
    /// Raw tilt units that map to full deflection (larger = less sensitive)
    pub scale: f64,
    /// Fraction of travel around center forced to zero, in [0, 1)
    pub deadzone: f64,
    /// Power curve exponent: 1.0 linear, >1 soft center, <1 aggressive
    pub expo: f64,
    #[serde(default)]
    pub invert: bool,
}

impl Default for AxisTuning {
    fn default() -> Self {
        Self {
            scale: 30.0,
            deadzone: 0.10,
            expo: 1.4,
            invert: false,
        }
    }
}

impl AxisTuning {
    pub fn validate(&self, axis: &'static str) -> Result<(), BridgeError> {
        let invalid = |reason: String| BridgeError::InvalidTuning { axis, reason };

        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(invalid(format!("scale must be > 0, got {}", self.scale)));
        }
        if !(0.0..1.0).contains(&self.deadzone) {
            return Err(invalid(format!(
                "deadzone must be in [0, 1), got {}",
                self.deadzone
            )));
        }
        if !self.expo.is_finite() || self.expo <= 0.0 {
            return Err(invalid(format!("expo must be > 0, got {}", self.expo)));
        }
        Ok(())
    }
}

/// Tuning for both channels, fixed for the whole session
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BridgeTuning {
    /// Driven by the X tilt axis
    pub steer: AxisTuning,
    /// Driven by the Z tilt axis
    pub throttle: AxisTuning,
}

impl BridgeTuning {
    pub fn validate(&self) -> Result<(), BridgeError> {
        self.steer.validate("steering")?;
        self.throttle.validate("throttle")
    }
}

/// Per-axis zero offsets produced by calibration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bias {
    pub x: f64,
    pub z: f64,
}

/// A device seen during a BLE scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: u64,
    /// Advertised service UUIDs
    pub services: Vec<u128>,
    pub signal_strength: i16,
}

impl DiscoveredDevice {
    /// Fold a later advertisement from the same address into this one.
    /// Names and service lists often arrive in separate scan responses.
    pub fn merge(&mut self, other: DiscoveredDevice) {
        if self.name.is_empty() {
            self.name = other.name;
        }
        for service in other.services {
            if !self.services.contains(&service) {
                self.services.push(service);
            }
        }
        self.signal_strength = other.signal_strength;
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() {
            "Unknown"
        } else {
            &self.name
        };
        write!(f, "{} ({})", name, format_address(self.address))
    }
}

/// Render a 48-bit Bluetooth address as `AA:BB:CC:DD:EE:FF`
pub fn format_address(address: u64) -> String {
    let bytes = address.to_be_bytes();
    bytes[2..]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}
