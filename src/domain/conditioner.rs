//! Signal conditioning for Mario tilt telemetry
//!
//! Every valid IMU notification updates an exponential moving average per
//! axis. Once calibration has armed the conditioner with its bias, each update
//! also maps both axes and publishes a fresh [`CommandValue`].

use crate::domain::command::{CommandState, CommandValue};
use crate::domain::mapper;
use crate::domain::models::{Bias, BridgeTuning};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// EMA coefficient
pub const EMA_ALPHA: f64 = 0.20;

/// Leading type tag of an IMU notification
pub const IMU_PACKET_TAG: u8 = 0x07;

/// Shortest IMU notification that carries all three tilt bytes
pub const IMU_PACKET_MIN_LEN: usize = 7;

/// Raw tilt bytes of one IMU notification
///
/// ```text
/// [0]   : Packet tag (0x07 for IMU)
/// [1-3] : Header, unused
/// [4]   : X tilt (i8)
/// [5]   : Y tilt (i8, unused)
/// [6]   : Z tilt (i8)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiltSample {
    pub x: i8,
    pub y: i8,
    pub z: i8,
}

impl TiltSample {
    /// Decode a notification, or `None` if it is not an IMU packet
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < IMU_PACKET_MIN_LEN || bytes[0] != IMU_PACKET_TAG {
            return None;
        }
        Some(Self {
            x: bytes[4] as i8,
            y: bytes[5] as i8,
            z: bytes[6] as i8,
        })
    }
}

/// Smoothing and bias state for one axis
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterState {
    pub ema: f64,
    pub bias: f64,
}

impl FilterState {
    fn update(&mut self, raw: f64) {
        self.ema = (1.0 - EMA_ALPHA) * self.ema + EMA_ALPHA * raw;
    }
}

/// Receive-path state: filters for X (steering) and Z (throttle)
pub struct SignalConditioner {
    tuning: BridgeTuning,
    x: FilterState,
    z: FilterState,
    armed: bool,
    observations: u64,
    command: Arc<CommandState>,
}

impl SignalConditioner {
    pub fn new(tuning: BridgeTuning, command: Arc<CommandState>) -> Self {
        Self {
            tuning,
            x: FilterState::default(),
            z: FilterState::default(),
            armed: false,
            observations: 0,
            command,
        }
    }

    /// Feed one raw notification payload. Non-IMU payloads are dropped.
    pub fn on_notification(&mut self, bytes: &[u8]) {
        match TiltSample::parse(bytes) {
            Some(sample) => self.observe(sample.x, sample.z),
            None => trace!("Ignoring non-IMU notification ({} bytes)", bytes.len()),
        }
    }

    /// Feed one decoded tilt sample
    pub fn observe(&mut self, raw_x: i8, raw_z: i8) {
        self.x.update(raw_x as f64);
        self.z.update(raw_z as f64);
        self.observations += 1;

        if !self.armed {
            return;
        }

        let mut steer = mapper::map_with(self.x.ema, self.x.bias, &self.tuning.steer);
        // forward is negative Z tilt on Mario
        let mut throttle = -mapper::map_with(self.z.ema, self.z.bias, &self.tuning.throttle);

        if self.tuning.steer.invert {
            steer = -steer;
        }
        if self.tuning.throttle.invert {
            throttle = -throttle;
        }

        self.command.publish(CommandValue { throttle, steer });
    }

    /// Current smoothed readings, used by calibration
    pub fn ema(&self) -> (f64, f64) {
        (self.x.ema, self.z.ema)
    }

    /// Fix the bias and start publishing commands. Only the first call counts.
    pub fn arm(&mut self, bias: Bias) {
        if self.armed {
            warn!("Conditioner already calibrated, ignoring new bias");
            return;
        }
        self.x.bias = if bias.x.is_finite() { bias.x } else { 0.0 };
        self.z.bias = if bias.z.is_finite() { bias.z } else { 0.0 };
        self.armed = true;
        debug!(
            "Conditioner armed with bias x={:.1}, z={:.1}",
            self.x.bias, self.z.bias
        );
    }

    /// Number of valid samples seen so far
    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn filter_x(&self) -> FilterState {
        self.x
    }

    pub fn filter_z(&self) -> FilterState {
        self.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame;
    use crate::domain::models::AxisTuning;

    fn imu_packet(x: i8, z: i8) -> Vec<u8> {
        vec![0x07, 0x00, 0x45, 0x00, x as u8, 0x00, z as u8]
    }

    fn linear_tuning() -> BridgeTuning {
        let axis = AxisTuning {
            scale: 30.0,
            deadzone: 0.10,
            expo: 1.0,
            invert: false,
        };
        BridgeTuning {
            steer: axis,
            throttle: axis,
        }
    }

    fn armed(tuning: BridgeTuning) -> (SignalConditioner, Arc<CommandState>) {
        let command = Arc::new(CommandState::new());
        let mut conditioner = SignalConditioner::new(tuning, Arc::clone(&command));
        conditioner.arm(Bias::default());
        (conditioner, command)
    }

    #[test]
    fn test_parse_signed_bytes() {
        let sample = TiltSample::parse(&[0x07, 0, 0, 0, 0xFF, 0x10, 0x80, 0xAA]).unwrap();
        assert_eq!(sample.x, -1);
        assert_eq!(sample.y, 16);
        assert_eq!(sample.z, -128);
    }

    #[test]
    fn test_parse_rejects_wrong_tag_and_short_packets() {
        assert!(TiltSample::parse(&[0x07, 0, 0]).is_none());
        assert!(TiltSample::parse(&[0x08, 0, 0, 0, 1, 2, 3]).is_none());
        assert!(TiltSample::parse(&[]).is_none());
    }

    #[test]
    fn test_ema_update() {
        let (mut conditioner, _) = armed(linear_tuning());
        conditioner.observe(10, -20);
        let (x, z) = conditioner.ema();
        assert!((x - 2.0).abs() < 1e-12);
        assert!((z + 4.0).abs() < 1e-12);

        conditioner.observe(10, -20);
        let (x, _) = conditioner.ema();
        assert!((x - 3.6).abs() < 1e-12);
    }

    #[test]
    fn test_malformed_payload_changes_nothing() {
        let (mut conditioner, command) = armed(linear_tuning());
        conditioner.on_notification(&imu_packet(20, -20));
        let before_x = conditioner.filter_x();
        let before_z = conditioner.filter_z();
        let before_cmd = command.load();

        conditioner.on_notification(&[0x07, 0x01, 0x02]);

        assert_eq!(conditioner.filter_x(), before_x);
        assert_eq!(conditioner.filter_z(), before_z);
        assert_eq!(command.load(), before_cmd);
    }

    #[test]
    fn test_negative_z_is_forward() {
        let (mut conditioner, command) = armed(linear_tuning());
        for _ in 0..50 {
            conditioner.on_notification(&imu_packet(0, -40));
        }
        let value = command.load();
        assert!(value.throttle > 0.0);
        assert_eq!(value.throttle, 1.0);
        assert_eq!(value.steer, 0.0);
    }

    #[test]
    fn test_invert_flips_each_axis() {
        let mut tuning = linear_tuning();
        tuning.steer.invert = true;
        tuning.throttle.invert = true;
        let (mut conditioner, command) = armed(tuning);
        for _ in 0..50 {
            conditioner.on_notification(&imu_packet(40, -40));
        }
        let value = command.load();
        assert_eq!(value.throttle, -1.0);
        assert_eq!(value.steer, -1.0);
    }

    #[test]
    fn test_frame_matches_full_precision_mapping() {
        let tuning = BridgeTuning::default();
        let (mut conditioner, command) = armed(tuning);
        let mut seed: u32 = 0x1234_5678;

        for _ in 0..20_000 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            conditioner.observe((seed >> 24) as u8 as i8, (seed >> 16) as u8 as i8);

            let (fx, fz) = (conditioner.filter_x(), conditioner.filter_z());
            let steer = mapper::map_with(fx.ema, fx.bias, &tuning.steer);
            let throttle = -mapper::map_with(fz.ema, fz.bias, &tuning.throttle);
            assert_eq!(
                frame::format_frame(&command.load()),
                format!("{:.2},{:.2}:\n", throttle, steer)
            );
        }
    }

    #[test]
    fn test_nothing_published_before_arming() {
        let command = Arc::new(CommandState::new());
        let mut conditioner = SignalConditioner::new(linear_tuning(), Arc::clone(&command));
        for _ in 0..20 {
            conditioner.on_notification(&imu_packet(60, -60));
        }
        assert_eq!(command.load(), CommandValue::NEUTRAL);
        assert!(conditioner.ema().0 > 0.0);
    }

    #[test]
    fn test_bias_is_set_once() {
        let command = Arc::new(CommandState::new());
        let mut conditioner = SignalConditioner::new(linear_tuning(), command);
        conditioner.arm(Bias { x: 1.5, z: -2.0 });
        conditioner.arm(Bias { x: 9.0, z: 9.0 });
        assert_eq!(conditioner.filter_x().bias, 1.5);
        assert_eq!(conditioner.filter_z().bias, -2.0);
        assert!(conditioner.is_armed());
    }
}
