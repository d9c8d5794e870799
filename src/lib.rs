//! LEGO Mario to micro:bit tilt bridge
//!
//! Mario's IMU notifications are conditioned into a throttle/steer pair and
//! streamed to a micro:bit over the Nordic UART Service at a fixed rate.

pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod session;
