//! Axis mapping
//!
//! Turns a smoothed tilt reading into a bounded control value:
//! debias and normalize, clip, deadzone (slope-continuous), expo, clip.

use crate::domain::models::AxisTuning;

/// Smallest divisor used when normalizing by `scale`
pub const MIN_SCALE: f64 = 1e-6;

fn clip(v: f64) -> f64 {
    v.clamp(-1.0, 1.0)
}

fn sign(v: f64) -> f64 {
    if v >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Map `value` to [-1, 1]
///
/// Inputs inside the deadzone return exactly `0.0`. Outside it the remaining
/// travel is rescaled linearly so the output starts from zero at the edge.
/// Non-finite inputs map to `0.0`.
pub fn map_axis(value: f64, bias: f64, scale: f64, deadzone: f64, expo: f64) -> f64 {
    let x = clip((value - bias) / scale.max(MIN_SCALE));
    if x.is_nan() {
        return 0.0;
    }

    let ax = x.abs();
    if ax <= deadzone {
        return 0.0;
    }
    let mut x = sign(x) * (ax - deadzone) / (1.0 - deadzone);

    if expo != 1.0 {
        x = sign(x) * x.abs().powf(expo);
    }

    let x = clip(x);
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// [`map_axis`] with the parameters taken from an [`AxisTuning`]
///
/// `invert` is not applied here; the caller owns sign conventions.
pub fn map_with(value: f64, bias: f64, tuning: &AxisTuning) -> f64 {
    map_axis(value, bias, tuning.scale, tuning.deadzone, tuning.expo)
}
