//! Zero-bias calibration
//!
//! Runs once after the controller is subscribed. The device is expected to be
//! held still while the conditioner's smoothed output is sampled; the bias is
//! the per-axis mean of those samples.

use crate::domain::conditioner::SignalConditioner;
use crate::domain::models::Bias;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationConfig {
    /// Number of EMA samples to average
    pub samples: usize,
    /// Delay before each sample
    pub interval: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            samples: 6,
            interval: Duration::from_millis(100),
        }
    }
}

/// Result of one calibration pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOutcome {
    pub bias: Bias,
    pub samples_collected: usize,
}

impl CalibrationOutcome {
    /// True when fewer samples than requested were usable
    pub fn is_underrun(&self, config: &CalibrationConfig) -> bool {
        self.samples_collected < config.samples
    }
}

/// Average `samples` readings of the conditioner's EMA
///
/// A reading only counts once at least one IMU notification has arrived.
/// With no usable readings the bias stays at zero. The caller arms the
/// conditioner with the returned bias.
pub async fn calibrate(
    conditioner: &Mutex<SignalConditioner>,
    config: &CalibrationConfig,
) -> CalibrationOutcome {
    info!(
        "Calibrating zero (hold Mario still ~{:.1}s)...",
        (config.interval * config.samples as u32).as_secs_f64()
    );

    let mut xs = Vec::with_capacity(config.samples);
    let mut zs = Vec::with_capacity(config.samples);

    for _ in 0..config.samples {
        tokio::time::sleep(config.interval).await;
        let (x, z, seen) = {
            let c = conditioner.lock();
            let (x, z) = c.ema();
            (x, z, c.observations())
        };
        if seen > 0 && x.is_finite() && z.is_finite() {
            xs.push(x);
            zs.push(z);
        }
    }

    let bias = if xs.is_empty() {
        Bias::default()
    } else {
        Bias {
            x: xs.iter().sum::<f64>() / xs.len() as f64,
            z: zs.iter().sum::<f64>() / zs.len() as f64,
        }
    };

    let outcome = CalibrationOutcome {
        bias,
        samples_collected: xs.len(),
    };

    if outcome.is_underrun(config) {
        warn!(
            "Calibration collected {}/{} samples, bias may be off (using x={:.1}, z={:.1})",
            outcome.samples_collected, config.samples, bias.x, bias.z
        );
    } else {
        info!("Bias: x={:.1}, z={:.1}", bias.x, bias.z);
    }

    outcome
}
