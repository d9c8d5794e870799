// CLI definitions using clap

use clap::{Args, Parser, Subcommand};
use mario_bridge::domain::settings::Settings;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mario-bridge")]
#[command(author, version, about = "Drive a micro:bit from LEGO Mario's tilt sensor")]
pub struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level, echoing every frame sent
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bridge Mario to the micro:bit (default)
    Run(RunArgs),

    /// List advertising BLE devices and report whether both peripherals are visible
    Scan {
        /// Scan duration in seconds
        #[arg(long, default_value_t = 8.0)]
        timeout: f64,
    },
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Tilt (raw units) that gives full steering
    #[arg(long, value_name = "UNITS")]
    pub x_scale: Option<f64>,

    /// Tilt (raw units) that gives full throttle
    #[arg(long, value_name = "UNITS")]
    pub z_scale: Option<f64>,

    /// Deadzone for both axes, as a fraction of full scale
    #[arg(long)]
    pub deadzone: Option<f64>,

    /// Response curve exponent for both axes (1 = linear)
    #[arg(long)]
    pub expo: Option<f64>,

    /// Reverse steering
    #[arg(long)]
    pub invert_x: bool,

    /// Reverse throttle
    #[arg(long)]
    pub invert_z: bool,

    /// Per-peripheral discovery timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub scan_timeout: Option<f64>,
}

impl RunArgs {
    /// Overlay command-line values onto loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(scale) = self.x_scale {
            settings.steering.scale = scale;
        }
        if let Some(scale) = self.z_scale {
            settings.throttle.scale = scale;
        }
        if let Some(deadzone) = self.deadzone {
            settings.steering.deadzone = deadzone;
            settings.throttle.deadzone = deadzone;
        }
        if let Some(expo) = self.expo {
            settings.steering.expo = expo;
            settings.throttle.expo = expo;
        }
        if self.invert_x {
            settings.steering.invert = true;
        }
        if self.invert_z {
            settings.throttle.invert = true;
        }
        if let Some(secs) = self.scan_timeout {
            settings.scan_timeout_ms = seconds_to_ms(secs);
        }
    }
}

pub fn seconds_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}
