use crate::domain::calibration::CalibrationConfig;
use crate::domain::models::{AxisTuning, BridgeTuning};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_false")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_false(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "mario_bridge".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Mapping feel
    #[serde(default)]
    pub steering: AxisTuning,
    #[serde(default)]
    pub throttle: AxisTuning,

    // Timing (milliseconds)
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    // Calibration
    #[serde(default = "default_calibration_samples")]
    pub calibration_samples: usize,
    #[serde(default = "default_calibration_interval_ms")]
    pub calibration_interval_ms: u64,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            steering: AxisTuning::default(),
            throttle: AxisTuning::default(),
            scan_timeout_ms: default_scan_timeout_ms(),
            tick_ms: default_tick_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            settle_ms: default_settle_ms(),
            calibration_samples: default_calibration_samples(),
            calibration_interval_ms: default_calibration_interval_ms(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_scan_timeout_ms() -> u64 {
    8000
}
fn default_tick_ms() -> u64 {
    100
}
fn default_write_timeout_ms() -> u64 {
    80
}
fn default_settle_ms() -> u64 {
    300
}
fn default_calibration_samples() -> usize {
    6
}
fn default_calibration_interval_ms() -> u64 {
    100
}

impl Settings {
    pub fn tuning(&self) -> BridgeTuning {
        BridgeTuning {
            steer: self.steering,
            throttle: self.throttle,
        }
    }

    pub fn calibration(&self) -> CalibrationConfig {
        CalibrationConfig {
            samples: self.calibration_samples,
            interval: Duration::from_millis(self.calibration_interval_ms),
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load from the default location, falling back to defaults
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    /// Load from an explicit file. Unlike [`SettingsService::new`], a missing or
    /// malformed file is an error.
    pub fn from_path(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let settings_path = path.into();
        let settings = Self::load_from_file(&settings_path).map_err(|e| {
            anyhow::anyhow!(
                "Could not load settings from {}: {}",
                settings_path.display(),
                e
            )
        })?;

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("mario-bridge");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
