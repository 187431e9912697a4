//! Configuration loading traits and types.
//!
//! The plotter configuration lives in a single TOML file. Every field has a
//! default, so an empty file (or no file at all) yields factory settings.
//!
//! # TOML Example
//!
//! ```toml
//! log_level = "debug"
//!
//! [device]
//! model = "axidraw_v3"
//! pen_up_pos = 65
//!
//! [planner]
//! cornering_distance_mm = 0.3
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use cplot_common::config::{ConfigLoader, PlotterConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = PlotterConfig::load(Path::new("config.toml"))?;
//!     config.validate()?;
//!     println!("model: {:?}", config.device.model);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_FIFO_LIMIT, DEFAULT_MIN_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, wire-level tracing.
    Trace,
    /// Debug information, including every command sent to the controller.
    Debug,
    /// General information about plotter operation.
    #[default]
    Info,
    /// Warnings such as skipped settings.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

// ─── Device section ─────────────────────────────────────────────────

fn default_pen_up_pos() -> u8 {
    60
}
fn default_pen_down_pos() -> u8 {
    40
}
fn default_pen_speed() -> u32 {
    150
}
fn default_servo_timeout_s() -> u32 {
    60
}
fn default_min_cmd_interval_ms() -> f64 {
    DEFAULT_MIN_INTERVAL_MS
}
fn default_fifo_limit() -> usize {
    DEFAULT_FIFO_LIMIT
}

/// `[device]` section: hardware selection, pen servo and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Profile id (case-insensitive). `None` selects the default model.
    #[serde(default)]
    pub model: Option<String>,

    /// Serial port path. `None` means auto-detect; `"sim"` selects the simulated firmware.
    #[serde(default)]
    pub port: Option<String>,

    /// Override of the profile travel speed (mm/s).
    #[serde(default)]
    pub speed_mm_s: Option<f64>,

    /// Override of the profile acceleration (mm/s²).
    #[serde(default)]
    pub accel_mm_s2: Option<f64>,

    /// Servo position with the pen raised (%).
    #[serde(default = "default_pen_up_pos")]
    pub pen_up_pos: u8,

    /// Servo position with the pen lowered (%).
    #[serde(default = "default_pen_down_pos")]
    pub pen_down_pos: u8,

    /// Raise speed (%/s).
    #[serde(default = "default_pen_speed")]
    pub pen_up_speed: u32,

    /// Lower speed (%/s).
    #[serde(default = "default_pen_speed")]
    pub pen_down_speed: u32,

    /// Settle delay after raising (ms).
    #[serde(default)]
    pub pen_up_delay_ms: u32,

    /// Settle delay after lowering (ms).
    #[serde(default)]
    pub pen_down_delay_ms: u32,

    /// Servo auto power-off timeout (s).
    #[serde(default = "default_servo_timeout_s")]
    pub servo_timeout_s: u32,

    /// Minimum spacing between dispatched commands (ms).
    #[serde(default = "default_min_cmd_interval_ms")]
    pub min_cmd_interval_ms: f64,

    /// Firmware queue depth ceiling; 0 disables the gate.
    #[serde(default = "default_fifo_limit")]
    pub fifo_limit: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model: None,
            port: None,
            speed_mm_s: None,
            accel_mm_s2: None,
            pen_up_pos: default_pen_up_pos(),
            pen_down_pos: default_pen_down_pos(),
            pen_up_speed: default_pen_speed(),
            pen_down_speed: default_pen_speed(),
            pen_up_delay_ms: 0,
            pen_down_delay_ms: 0,
            servo_timeout_s: default_servo_timeout_s(),
            min_cmd_interval_ms: default_min_cmd_interval_ms(),
            fifo_limit: default_fifo_limit(),
        }
    }
}

impl DeviceConfig {
    /// Validate numeric ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first field out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(speed) = self.speed_mm_s
            && !(speed > 0.0 && speed <= 2000.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "speed_mm_s must be in (0, 2000], got {speed}"
            )));
        }
        if let Some(accel) = self.accel_mm_s2
            && !(accel > 0.0 && accel <= 50_000.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "accel_mm_s2 must be in (0, 50000], got {accel}"
            )));
        }
        if self.pen_up_pos > 100 || self.pen_down_pos > 100 {
            return Err(ConfigError::ValidationError(format!(
                "pen positions must be 0..=100, got up={} down={}",
                self.pen_up_pos, self.pen_down_pos
            )));
        }
        for (name, speed) in [
            ("pen_up_speed", self.pen_up_speed),
            ("pen_down_speed", self.pen_down_speed),
        ] {
            if !(1..=1000).contains(&speed) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be 1..=1000, got {speed}"
                )));
            }
        }
        if self.pen_up_delay_ms > 10_000 || self.pen_down_delay_ms > 10_000 {
            return Err(ConfigError::ValidationError(format!(
                "pen delays must be 0..=10000 ms, got up={} down={}",
                self.pen_up_delay_ms, self.pen_down_delay_ms
            )));
        }
        if self.servo_timeout_s > 300 {
            return Err(ConfigError::ValidationError(format!(
                "servo_timeout_s must be 0..=300, got {}",
                self.servo_timeout_s
            )));
        }
        if !(self.min_cmd_interval_ms >= 0.0 && self.min_cmd_interval_ms.is_finite()) {
            return Err(ConfigError::ValidationError(format!(
                "min_cmd_interval_ms must be a finite value >= 0, got {}",
                self.min_cmd_interval_ms
            )));
        }
        Ok(())
    }
}

// ─── Planner section ────────────────────────────────────────────────

fn default_cornering_distance_mm() -> f64 {
    0.5
}
fn default_min_segment_mm() -> f64 {
    0.1
}

/// `[planner]` section: path shaping constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerConfig {
    /// Junction deviation constant (mm).
    #[serde(default = "default_cornering_distance_mm")]
    pub cornering_distance_mm: f64,

    /// Segments shorter than this are merged into their predecessor when collinear (mm).
    #[serde(default = "default_min_segment_mm")]
    pub min_segment_mm: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cornering_distance_mm: default_cornering_distance_mm(),
            min_segment_mm: default_min_segment_mm(),
        }
    }
}

impl PlannerConfig {
    /// Validate the planner constants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for negative or non-finite values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cornering_distance_mm >= 0.0 && self.cornering_distance_mm.is_finite()) {
            return Err(ConfigError::ValidationError(format!(
                "cornering_distance_mm must be >= 0, got {}",
                self.cornering_distance_mm
            )));
        }
        if !(self.min_segment_mm >= 0.0 && self.min_segment_mm.is_finite()) {
            return Err(ConfigError::ValidationError(format!(
                "min_segment_mm must be >= 0, got {}",
                self.min_segment_mm
            )));
        }
        Ok(())
    }
}

// ─── Root ───────────────────────────────────────────────────────────

/// Root of the plotter configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlotterConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Hardware and pen settings.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Planner constants.
    #[serde(default)]
    pub planner: PlannerConfig,
}

impl PlotterConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first section's `ConfigError::ValidationError`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device.validate()?;
        self.planner.validate()
    }

    /// Load `path`, falling back to factory defaults when the file is missing
    /// or invalid.
    ///
    /// A broken file never aborts the session: it is reported and replaced by
    /// defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path).and_then(|cfg| cfg.validate().map(|()| cfg)) {
            Ok(cfg) => {
                info!("Configuration loaded from {}", path.display());
                cfg
            }
            Err(ConfigError::FileNotFound) => {
                info!(
                    "No configuration at {}, using factory defaults",
                    path.display()
                );
                Self::default()
            }
            Err(e) => {
                warn!(
                    "Configuration at {} is invalid ({e}), using factory defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }
}

/// Default configuration path.
///
/// `$XDG_CONFIG_HOME/cplot/config.toml`, else `$HOME/.config/cplot/config.toml`,
/// else `./config.toml`.
pub fn default_config_path() -> PathBuf {
    let non_empty = |key: &str| std::env::var_os(key).filter(|v| !v.is_empty());
    let path = if let Some(xdg) = non_empty("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
    } else if let Some(home) = non_empty("HOME") {
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    } else {
        PathBuf::from(".").join(CONFIG_FILE_NAME)
    };
    debug!("Configuration path: {}", path.display());
    path
}

/// Trait for loading configuration from TOML files.
///
/// Provides a default implementation for any type implementing
/// `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize)]
        struct Wrapper {
            level: LogLevel,
        }

        for (text, level) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            let parsed: Wrapper = toml::from_str(&format!("level = \"{text}\"")).unwrap();
            assert_eq!(parsed.level, level);
            assert_eq!(level.as_directive(), text);
        }
    }

    #[test]
    fn test_empty_file_yields_factory_defaults() {
        let cfg = PlotterConfig::from_toml("").unwrap();
        assert_eq!(cfg, PlotterConfig::default());
        assert_eq!(cfg.device.pen_up_pos, 60);
        assert_eq!(cfg.device.pen_down_pos, 40);
        assert_eq!(cfg.device.pen_up_speed, 150);
        assert_eq!(cfg.device.servo_timeout_s, 60);
        assert_eq!(cfg.device.fifo_limit, 3);
        assert_eq!(cfg.planner.cornering_distance_mm, 0.5);
        assert_eq!(cfg.planner.min_segment_mm, 0.1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_device_section() {
        let cfg = PlotterConfig::from_toml(
            r#"
log_level = "debug"

[device]
model = "AxiDraw_V3"
pen_up_pos = 75
speed_mm_s = 120.0
"#,
        )
        .unwrap();
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.device.model.as_deref(), Some("AxiDraw_V3"));
        assert_eq!(cfg.device.pen_up_pos, 75);
        assert_eq!(cfg.device.pen_down_pos, 40);
        assert_eq!(cfg.device.speed_mm_s, Some(120.0));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = PlotterConfig::from_toml("[device]\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation_rejects_out_of_range_fields() {
        let mut cfg = DeviceConfig::default();
        cfg.pen_up_pos = 101;
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));

        let mut cfg = DeviceConfig::default();
        cfg.pen_down_speed = 0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("pen_down_speed"), "message: {msg}");

        let mut cfg = DeviceConfig::default();
        cfg.servo_timeout_s = 301;
        assert!(cfg.validate().is_err());

        let mut cfg = DeviceConfig::default();
        cfg.speed_mm_s = Some(f64::NAN);
        assert!(cfg.validate().is_err());

        let planner = PlannerConfig {
            cornering_distance_mm: -0.1,
            min_segment_mm: 0.1,
        };
        assert!(planner.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = PlotterConfig::load(Path::new("/nonexistent/cplot/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_load_or_default_replaces_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[device]\npen_up_pos = 250").unwrap();
        let cfg = PlotterConfig::load_or_default(file.path());
        assert_eq!(cfg, PlotterConfig::default());
    }

    #[test]
    fn test_load_or_default_keeps_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[planner]\nmin_segment_mm = 0.25").unwrap();
        let cfg = PlotterConfig::load_or_default(file.path());
        assert_eq!(cfg.planner.min_segment_mm, 0.25);
    }
}
