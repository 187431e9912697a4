//! Configuration file tests.
//!
//! Covers loading from disk, fallback to factory defaults, and merging the
//! `[device]` section with hardware profiles.

use cplot_common::config::{ConfigError, ConfigLoader, PlotterConfig};
use cplot_common::profile::profile_for_model;
use cplot_common::settings::DeviceSettings;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ─── Helpers ────────────────────────────────────────────────────────

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

// ─── Loading ────────────────────────────────────────────────────────

#[test]
fn test_full_config_round_trip_through_settings() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
log_level = "warn"

[device]
model = "AXIDRAW_V3"
port = "sim"
accel_mm_s2 = 400.0
pen_up_pos = 70
pen_down_pos = 30
pen_up_delay_ms = 150
servo_timeout_s = 0
fifo_limit = 0
min_cmd_interval_ms = 0.0

[planner]
cornering_distance_mm = 0.2
min_segment_mm = 0.05
"#,
    );

    let cfg = PlotterConfig::load(&path).unwrap();
    cfg.validate().unwrap();

    let profile = profile_for_model(cfg.device.model.as_deref());
    assert_eq!(profile.model_id, "axidraw_v3");

    let settings = DeviceSettings::from_config(&cfg.device, profile).unwrap();
    assert_eq!(settings.speed_mm_s, 381.0);
    assert_eq!(settings.accel_mm_s2, 400.0);
    assert_eq!(settings.pen_up_pos, Some(70));
    assert_eq!(settings.pen_down_pos, Some(30));
    assert_eq!(settings.pen_up_delay_ms, 150);
    assert_eq!(settings.servo_timeout_s, Some(0));
    assert_eq!(settings.fifo_limit, 0);
    assert_eq!(settings.min_cmd_interval_ms, 0.0);
    assert_eq!(cfg.device.port.as_deref(), Some("sim"));
    assert_eq!(cfg.planner.min_segment_mm, 0.05);
}

#[test]
fn test_syntax_error_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "[device\nmodel = ");
    assert!(matches!(
        PlotterConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let cfg = PlotterConfig::load_or_default(&dir.path().join("absent.toml"));
    assert_eq!(cfg, PlotterConfig::default());
}

#[test]
fn test_invalid_values_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "[device]\nspeed_mm_s = -5.0\n");
    let cfg = PlotterConfig::load_or_default(&path);
    assert_eq!(cfg.device.speed_mm_s, None);
}
