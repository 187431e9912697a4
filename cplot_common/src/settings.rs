//! Live device settings.
//!
//! `DeviceSettings` is built from a profile plus the user configuration
//! before connecting, copied into the device, and may be re-applied at any
//! time while connected. Optional servo fields are only pushed to the
//! firmware when set.

use crate::config::{ConfigError, DeviceConfig};
use crate::consts::{DEFAULT_FIFO_LIMIT, DEFAULT_MIN_INTERVAL_MS};
use crate::profile::DeviceProfile;
use serde::Serialize;
use tracing::debug;

/// Settings copied into a live device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSettings {
    /// Minimum spacing between dispatched commands (ms).
    pub min_cmd_interval_ms: f64,
    /// Firmware queue depth ceiling; 0 disables the gate.
    pub fifo_limit: usize,
    /// Settle delay after raising the pen (ms).
    pub pen_up_delay_ms: u32,
    /// Settle delay after lowering the pen (ms).
    pub pen_down_delay_ms: u32,
    /// Servo position with the pen raised (%).
    pub pen_up_pos: Option<u8>,
    /// Servo position with the pen lowered (%).
    pub pen_down_pos: Option<u8>,
    /// Raise speed (%/s).
    pub pen_up_speed: Option<u32>,
    /// Lower speed (%/s).
    pub pen_down_speed: Option<u32>,
    /// Servo auto power-off timeout (s).
    pub servo_timeout_s: Option<u32>,
    /// Nominal travel speed (mm/s); 0 when unknown.
    pub speed_mm_s: f64,
    /// Nominal acceleration (mm/s²); 0 when unknown.
    pub accel_mm_s2: f64,
    /// Linear distance to motor steps conversion; 0 when unknown.
    pub steps_per_mm: f64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            min_cmd_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            fifo_limit: DEFAULT_FIFO_LIMIT,
            pen_up_delay_ms: 0,
            pen_down_delay_ms: 0,
            pen_up_pos: None,
            pen_down_pos: None,
            pen_up_speed: None,
            pen_down_speed: None,
            servo_timeout_s: None,
            speed_mm_s: 0.0,
            accel_mm_s2: 0.0,
            steps_per_mm: 0.0,
        }
    }
}

impl DeviceSettings {
    /// Merge the user configuration with a hardware profile.
    ///
    /// Speed and acceleration come from the configuration override when
    /// present, otherwise from the profile. Steps-per-mm always comes from
    /// the profile.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` when the resulting
    /// steps-per-mm is not strictly positive.
    pub fn from_config(
        config: &DeviceConfig,
        profile: &DeviceProfile,
    ) -> Result<Self, ConfigError> {
        let settings = Self {
            min_cmd_interval_ms: config.min_cmd_interval_ms,
            fifo_limit: config.fifo_limit,
            pen_up_delay_ms: config.pen_up_delay_ms,
            pen_down_delay_ms: config.pen_down_delay_ms,
            pen_up_pos: Some(config.pen_up_pos),
            pen_down_pos: Some(config.pen_down_pos),
            pen_up_speed: Some(config.pen_up_speed),
            pen_down_speed: Some(config.pen_down_speed),
            servo_timeout_s: Some(config.servo_timeout_s),
            speed_mm_s: config.speed_mm_s.unwrap_or(profile.speed_mm_s),
            accel_mm_s2: config.accel_mm_s2.unwrap_or(profile.accel_mm_s2),
            steps_per_mm: profile.steps_per_mm,
        };
        settings.validate_steps_per_mm(profile.model_id)?;
        debug!(
            "Settings for '{}': speed={:.1} accel={:.1} steps/mm={:.2}",
            profile.model_id, settings.speed_mm_s, settings.accel_mm_s2, settings.steps_per_mm
        );
        Ok(settings)
    }

    /// Factory settings for a profile, without any user configuration.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceSettings::from_config`].
    pub fn for_profile(profile: &DeviceProfile) -> Result<Self, ConfigError> {
        Self::from_config(&DeviceConfig::default(), profile)
    }

    /// Steps-per-mm when it is usable.
    pub fn steps_per_mm(&self) -> Option<f64> {
        (self.steps_per_mm > 0.0 && self.steps_per_mm.is_finite()).then_some(self.steps_per_mm)
    }

    fn validate_steps_per_mm(&self, model: &str) -> Result<(), ConfigError> {
        if self.steps_per_mm().is_none() {
            return Err(ConfigError::ValidationError(format!(
                "profile '{model}' has invalid steps_per_mm {}",
                self.steps_per_mm
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{find_profile, profile_for_model};

    #[test]
    fn defaults_leave_servo_fields_unset() {
        let s = DeviceSettings::default();
        assert_eq!(s.fifo_limit, 3);
        assert_eq!(s.min_cmd_interval_ms, 5.0);
        assert!(s.pen_up_pos.is_none());
        assert!(s.servo_timeout_s.is_none());
        assert!(s.steps_per_mm().is_none());
    }

    #[test]
    fn profile_values_fill_unset_overrides() {
        let profile = find_profile("axidraw_v3").unwrap();
        let s = DeviceSettings::for_profile(profile).unwrap();
        assert_eq!(s.speed_mm_s, 381.0);
        assert_eq!(s.accel_mm_s2, 250.0);
        assert_eq!(s.steps_per_mm(), Some(80.0));
        assert_eq!(s.pen_up_pos, Some(60));
        assert_eq!(s.pen_down_speed, Some(150));
        assert_eq!(s.servo_timeout_s, Some(60));
    }

    #[test]
    fn overrides_win_over_profile() {
        let config = DeviceConfig {
            speed_mm_s: Some(100.0),
            accel_mm_s2: Some(900.0),
            ..DeviceConfig::default()
        };
        let s = DeviceSettings::from_config(&config, profile_for_model(None)).unwrap();
        assert_eq!(s.speed_mm_s, 100.0);
        assert_eq!(s.accel_mm_s2, 900.0);
    }

    #[test]
    fn non_positive_steps_per_mm_is_rejected() {
        let broken = DeviceProfile {
            model_id: "broken",
            paper_w_mm: 10.0,
            paper_h_mm: 10.0,
            speed_mm_s: 10.0,
            accel_mm_s2: 10.0,
            steps_per_mm: 0.0,
        };
        let err = DeviceSettings::for_profile(&broken).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("broken")));
    }
}
