//! Per-run context: configuration merged with command-line overrides.

use crate::CliError;
use cplot_common::config::{PlotterConfig, default_config_path};
use cplot_common::profile::{DeviceProfile, profile_for_model};
use cplot_common::settings::DeviceSettings;
use cplot_hal::session::SessionOptions;
use cplot_motion::PlannerLimits;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Load the configuration file.
///
/// An explicit path must exist. Without one, the default location is used
/// and a missing or broken file falls back to factory defaults.
///
/// # Errors
/// `CliError::ConfigMissing` when `explicit` names a missing file.
pub fn load_config(explicit: Option<&Path>) -> Result<PlotterConfig, CliError> {
    let path = match explicit {
        Some(path) if !path.exists() => return Err(CliError::ConfigMissing(path.to_path_buf())),
        Some(path) => path.to_path_buf(),
        None => default_config_path(),
    };
    Ok(PlotterConfig::load_or_default(&path))
}

/// Everything a command needs to reach the device and the planner.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded configuration.
    pub config: PlotterConfig,
    /// Resolved hardware profile.
    pub profile: &'static DeviceProfile,
    /// Settings pushed to the device.
    pub settings: DeviceSettings,
    /// Port override, then configured port; `None` auto-detects.
    pub port: Option<String>,
    /// Lock file override; `None` uses the machine-wide lock.
    pub lock_path: Option<PathBuf>,
    /// Print command results as JSON.
    pub json: bool,
}

impl Context {
    /// Merge `config` with command-line overrides.
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded configuration
    /// * `port` - `--port`, wins over `device.port`
    /// * `model` - `--model`, wins over `device.model`
    ///
    /// # Errors
    /// Configuration validation errors from the settings merge.
    pub fn resolve(
        config: PlotterConfig,
        port: Option<&str>,
        model: Option<&str>,
    ) -> Result<Self, CliError> {
        let model = model.or(config.device.model.as_deref());
        let profile = profile_for_model(model);
        let settings = DeviceSettings::from_config(&config.device, profile)?;
        let port = port
            .map(str::to_string)
            .or_else(|| config.device.port.clone())
            .filter(|p| !p.is_empty());
        info!(
            "Model '{}', port {}",
            profile.model_id,
            port.as_deref().unwrap_or("auto")
        );
        Ok(Self {
            config,
            profile,
            settings,
            port,
            lock_path: None,
            json: false,
        })
    }

    /// Session options for the device commands.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            lock_path: self.lock_path.clone(),
            ..SessionOptions::new(self.port.clone(), self.settings.clone())
        }
    }

    /// Planner limits from the settings and the `[planner]` section.
    pub fn planner_limits(&self) -> PlannerLimits {
        let limits = PlannerLimits::for_profile(
            self.settings.speed_mm_s,
            self.settings.accel_mm_s2,
            self.config.planner.cornering_distance_mm,
            self.config.planner.min_segment_mm,
        );
        debug!("Planner limits: {limits:?}");
        limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cplot_common::config::ConfigLoader;

    #[test]
    fn command_line_wins_over_config() {
        let config = PlotterConfig::from_toml(
            "[device]\nmodel = \"minikit2\"\nport = \"/dev/ttyACM3\"\n",
        )
        .unwrap();
        let ctx = Context::resolve(config, Some("sim"), Some("AxiDraw_V3")).unwrap();
        assert_eq!(ctx.port.as_deref(), Some("sim"));
        assert_eq!(ctx.profile.model_id, "axidraw_v3");
        assert_eq!(ctx.settings.speed_mm_s, 381.0);
    }

    #[test]
    fn config_supplies_port_and_overrides() {
        let config = PlotterConfig::from_toml(
            "[device]\nport = \"/dev/ttyACM3\"\nspeed_mm_s = 100.0\n\n[planner]\ncornering_distance_mm = 0.2\n",
        )
        .unwrap();
        let ctx = Context::resolve(config, None, None).unwrap();
        assert_eq!(ctx.port.as_deref(), Some("/dev/ttyACM3"));
        let limits = ctx.planner_limits();
        assert_eq!(limits.max_speed, 100.0);
        assert_eq!(limits.max_accel, 200.0);
        assert_eq!(limits.cornering_distance, 0.2);
        assert_eq!(limits.min_segment_length, 0.1);
    }

    #[test]
    fn empty_port_means_auto_detect() {
        let ctx = Context::resolve(PlotterConfig::default(), Some(""), None).unwrap();
        assert_eq!(ctx.port, None);
        assert_eq!(ctx.session_options().port, None);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/cplot.toml"))).unwrap_err();
        assert!(matches!(err, CliError::ConfigMissing(_)));
    }

    #[test]
    fn broken_config_falls_back_to_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "log_level = [").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config, PlotterConfig::default());
    }
}
