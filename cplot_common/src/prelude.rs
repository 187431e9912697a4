//! Prelude module for common re-exports.
//!
//! ```rust
//! use cplot_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, PlotterConfig};

// ─── Hardware ───────────────────────────────────────────────────────
pub use crate::hal::driver::MotionDevice;
pub use crate::hal::error::{DeviceError, DeviceResult, ErrorKind};
pub use crate::hal::types::{MotorMode, PhaseMove};
pub use crate::profile::{DeviceProfile, profile_for_model};
pub use crate::settings::DeviceSettings;
