//! # cplot
//!
//! Command-line front end for AxiDraw-class plotters. Wires the
//! configuration, motion and hardware crates together.
//!
//! # Module Structure
//!
//! - [`cli`] - clap argument model
//! - [`context`] - Configuration, profile and settings resolved for one run
//! - [`logging`] - tracing subscriber setup
//! - [`actions`] - `cplot device <action>` handlers
//! - [`paths`] - TOML path file loader
//! - [`plot`] - Plan and plot orchestration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          cplot                           │
//! │  ┌──────────┐   ┌───────────┐   ┌─────────────────────┐  │
//! │  │  Args    │──►│  Context  │──►│ actions / plot      │  │
//! │  └──────────┘   └───────────┘   └──────────┬──────────┘  │
//! └────────────────────────────────────────────┼─────────────┘
//!                     ┌────────────────────────┼──────────┐
//!                     ▼                        ▼          ▼
//!             cplot_motion::Planner   Stepper   cplot_hal::DeviceSession
//! ```

#![deny(missing_docs)]

pub mod actions;
pub mod cli;
pub mod context;
pub mod logging;
pub mod paths;
pub mod plot;

use cplot_common::config::ConfigError;
use cplot_common::hal::error::DeviceError;
use cplot_motion::{PlannerError, StepperError};
use std::path::PathBuf;
use thiserror::Error;

// Re-export key types for convenience
pub use crate::actions::{DeviceAction, run_device_action};
pub use crate::cli::{Args, Command};
pub use crate::context::Context;
pub use crate::paths::PathFile;
pub use crate::plot::{PlotSummary, plan_file, plot_blocks, write_plan};

/// Failures surfaced by the command-line front end.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or resolved.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An explicit `--config` path does not exist.
    #[error("Configuration file {0} does not exist")]
    ConfigMissing(PathBuf),

    /// Device or protocol failure.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Planner rejected its limits.
    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),

    /// Stepper failure while plotting.
    #[error("Stepper error: {0}")]
    Stepper(#[from] StepperError),

    /// Path file could not be read.
    #[error("Path file {path}: {reason}")]
    PathFile {
        /// File given on the command line.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The path file contains no drawable geometry.
    #[error("Nothing to plot")]
    NothingToPlot,

    /// Plot interrupted by the user.
    #[error("Plot aborted after {completed} of {total} blocks")]
    Aborted {
        /// Blocks fully submitted.
        completed: usize,
        /// Blocks planned.
        total: usize,
    },

    /// JSON output failed.
    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing user output failed.
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}
