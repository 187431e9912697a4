//! cplot motion layer.
//!
//! Pure numerical half of the plotting pipeline: geometry in, planned
//! blocks and timed phases out. Hardware is reached only through the
//! [`MotionDevice`](cplot_common::hal::driver::MotionDevice) trait.
//!
//! # Module Structure
//!
//! - [`geometry`] - Points, segments and polyline flattening
//! - [`planner`] - Look-ahead planner with trapezoidal profiles
//! - [`stepper`] - Block → phase decomposition and dispatch

#![deny(missing_docs)]

pub mod geometry;
pub mod planner;
pub mod stepper;

pub use geometry::{Point2, Polyline, Segment, segments_from_polylines};
pub use planner::{PlanBlock, Planner, PlannerError, PlannerLimits, plan};
pub use stepper::{Stepper, StepperError};
