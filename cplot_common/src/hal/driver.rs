//! Device trait consumed by the motion layer.
//!
//! The stepper only needs three things from hardware: the steps-per-mm
//! conversion, whether a live connection exists, and a primitive that
//! dispatches one timed phase. Keeping that behind a trait lets the motion
//! crate stay free of transports and lets tests record phases in memory.

use crate::hal::error::DeviceResult;
use crate::hal::types::PhaseMove;

/// Trait defining what the stepper needs from a plotter.
///
/// # Contract
///
/// - `steps_per_mm()` returns `None` when no usable conversion is configured
/// - `move_phase()` is queue- and rate-gated by the implementation and fails
///   with a `DeviceError` on I/O, protocol or timeout errors
pub trait MotionDevice {
    /// Linear distance to motor steps conversion of the active profile.
    fn steps_per_mm(&self) -> Option<f64>;

    /// True while a transport is open and probed.
    fn is_connected(&self) -> bool;

    /// Dispatch one phase as a low-level move.
    fn move_phase(&mut self, phase: &PhaseMove) -> DeviceResult<()>;
}
