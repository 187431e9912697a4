//! Hardware-facing contracts shared by the motion and device layers.
//!
//! - [`error`] - `DeviceError` taxonomy and `DeviceResult`
//! - [`driver`] - `MotionDevice` trait consumed by the stepper
//! - [`types`] - Records exchanged across that trait

pub mod driver;
pub mod error;
pub mod types;
