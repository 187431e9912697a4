//! # cplot HAL
//!
//! Everything between the motion layer and the EBB controller: byte
//! transports, the EBB wire codec, and the device manager that paces
//! commands into the firmware queue.
//!
//! The device manager implements `MotionDevice` from
//! `cplot_common::hal::driver`, which is all the stepper sees.
//!
//! # Module Structure
//!
//! - [`transport`] - Line-oriented `Transport` trait
//! - [`drivers`] - Serial port, simulated firmware, port discovery
//! - [`ebb`] - Command encoding, response framing, typed queries
//! - [`device`] - `Device` state machine, pacing gates, servo mapping, lock
//! - [`session`] - Lock + connect scope with guaranteed release
//! - [`clock`] - Monotonic clock abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        cplot_hal                           │
//! │  ┌──────────────┐    ┌────────────┐    ┌────────────────┐  │
//! │  │ DeviceSession│───►│   Device   │───►│    EbbLink     │  │
//! │  │ (lock guard) │    │ (gates)    │    │ (codec)        │  │
//! │  └──────────────┘    └─────┬──────┘    └───────┬────────┘  │
//! │                            │ Clock             │           │
//! │                            ▼                   ▼           │
//! │                    ┌─────────────┐    ┌────────────────┐   │
//! │                    │ Pacer       │    │ Transport      │   │
//! │                    └─────────────┘    │ serial | sim   │   │
//! │                                       └────────────────┘   │
//! └────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod clock;
pub mod device;
pub mod drivers;
pub mod ebb;
pub mod session;
pub mod transport;

// Re-export key types for convenience
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::device::{Device, DeviceLock, DeviceState};
pub use crate::drivers::simulation::{SIM_PORT, SimHandle, SimulatedEbb};
pub use crate::ebb::{MotionStatus, StatusSnapshot};
pub use crate::session::{DeviceSession, SessionOptions, with_device};
pub use crate::transport::Transport;
