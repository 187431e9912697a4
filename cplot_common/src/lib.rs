//! cplot Common Library
//!
//! Shared constants, device profiles, configuration loading and the
//! hardware contracts used by every cplot workspace crate.
//!
//! # Module Structure
//!
//! - [`consts`] - Firmware limits, device defaults and paths
//! - [`config`] - TOML configuration loading traits and types
//! - [`profile`] - Static hardware profile table
//! - [`settings`] - Live device settings derived from profile + config
//! - [`hal`] - `MotionDevice` trait, `PhaseMove` and the `DeviceError` taxonomy
//! - [`prelude`] - Common re-exports for convenience

#![deny(missing_docs)]

pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
pub mod profile;
pub mod settings;
