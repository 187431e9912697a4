//! Transport implementations.
//!
//! - [`serial`] - POSIX serial port (termios + poll)
//! - [`simulation`] - In-process EBB firmware model
//! - [`ports`] - Serial port discovery
//!
//! # Adding New Transports
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the [`Transport`] trait
//! 3. Route a port name to it in [`open_transport`]

pub mod ports;
pub mod serial;
pub mod simulation;

use crate::transport::Transport;
use cplot_common::hal::error::DeviceResult;
use std::time::Duration;
use tracing::info;

/// Open the transport behind `port`.
///
/// [`simulation::SIM_PORT`] selects the simulated controller; anything else
/// is a serial device path.
pub fn open_transport(port: &str, baud: u32, timeout: Duration) -> DeviceResult<Box<dyn Transport>> {
    if port == simulation::SIM_PORT {
        info!("Using simulated EBB controller");
        return Ok(Box::new(simulation::SimulatedEbb::new()));
    }
    Ok(Box::new(serial::SerialPort::open(port, baud, timeout)?))
}
