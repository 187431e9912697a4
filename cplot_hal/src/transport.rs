//! Line-oriented byte transport beneath the EBB codec.
//!
//! Implemented by the serial port and by the simulated firmware. No
//! protocol knowledge lives here: a transport moves CR-terminated lines.

use cplot_common::hal::error::DeviceResult;
use std::time::Duration;

/// Byte pipe to an EBB controller.
///
/// # Contract
///
/// - `write_line()` appends the CR terminator itself
/// - `read_line()` returns `Ok(None)` on timeout, never an empty line
/// - `flush_input()` discards anything already buffered for reading
pub trait Transport: Send {
    /// Write `line` followed by CR.
    fn write_line(&mut self, line: &str) -> DeviceResult<()>;

    /// Read one line, without its terminator, waiting at most `timeout`.
    fn read_line(&mut self, timeout: Duration) -> DeviceResult<Option<String>>;

    /// Drop stale input. Returns the number of bytes discarded.
    fn flush_input(&mut self) -> DeviceResult<usize>;

    /// Human-readable endpoint name for logs.
    fn describe(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_line(&mut self, line: &str) -> DeviceResult<()> {
        (**self).write_line(line)
    }

    fn read_line(&mut self, timeout: Duration) -> DeviceResult<Option<String>> {
        (**self).read_line(timeout)
    }

    fn flush_input(&mut self) -> DeviceResult<usize> {
        (**self).flush_input()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
