//! POSIX serial transport.
//!
//! The port is opened non-blocking in raw mode with flow control disabled;
//! every wait is a `poll(2)` with an explicit timeout. Paths that are not
//! terminals (files, pipes) skip line discipline setup, which keeps the
//! byte-level paths testable without hardware.

use crate::transport::Transport;
use cplot_common::hal::error::{DeviceError, DeviceResult};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::termios::{
    self, BaudRate, ControlFlags, InputFlags, SetArg, SpecialCharacterIndices,
};
use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Read timeout used when the caller passes zero.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Write timeout for a line payload.
const LINE_WRITE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Write timeout for the CR terminator.
const TERMINATOR_WRITE_TIMEOUT: Duration = Duration::from_millis(200);

/// Poll slice of `read_line`.
const READ_SLICE: Duration = Duration::from_millis(20);

/// Grace window of `flush_input`.
const FLUSH_GRACE: Duration = Duration::from_millis(10);

/// Longest line kept by `read_line`; extra bytes are dropped.
const MAX_LINE_LEN: usize = 127;

/// Map a numeric baud rate to a termios speed. Unknown rates use 115200.
pub fn baud_rate(baud: u32) -> BaudRate {
    match baud {
        9_600 => BaudRate::B9600,
        19_200 => BaudRate::B19200,
        38_400 => BaudRate::B38400,
        57_600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        460_800 => BaudRate::B460800,
        _ => BaudRate::B115200,
    }
}

fn poll_timeout(timeout: Duration) -> PollTimeout {
    let ms = timeout.as_millis().min(u128::from(u16::MAX)) as u16;
    PollTimeout::from(ms)
}

/// Open serial port.
#[derive(Debug)]
pub struct SerialPort {
    file: File,
    path: String,
    read_timeout: Duration,
}

impl SerialPort {
    /// Open `path` at `baud`. `read_timeout` of zero selects one second.
    pub fn open(path: &str, baud: u32, read_timeout: Duration) -> DeviceResult<Self> {
        if path.is_empty() {
            return Err(DeviceError::PortNotSpecified);
        }
        let open_err = |source: io::Error| DeviceError::Open {
            path: path.to_string(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
            .open(path)
            .map_err(open_err)?;

        if file.is_terminal() {
            configure_raw(&file, baud).map_err(|e| open_err(io::Error::from(e)))?;
        } else {
            debug!("Serial: {path} is not a terminal, line setup skipped");
        }

        let read_timeout = if read_timeout.is_zero() {
            DEFAULT_READ_TIMEOUT
        } else {
            read_timeout
        };
        info!(
            "Serial: opened {path} @{baud} baud, timeout={}ms",
            read_timeout.as_millis()
        );
        Ok(Self {
            file,
            path: path.to_string(),
            read_timeout,
        })
    }

    /// Path the port was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Write all of `data`, waiting at most `timeout` for each poll.
    ///
    /// Returns the number of bytes written, which is short when the port
    /// stays unwritable past the timeout.
    pub fn write(&mut self, data: &[u8], timeout: Duration) -> io::Result<usize> {
        let timeout = if timeout.is_zero() {
            LINE_WRITE_TIMEOUT
        } else {
            timeout
        };
        let mut written = 0;
        while written < data.len() {
            let ready = {
                let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLOUT)];
                match poll(&mut fds, poll_timeout(timeout)) {
                    Ok(n) => n,
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(e.into()),
                }
            };
            if ready == 0 {
                return Ok(written);
            }
            match self.file.write(&data[written..]) {
                Ok(n) => written += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    /// Wait up to `timeout` for input and perform a single read.
    ///
    /// Returns 0 on timeout or end of file.
    pub fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let timeout = if timeout.is_zero() {
            self.read_timeout
        } else {
            timeout
        };
        loop {
            let ready = {
                let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
                match poll(&mut fds, poll_timeout(timeout)) {
                    Ok(n) => n,
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(e.into()),
                }
            };
            if ready == 0 {
                return Ok(0);
            }
            match self.file.read(buf) {
                Ok(n) => return Ok(n),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Discard pending input until nothing arrives within a short grace
    /// window. Returns the number of bytes dropped.
    pub fn drain_input(&mut self) -> io::Result<usize> {
        let mut scratch = [0u8; 256];
        let mut total = 0;
        loop {
            match self.file.read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => {
                    total += n;
                    if n < scratch.len() {
                        break;
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
                    match poll(&mut fds, poll_timeout(FLUSH_GRACE)) {
                        Ok(n) if n > 0 => continue,
                        _ => break,
                    }
                }
                Err(e) => return Err(e),
            }
        }
        if total > 0 {
            trace!("Serial: flushed {total} stale bytes");
        }
        Ok(total)
    }

    /// Accumulate bytes until CR or LF. Empty lines are skipped.
    ///
    /// Returns `None` when no complete line arrives within `timeout`.
    pub fn read_text_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.read(&mut byte, READ_SLICE)?;
            if n == 0 {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                continue;
            }
            match byte[0] {
                b'\r' | b'\n' if line.is_empty() => {}
                b'\r' | b'\n' => return Ok(Some(String::from_utf8_lossy(&line).into_owned())),
                b if line.len() < MAX_LINE_LEN => line.push(b),
                _ => {}
            }
        }
    }
}

fn configure_raw(file: &File, baud: u32) -> nix::Result<()> {
    let mut tio = termios::tcgetattr(file)?;
    termios::cfmakeraw(&mut tio);
    tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    tio.control_flags &= !ControlFlags::CRTSCTS;
    tio.input_flags &= !(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);
    termios::cfsetspeed(&mut tio, baud_rate(baud))?;
    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    termios::tcsetattr(file, SetArg::TCSANOW, &tio)
}

impl Transport for SerialPort {
    fn write_line(&mut self, line: &str) -> DeviceResult<()> {
        let payload = self.write(line.as_bytes(), LINE_WRITE_TIMEOUT)?;
        if payload < line.len() {
            return Err(DeviceError::Timeout {
                what: "serial write",
                waited_ms: LINE_WRITE_TIMEOUT.as_millis() as u64,
            });
        }
        if self.write(b"\r", TERMINATOR_WRITE_TIMEOUT)? < 1 {
            return Err(DeviceError::Timeout {
                what: "serial write",
                waited_ms: TERMINATOR_WRITE_TIMEOUT.as_millis() as u64,
            });
        }
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> DeviceResult<Option<String>> {
        Ok(self.read_text_line(timeout)?)
    }

    fn flush_input(&mut self) -> DeviceResult<usize> {
        Ok(self.drain_input()?)
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        debug!("Serial: closed {}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_baud_falls_back() {
        assert_eq!(baud_rate(9_600), BaudRate::B9600);
        assert_eq!(baud_rate(115_200), BaudRate::B115200);
        assert_eq!(baud_rate(12_345), BaudRate::B115200);
        assert_eq!(baud_rate(0), BaudRate::B115200);
    }

    #[test]
    fn poll_timeout_saturates() {
        assert_eq!(poll_timeout(Duration::from_secs(3600)), PollTimeout::from(u16::MAX));
        assert_eq!(poll_timeout(Duration::from_millis(20)), PollTimeout::from(20u16));
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(matches!(
            SerialPort::open("", 9600, Duration::ZERO),
            Err(DeviceError::PortNotSpecified)
        ));
    }

    #[test]
    fn missing_device_is_open_error() {
        let err = SerialPort::open("/nonexistent/ttyACM9", 9600, Duration::ZERO).unwrap_err();
        assert!(matches!(err, DeviceError::Open { ref path, .. } if path == "/nonexistent/ttyACM9"));
    }
}
