//! Scoped device access.
//!
//! A [`DeviceSession`] holds the advisory lock and a connected [`Device`]
//! for its lifetime. Dropping it disconnects first and releases the lock
//! second, on every exit path.

use crate::device::lock::{DeviceLock, default_lock_path};
use crate::device::Device;
use cplot_common::consts::{
    DEFAULT_BAUD, DEFAULT_TIMEOUT_MS, IDLE_WAIT_ATTEMPTS, IDLE_WAIT_PAUSE_MS,
};
use cplot_common::hal::error::DeviceResult;
use cplot_common::settings::DeviceSettings;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// How to open a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Port path; `None` or empty means auto-detect.
    pub port: Option<String>,
    /// Settings applied before connecting.
    pub settings: DeviceSettings,
    /// Serial baud.
    pub baud: u32,
    /// Per-command timeout (ms).
    pub timeout_ms: u64,
    /// Lock file; `None` uses the machine-wide default.
    pub lock_path: Option<PathBuf>,
}

impl SessionOptions {
    /// Options for `settings` on `port` with default baud and timeout.
    pub fn new(port: Option<String>, settings: DeviceSettings) -> Self {
        Self {
            port,
            settings,
            baud: DEFAULT_BAUD,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            lock_path: None,
        }
    }
}

/// Locked, connected device.
pub struct DeviceSession {
    device: Device,
    _lock: DeviceLock,
}

impl DeviceSession {
    /// Lock, configure and connect.
    ///
    /// # Errors
    /// `Busy` when another process holds the device; otherwise any
    /// configuration or connection failure. The lock is released before
    /// returning an error.
    pub fn open(options: &SessionOptions) -> DeviceResult<Self> {
        let lock_path = options.lock_path.clone().unwrap_or_else(default_lock_path);
        let lock = DeviceLock::acquire_at(&lock_path)?;

        let mut device = Device::new();
        device.apply_settings(options.settings.clone());
        device.config(
            Some(options.port.as_deref().unwrap_or_default()),
            options.baud,
            options.timeout_ms,
            options.settings.min_cmd_interval_ms,
        )?;
        device.connect()?;
        Ok(Self {
            device,
            _lock: lock,
        })
    }

    /// The connected device.
    pub fn device(&mut self) -> &mut Device {
        &mut self.device
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("port", &self.device.port())
            .field("state", &self.device.state())
            .field("lock", &self._lock)
            .finish()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        debug!("Closing device session");
        self.device.disconnect();
    }
}

/// Run `action` inside a session.
///
/// With `wait_idle`, the device is polled until idle (200 × 20 ms) after a
/// successful action; an idle timeout is logged and does not fail the call.
pub fn with_device<T, F>(options: &SessionOptions, wait_idle: bool, action: F) -> DeviceResult<T>
where
    F: FnOnce(&mut Device) -> DeviceResult<T>,
{
    let mut session = DeviceSession::open(options)?;
    let value = action(session.device())?;
    if wait_idle
        && let Err(e) = session.device().wait_for_idle(
            IDLE_WAIT_ATTEMPTS,
            Duration::from_millis(IDLE_WAIT_PAUSE_MS),
        )
    {
        warn!("Device did not become idle: {e}");
    }
    Ok(value)
}
