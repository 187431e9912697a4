//! Simulated EBB controller.
//!
//! [`SimulatedEbb`] implements [`Transport`] on top of an in-process
//! [`Firmware`] model, so the codec and device manager run unchanged
//! without hardware. A cloned [`SimHandle`] stays with the caller to
//! inspect the wire journal and the firmware state after the transport has
//! been handed to a device.
//!
//! Selected by the port name [`SIM_PORT`].

pub mod firmware;

pub use firmware::{Firmware, FirmwareState, SIM_VERSION};

use crate::transport::Transport;
use cplot_common::hal::error::DeviceResult;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Port name that selects the simulated controller.
pub const SIM_PORT: &str = "sim";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Caller-side view of a simulated controller.
#[derive(Debug, Clone)]
pub struct SimHandle {
    firmware: Arc<Mutex<Firmware>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl SimHandle {
    /// Every line written by the host, in order.
    pub fn journal(&self) -> Vec<String> {
        lock(&self.journal).clone()
    }

    /// Journal entries whose command code is `code`.
    pub fn sent(&self, code: &str) -> Vec<String> {
        lock(&self.journal)
            .iter()
            .filter(|l| l.split(',').next() == Some(code))
            .cloned()
            .collect()
    }

    /// Forget the journal.
    pub fn clear_journal(&self) {
        lock(&self.journal).clear();
    }

    /// Snapshot of the firmware state.
    pub fn state(&self) -> FirmwareState {
        lock(&self.firmware).state().clone()
    }

    /// See [`Firmware::pin_fifo`].
    pub fn pin_fifo(&self, pending: u32) {
        lock(&self.firmware).pin_fifo(pending);
    }

    /// See [`Firmware::override_reply`].
    pub fn override_reply(&self, prefix: &str, reply: &[&str]) {
        let reply = reply.iter().map(|s| s.to_string()).collect();
        lock(&self.firmware).override_reply(prefix, reply);
    }
}

/// Transport backed by the firmware model.
#[derive(Debug)]
pub struct SimulatedEbb {
    handle: SimHandle,
    outbox: VecDeque<String>,
}

impl SimulatedEbb {
    /// Fresh controller.
    pub fn new() -> Self {
        Self {
            handle: SimHandle {
                firmware: Arc::new(Mutex::new(Firmware::new())),
                journal: Arc::new(Mutex::new(Vec::new())),
            },
            outbox: VecDeque::new(),
        }
    }

    /// Controller whose queue-status query always reports `pending`.
    pub fn with_stuck_fifo(pending: u32) -> Self {
        let sim = Self::new();
        sim.handle.pin_fifo(pending);
        sim
    }

    /// Lines waiting to be read before the first command, as left over by
    /// a previous session.
    pub fn with_stale_input(mut self, lines: &[&str]) -> Self {
        self.outbox.extend(lines.iter().map(|s| s.to_string()));
        self
    }

    /// Caller-side handle sharing this controller.
    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }
}

impl Default for SimulatedEbb {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedEbb {
    fn write_line(&mut self, line: &str) -> DeviceResult<()> {
        lock(&self.handle.journal).push(line.to_string());
        let reply = lock(&self.handle.firmware).handle(line);
        self.outbox.extend(reply);
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> DeviceResult<Option<String>> {
        Ok(self.outbox.pop_front())
    }

    fn flush_input(&mut self) -> DeviceResult<usize> {
        let dropped = self.outbox.iter().map(|l| l.len() + 2).sum();
        self.outbox.clear();
        Ok(dropped)
    }

    fn describe(&self) -> String {
        SIM_PORT.to_string()
    }
}
