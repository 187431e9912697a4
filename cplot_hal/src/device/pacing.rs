//! Command pacing gates.
//!
//! Two independent gates run before every gated dispatch:
//!
//! - queue depth: with a FIFO limit set, block until the firmware reports
//!   fewer pending commands than the limit, polling every 5 ms and giving
//!   up after the command timeout
//! - rate: keep at least the minimum interval between two dispatches
//!
//! All waiting goes through a [`Clock`].

use crate::clock::Clock;
use crate::ebb::MotionStatus;
use cplot_common::consts::QUEUE_POLL_MS;
use cplot_common::hal::error::{DeviceError, DeviceResult};
use std::time::Duration;
use tracing::{debug, error};

/// Gate state of one connected session.
#[derive(Debug, Clone, Default)]
pub struct Pacer {
    fifo_limit: usize,
    min_interval: Duration,
    last_dispatch: Option<Duration>,
    in_flight: usize,
}

impl Pacer {
    /// Gates with the given limits.
    pub fn new(fifo_limit: usize, min_interval_ms: f64) -> Self {
        let mut pacer = Self::default();
        pacer.set_limits(fifo_limit, min_interval_ms);
        pacer
    }

    /// Change both limits; negative or non-finite intervals disable the rate gate.
    pub fn set_limits(&mut self, fifo_limit: usize, min_interval_ms: f64) {
        self.fifo_limit = fifo_limit;
        self.min_interval = if min_interval_ms.is_finite() && min_interval_ms > 0.0 {
            Duration::from_secs_f64(min_interval_ms / 1000.0)
        } else {
            Duration::ZERO
        };
        match fifo_limit {
            0 => debug!("FIFO gate disabled"),
            n => debug!("FIFO gate limit {n}"),
        }
        debug!("Minimum command interval {:?}", self.min_interval);
    }

    /// Forget dispatch history.
    pub fn reset(&mut self) {
        self.last_dispatch = None;
        self.in_flight = 0;
    }

    /// Commands believed to be queued or executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Configured FIFO limit (0 = gate disabled).
    pub fn fifo_limit(&self) -> usize {
        self.fifo_limit
    }

    /// Replace the local estimate with the firmware's count.
    pub fn refresh(&mut self, status: &MotionStatus) {
        self.in_flight = status.pending() as usize;
        debug!(
            "Queue: active={} fifo={} (total {})",
            u8::from(status.command_active),
            status.fifo_pending,
            self.in_flight
        );
    }

    /// Record a successful dispatch at `now`.
    pub fn mark_dispatched(&mut self, now: Duration) {
        self.last_dispatch = Some(now);
        self.in_flight = self.in_flight.saturating_add(1);
    }

    fn has_room(&self) -> bool {
        self.fifo_limit == 0 || self.in_flight < self.fifo_limit
    }

    /// Block until the firmware queue has room.
    ///
    /// `poll` issues one queue-status query. The local estimate is trusted
    /// while it is below the limit; otherwise the firmware is polled every
    /// 5 ms until it reports room or `timeout` has elapsed.
    ///
    /// # Errors
    ///
    /// `DeviceError::Timeout` when the queue never drains, or whatever
    /// `poll` returns.
    pub fn wait_queue_slot<C, F>(&mut self, clock: &C, timeout: Duration, mut poll: F) -> DeviceResult<()>
    where
        C: Clock + ?Sized,
        F: FnMut() -> DeviceResult<MotionStatus>,
    {
        if self.has_room() {
            return Ok(());
        }
        debug!("Queue full ({}/{}), polling", self.in_flight, self.fifo_limit);
        self.refresh(&poll()?);
        if self.has_room() {
            return Ok(());
        }

        let start = clock.now();
        let step = Duration::from_millis(QUEUE_POLL_MS);
        loop {
            clock.sleep(step);
            self.refresh(&poll()?);
            if self.has_room() {
                debug!("Queue slot free ({}/{})", self.in_flight, self.fifo_limit);
                return Ok(());
            }
            let waited = clock.now().saturating_sub(start);
            if waited >= timeout {
                error!("Queue did not drain within {} ms", timeout.as_millis());
                return Err(DeviceError::Timeout {
                    what: "firmware queue slot",
                    waited_ms: waited.as_millis() as u64,
                });
            }
        }
    }

    /// Sleep until the minimum interval since the last dispatch has passed.
    pub fn wait_interval<C: Clock + ?Sized>(&self, clock: &C) {
        let Some(last) = self.last_dispatch else {
            return;
        };
        if self.min_interval.is_zero() {
            return;
        }
        let elapsed = clock.now().saturating_sub(last);
        if let Some(remaining) = self.min_interval.checked_sub(elapsed)
            && !remaining.is_zero()
        {
            debug!("Rate gate: waiting {:.2} ms", remaining.as_secs_f64() * 1000.0);
            clock.sleep(remaining);
        }
    }
}
