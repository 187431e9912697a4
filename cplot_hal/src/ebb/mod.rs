//! EBB protocol codec.
//!
//! Formats commands, writes them CR-terminated and frames the replies:
//! lines are read until `OK` (success) or a line starting with `ERR` or `!`
//! (failure), for at most [`RetryPolicy::max_attempts`] lines. Queries
//! capture their first data line.
//!
//! # Module Structure
//!
//! - [`command`] - `EbbCommand`, argument validation and encoding
//! - [`response`] - Strict payload parsers and the status records
//! - [`lowlevel`] - Phase to `LM` conversion

pub mod command;
pub mod lowlevel;
pub mod response;

pub use command::{ClearFlags, EbbCommand, ResponseShape};
pub use lowlevel::LowLevelMove;
pub use response::{MotionStatus, StatusSnapshot};

use crate::transport::Transport;
use cplot_common::consts::{DEFAULT_TIMEOUT_MS, EBB_MAX_READ_ATTEMPTS};
use cplot_common::hal::error::{DeviceError, DeviceResult};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Framing budget of the response loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Lines read before giving up on `OK`.
    pub max_attempts: u32,
    /// Wait for each line.
    pub response_timeout: Duration,
}

impl RetryPolicy {
    /// Default attempt budget with the given per-line timeout.
    pub fn with_timeout(response_timeout: Duration) -> Self {
        Self {
            max_attempts: EBB_MAX_READ_ATTEMPTS,
            response_timeout,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

fn is_error_line(line: &str) -> bool {
    line.starts_with("ERR") || line.starts_with('!')
}

/// Command channel over a borrowed transport.
pub struct EbbLink<'t> {
    transport: &'t mut dyn Transport,
    policy: RetryPolicy,
}

impl<'t> EbbLink<'t> {
    /// Wrap a transport.
    pub fn new(transport: &'t mut dyn Transport, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Send a command that is acknowledged with `OK`.
    pub fn exec(&mut self, cmd: &EbbCommand) -> DeviceResult<()> {
        self.send(cmd).map(|_| ())
    }

    /// Send a query and return its data line.
    pub fn query(&mut self, cmd: &EbbCommand) -> DeviceResult<String> {
        let line = self.encode(cmd)?;
        self.send(cmd)?
            .ok_or(DeviceError::MissingData { command: line })
    }

    /// Write a line without waiting for any reply.
    pub fn write_raw(&mut self, line: &str) -> DeviceResult<()> {
        debug!("-> {line}");
        self.transport.write_line(line)
    }

    fn encode(&self, cmd: &EbbCommand) -> DeviceResult<String> {
        cmd.encode().inspect_err(|e| error!("{} not sent: {e}", cmd.code()))
    }

    fn send(&mut self, cmd: &EbbCommand) -> DeviceResult<Option<String>> {
        let line = self.encode(cmd)?;
        self.write_raw(&line)?;
        let shape = cmd.response_shape();
        if shape == ResponseShape::Silent {
            return Ok(None);
        }
        self.await_reply(&line, shape)
    }

    fn await_reply(&mut self, command: &str, shape: ResponseShape) -> DeviceResult<Option<String>> {
        let mut data: Option<String> = None;
        for _ in 0..self.policy.max_attempts {
            let Some(raw) = self.transport.read_line(self.policy.response_timeout)? else {
                error!("No response to '{command}'");
                return Err(DeviceError::NoResponse {
                    command: command.to_string(),
                });
            };
            let reply = raw.trim();
            debug!("<- {reply}");

            if reply == "OK" {
                if shape != ResponseShape::Ack && data.is_none() {
                    return Err(DeviceError::MissingData {
                        command: command.to_string(),
                    });
                }
                return Ok(data);
            }
            if is_error_line(reply) {
                error!("'{command}' rejected: {reply}");
                return Err(DeviceError::Rejected {
                    command: command.to_string(),
                    response: reply.to_string(),
                });
            }
            match shape {
                ResponseShape::DataThenAck if data.is_none() => data = Some(reply.to_string()),
                _ => trace!("Ignoring '{reply}' while waiting for OK"),
            }
        }
        error!("No acknowledgment after '{command}'");
        Err(DeviceError::NoAck {
            command: command.to_string(),
        })
    }

    // ─── Typed queries ──────────────────────────────────────────────

    /// `QM`.
    pub fn query_motion(&mut self) -> DeviceResult<MotionStatus> {
        response::parse_motion(&self.query(&EbbCommand::QueryMotion)?)
    }

    /// `QS`: global step position.
    pub fn query_steps(&mut self) -> DeviceResult<(i32, i32)> {
        response::parse_steps(&self.query(&EbbCommand::QuerySteps)?)
    }

    /// `QP`: true when the pen is up.
    pub fn query_pen(&mut self) -> DeviceResult<bool> {
        response::parse_flag("QP", &self.query(&EbbCommand::QueryPen)?)
    }

    /// `QR`: true when the servo is powered.
    pub fn query_servo_power(&mut self) -> DeviceResult<bool> {
        response::parse_flag("QR", &self.query(&EbbCommand::QueryServoPower)?)
    }

    /// `V`: raw version string.
    pub fn query_version(&mut self) -> DeviceResult<String> {
        self.query(&EbbCommand::Version)
    }

    /// `QM`, `QS`, `QP`, `QR` and `V` in one pass.
    pub fn collect_status(&mut self) -> DeviceResult<StatusSnapshot> {
        let motion = self.query_motion()?;
        let (steps1, steps2) = self.query_steps()?;
        let pen_up = self.query_pen()?;
        let servo_power = self.query_servo_power()?;
        let firmware = self.query_version()?;
        Ok(StatusSnapshot {
            motion,
            steps1,
            steps2,
            pen_up,
            servo_power,
            firmware,
        })
    }
}

/// Drop stale input and ask for the firmware version.
pub fn probe_version(transport: &mut dyn Transport, timeout: Duration) -> DeviceResult<String> {
    let dropped = transport.flush_input()?;
    if dropped > 0 {
        debug!("Discarded {dropped} stale bytes before probing");
    }
    EbbLink::new(transport, RetryPolicy::with_timeout(timeout)).query_version()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulation::{SIM_VERSION, SimulatedEbb};

    fn link(sim: &mut SimulatedEbb) -> EbbLink<'_> {
        EbbLink::new(sim, RetryPolicy::default())
    }

    #[test]
    fn ack_command_succeeds() {
        let mut sim = SimulatedEbb::new();
        let handle = sim.handle();
        link(&mut sim).exec(&EbbCommand::ClearSteps).unwrap();
        assert_eq!(handle.journal(), vec!["CS"]);
    }

    #[test]
    fn queries_capture_data() {
        let mut sim = SimulatedEbb::new();
        let mut l = link(&mut sim);
        assert_eq!(l.query_version().unwrap(), SIM_VERSION);
        assert!(l.query_pen().unwrap());
        assert_eq!(l.query_steps().unwrap(), (0, 0));
        assert!(l.query_motion().unwrap().is_idle());
    }

    #[test]
    fn error_lines_fail_every_shape() {
        for (prefix, cmd) in [
            ("CS", EbbCommand::ClearSteps),
            ("QS", EbbCommand::QuerySteps),
            ("QM", EbbCommand::QueryMotion),
            ("V", EbbCommand::Version),
        ] {
            for reply in ["ERR,busy", "!8 Err: nope"] {
                let mut sim = SimulatedEbb::new();
                sim.handle().override_reply(prefix, &[reply]);
                let err = link(&mut sim).query(&cmd).unwrap_err();
                assert!(matches!(err, DeviceError::Rejected { .. }), "{prefix}: {err}");
            }
        }
    }

    #[test]
    fn ok_without_data_is_an_error() {
        let mut sim = SimulatedEbb::new();
        sim.handle().override_reply("QS", &["OK"]);
        assert!(matches!(
            link(&mut sim).query_steps(),
            Err(DeviceError::MissingData { .. })
        ));
    }

    #[test]
    fn motion_ok_is_consumed_with_its_data() {
        let mut sim = SimulatedEbb::new();
        sim.handle().override_reply("QM", &["QM,0,0,0,0", "OK"]);
        let mut l = link(&mut sim);
        assert!(l.query_motion().unwrap().is_idle());
        // The next query must not see QM's trailing OK as its own reply.
        assert_eq!(l.query_steps().unwrap(), (0, 0));
    }

    #[test]
    fn version_without_ok_is_an_error() {
        let mut sim = SimulatedEbb::new();
        sim.handle().override_reply("V", &["EBBv13"]);
        assert!(matches!(
            link(&mut sim).query_version(),
            Err(DeviceError::NoResponse { .. })
        ));
    }

    #[test]
    fn info_lines_before_ok_are_skipped() {
        let mut sim = SimulatedEbb::new();
        sim.handle().override_reply("CS", &["note", "OK"]);
        link(&mut sim).exec(&EbbCommand::ClearSteps).unwrap();
    }

    #[test]
    fn endless_chatter_exhausts_attempts() {
        let mut sim = SimulatedEbb::new();
        let chatter = ["x"; 9];
        sim.handle().override_reply("CS", &chatter);
        let err = link(&mut sim).exec(&EbbCommand::ClearSteps).unwrap_err();
        assert!(matches!(err, DeviceError::NoAck { .. }));

        let mut sim = SimulatedEbb::new();
        sim.handle().override_reply("CS", &["x", "OK"]);
        let policy = RetryPolicy {
            max_attempts: 1,
            response_timeout: Duration::ZERO,
        };
        let err = EbbLink::new(&mut sim, policy)
            .exec(&EbbCommand::ClearSteps)
            .unwrap_err();
        assert!(matches!(err, DeviceError::NoAck { .. }));
    }

    #[test]
    fn silence_is_no_response() {
        let mut sim = SimulatedEbb::new();
        sim.handle().override_reply("CS", &[]);
        assert!(matches!(
            link(&mut sim).exec(&EbbCommand::ClearSteps),
            Err(DeviceError::NoResponse { .. })
        ));
    }

    #[test]
    fn invalid_arguments_never_reach_the_wire() {
        let mut sim = SimulatedEbb::new();
        let handle = sim.handle();
        let bad = EbbCommand::StepperMove {
            duration_ms: 0,
            steps1: 1,
            steps2: 1,
        };
        assert!(matches!(
            link(&mut sim).exec(&bad),
            Err(DeviceError::Validation(_))
        ));
        assert!(handle.journal().is_empty());
    }

    #[test]
    fn reboot_is_fire_and_forget() {
        let mut sim = SimulatedEbb::new();
        let handle = sim.handle();
        link(&mut sim).exec(&EbbCommand::Reboot).unwrap();
        assert_eq!(handle.state().reboots, 1);
    }

    #[test]
    fn probe_discards_stale_input() {
        let mut sim = SimulatedEbb::new().with_stale_input(&["OK", "garbage"]);
        let version = probe_version(&mut sim, Duration::from_millis(10)).unwrap();
        assert_eq!(version, SIM_VERSION);
    }

    #[test]
    fn status_snapshot_aggregates_queries() {
        let mut sim = SimulatedEbb::new();
        let mut l = link(&mut sim);
        l.exec(&EbbCommand::StepperMove {
            duration_ms: 10,
            steps1: 40,
            steps2: -4,
        })
        .unwrap();
        let status = l.collect_status().unwrap();
        assert_eq!((status.steps1, status.steps2), (40, -4));
        assert_eq!(status.motion.pending(), 1);
        assert!(status.pen_up);
        assert_eq!(status.firmware, SIM_VERSION);
    }
}
