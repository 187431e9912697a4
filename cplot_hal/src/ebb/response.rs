//! Strict parsers for query payloads.
//!
//! Every numeric field must consume its whole token; a stray character is
//! a protocol error, never a silent default.

use cplot_common::hal::error::{DeviceError, DeviceResult};
use serde::Serialize;
use std::str::FromStr;

/// Decoded `QM` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MotionStatus {
    /// A motion command is executing.
    pub command_active: bool,
    /// Motor 1 is moving.
    pub motor1_active: bool,
    /// Motor 2 is moving.
    pub motor2_active: bool,
    /// Commands waiting in the firmware FIFO.
    pub fifo_pending: u32,
}

impl MotionStatus {
    /// Commands accepted but not finished (queued plus executing).
    pub fn pending(&self) -> u32 {
        self.fifo_pending
            .saturating_add(u32::from(self.command_active))
    }

    /// Nothing executing and nothing queued.
    pub fn is_idle(&self) -> bool {
        !self.command_active && !self.motor1_active && !self.motor2_active && self.fifo_pending == 0
    }
}

/// Aggregated controller state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Motion status.
    pub motion: MotionStatus,
    /// Global step position of motor 1.
    pub steps1: i32,
    /// Global step position of motor 2.
    pub steps2: i32,
    /// Pen raised.
    pub pen_up: bool,
    /// Servo powered.
    pub servo_power: bool,
    /// Firmware version string.
    pub firmware: String,
}

fn malformed(command: &str, payload: &str) -> DeviceError {
    DeviceError::Malformed {
        command: command.to_string(),
        response: payload.to_string(),
    }
}

fn field<T: FromStr>(command: &str, payload: &str, token: &str) -> DeviceResult<T> {
    token.trim().parse().map_err(|_| malformed(command, payload))
}

/// Parse `[QM,]<cmd>,<m1>,<m2>[,<fifo>]`; a missing FIFO field counts as 0.
///
/// Older firmware omits the `QM,` echo.
pub fn parse_motion(payload: &str) -> DeviceResult<MotionStatus> {
    let trimmed = payload.trim();
    let body = trimmed.strip_prefix("QM,").unwrap_or(trimmed);
    let values: Vec<&str> = body.split(',').collect();
    if !(3..=4).contains(&values.len()) {
        return Err(malformed("QM", payload));
    }
    let flag = |t: &str| field::<i64>("QM", payload, t).map(|v| v != 0);
    let fifo_pending = match values.get(3) {
        Some(t) => field::<u32>("QM", payload, t)?,
        None => 0,
    };
    Ok(MotionStatus {
        command_active: flag(values[0])?,
        motor1_active: flag(values[1])?,
        motor2_active: flag(values[2])?,
        fifo_pending,
    })
}

/// Parse `<steps1>,<steps2>`.
pub fn parse_steps(payload: &str) -> DeviceResult<(i32, i32)> {
    match payload.trim().split_once(',') {
        Some((a, b)) => Ok((field("QS", payload, a)?, field("QS", payload, b)?)),
        None => Err(malformed("QS", payload)),
    }
}

/// Parse a single `0`/`1` payload of `command`.
pub fn parse_flag(command: &str, payload: &str) -> DeviceResult<bool> {
    match field::<i64>(command, payload, payload)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(malformed(command, payload)),
    }
}
