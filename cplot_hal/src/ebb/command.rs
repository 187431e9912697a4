//! EBB wire commands.
//!
//! One [`EbbCommand`] variant per firmware command. Arguments are checked
//! against firmware limits by [`EbbCommand::validate`] before anything is
//! formatted, and [`EbbCommand::encode`] refuses lines longer than the
//! firmware input buffer.

use bitflags::bitflags;
use cplot_common::consts::{
    EBB_CMD_MAX_LEN, EBB_HM_MAX_POSITION, EBB_HM_MAX_RATE, EBB_HM_MIN_RATE, EBB_LM_MAX_RATE,
    EBB_MAX_DURATION_MS, EBB_MAX_STEPS,
};
use cplot_common::hal::error::{DeviceError, DeviceResult};
use cplot_common::hal::types::MotorMode;
use std::fmt::Write as _;

bitflags! {
    /// Step-accumulator clear flags of `LM`/`LT`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearFlags: u8 {
        /// Clear the motor 1 accumulator.
        const AXIS1 = 1;
        /// Clear the motor 2 accumulator.
        const AXIS2 = 2;
    }
}

/// What the firmware sends back for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Optional informational lines, then `OK`.
    Ack,
    /// One data line, then `OK`.
    DataThenAck,
    /// No response at all.
    Silent,
}

/// Typed EBB command.
#[derive(Debug, Clone, PartialEq)]
pub enum EbbCommand {
    /// `V`: firmware version.
    Version,
    /// `EM`: enable motors with raw microstep codes (0–5).
    EnableMotors {
        /// Motor 1 mode code.
        motor1: u8,
        /// Motor 2 mode code.
        motor2: u8,
    },
    /// `SM`: timed move in motor steps.
    StepperMove {
        /// Move duration (ms).
        duration_ms: u32,
        /// Motor 1 steps.
        steps1: i32,
        /// Motor 2 steps.
        steps2: i32,
    },
    /// `XM`: timed move in mixed-axis (A/B) steps.
    MixedMove {
        /// Move duration (ms).
        duration_ms: u32,
        /// Axis A steps.
        steps_a: i32,
        /// Axis B steps.
        steps_b: i32,
    },
    /// `LM`: low-level accelerated move.
    LowLevelMove {
        /// Motor 1 initial rate.
        rate1: u32,
        /// Motor 1 steps.
        steps1: i32,
        /// Motor 1 rate delta per interval.
        accel1: i32,
        /// Motor 2 initial rate.
        rate2: u32,
        /// Motor 2 steps.
        steps2: i32,
        /// Motor 2 rate delta per interval.
        accel2: i32,
        /// Optional accumulator clear.
        clear: Option<ClearFlags>,
    },
    /// `LT`: low-level move over a fixed number of intervals.
    LowLevelTime {
        /// Duration in 40 µs intervals.
        intervals: u32,
        /// Motor 1 initial rate (signed: direction).
        rate1: i32,
        /// Motor 1 rate delta per interval.
        accel1: i32,
        /// Motor 2 initial rate (signed: direction).
        rate2: i32,
        /// Motor 2 rate delta per interval.
        accel2: i32,
        /// Optional accumulator clear.
        clear: Option<ClearFlags>,
    },
    /// `HM`: move home, or to an absolute position.
    HomeMove {
        /// Step rate (2–25000).
        step_rate: u32,
        /// Absolute target in motor steps; `None` means home.
        position: Option<(i32, i32)>,
    },
    /// `SP`: raise or lower the pen.
    SetPen {
        /// Raise when true.
        up: bool,
        /// Settle delay after the move (ms, 0–65535).
        settle_ms: u32,
        /// Alternate PORTB pin (0–7).
        pin: Option<u8>,
    },
    /// `SC`: configure a mode parameter.
    Configure {
        /// Parameter id (0–255).
        param: u32,
        /// Value (0–65535).
        value: u32,
    },
    /// `SR`: servo auto power-off timeout.
    ServoTimeout {
        /// Timeout (ms).
        timeout_ms: u32,
        /// Power the servo on (true) or off (false) right away.
        power: Option<bool>,
    },
    /// `QM`: motion status.
    QueryMotion,
    /// `QS`: global step position.
    QuerySteps,
    /// `QP`: pen state.
    QueryPen,
    /// `QR`: servo power state.
    QueryServoPower,
    /// `CS`: clear step position.
    ClearSteps,
    /// `ES`: emergency stop.
    EmergencyStop,
    /// `RB`: reboot the controller.
    Reboot,
}

fn invalid(msg: String) -> DeviceResult<()> {
    Err(DeviceError::Validation(msg))
}

fn check_duration(code: &str, duration_ms: u32) -> DeviceResult<()> {
    if duration_ms == 0 || duration_ms > EBB_MAX_DURATION_MS {
        return invalid(format!("{code} duration out of range: {duration_ms}"));
    }
    Ok(())
}

fn check_steps(code: &str, a: i32, b: i32) -> DeviceResult<()> {
    let range = -EBB_MAX_STEPS..=EBB_MAX_STEPS;
    if !range.contains(&a) || !range.contains(&b) {
        return invalid(format!("{code} steps out of range: {a}, {b}"));
    }
    Ok(())
}

fn check_clear(code: &str, clear: Option<ClearFlags>) -> DeviceResult<()> {
    match clear {
        Some(flags) if !ClearFlags::all().contains(flags) => {
            invalid(format!("{code} clear flags invalid: {}", flags.bits()))
        }
        _ => Ok(()),
    }
}

impl EbbCommand {
    /// `EM` from typed modes.
    pub fn enable_motors(motor1: MotorMode, motor2: MotorMode) -> Self {
        Self::EnableMotors {
            motor1: motor1.code(),
            motor2: motor2.code(),
        }
    }

    /// Command code as sent on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Version => "V",
            Self::EnableMotors { .. } => "EM",
            Self::StepperMove { .. } => "SM",
            Self::MixedMove { .. } => "XM",
            Self::LowLevelMove { .. } => "LM",
            Self::LowLevelTime { .. } => "LT",
            Self::HomeMove { .. } => "HM",
            Self::SetPen { .. } => "SP",
            Self::Configure { .. } => "SC",
            Self::ServoTimeout { .. } => "SR",
            Self::QueryMotion => "QM",
            Self::QuerySteps => "QS",
            Self::QueryPen => "QP",
            Self::QueryServoPower => "QR",
            Self::ClearSteps => "CS",
            Self::EmergencyStop => "ES",
            Self::Reboot => "RB",
        }
    }

    /// Expected response framing.
    pub fn response_shape(&self) -> ResponseShape {
        match self {
            Self::Version
            | Self::QueryMotion
            | Self::QuerySteps
            | Self::QueryPen
            | Self::QueryServoPower => ResponseShape::DataThenAck,
            Self::Reboot => ResponseShape::Silent,
            _ => ResponseShape::Ack,
        }
    }

    /// Check arguments against firmware limits.
    pub fn validate(&self) -> DeviceResult<()> {
        match *self {
            Self::EnableMotors { motor1, motor2 } => {
                if MotorMode::from_code(motor1).is_none() || MotorMode::from_code(motor2).is_none()
                {
                    return invalid(format!("EM modes out of range: {motor1}, {motor2}"));
                }
                Ok(())
            }
            Self::StepperMove {
                duration_ms,
                steps1,
                steps2,
            } => {
                check_duration("SM", duration_ms)?;
                check_steps("SM", steps1, steps2)
            }
            Self::MixedMove {
                duration_ms,
                steps_a,
                steps_b,
            } => {
                check_duration("XM", duration_ms)?;
                check_steps("XM", steps_a, steps_b)
            }
            Self::LowLevelMove {
                rate1,
                steps1,
                accel1,
                rate2,
                steps2,
                accel2,
                clear,
            } => {
                if rate1 > EBB_LM_MAX_RATE || rate2 > EBB_LM_MAX_RATE {
                    return invalid(format!("LM rate out of range: {rate1}, {rate2}"));
                }
                check_clear("LM", clear)?;
                if [steps1, accel1, steps2, accel2].iter().all(|v| *v == 0)
                    && rate1 == 0
                    && rate2 == 0
                {
                    return invalid("LM without motion".to_string());
                }
                Ok(())
            }
            Self::LowLevelTime {
                intervals,
                rate1,
                accel1,
                rate2,
                accel2,
                clear,
            } => {
                if intervals == 0 {
                    return invalid("LT needs a positive interval count".to_string());
                }
                check_clear("LT", clear)?;
                if [rate1, accel1, rate2, accel2].iter().all(|v| *v == 0) {
                    return invalid("LT without motion".to_string());
                }
                Ok(())
            }
            Self::HomeMove {
                step_rate,
                position,
            } => {
                if !(EBB_HM_MIN_RATE..=EBB_HM_MAX_RATE).contains(&step_rate) {
                    return invalid(format!("HM rate out of range: {step_rate}"));
                }
                if let Some((p1, p2)) = position
                    && (p1.unsigned_abs() > EBB_HM_MAX_POSITION.unsigned_abs()
                        || p2.unsigned_abs() > EBB_HM_MAX_POSITION.unsigned_abs())
                {
                    return invalid(format!("HM position out of range: {p1}, {p2}"));
                }
                Ok(())
            }
            Self::SetPen { settle_ms, pin, .. } => {
                if settle_ms > u32::from(u16::MAX) {
                    return invalid(format!("SP settle delay out of range: {settle_ms}"));
                }
                if let Some(pin) = pin
                    && pin > 7
                {
                    return invalid(format!("SP pin out of range: {pin}"));
                }
                Ok(())
            }
            Self::Configure { param, value } => {
                if param > 255 {
                    return invalid(format!("SC parameter out of range: {param}"));
                }
                if value > u32::from(u16::MAX) {
                    return invalid(format!("SC value out of range: {value}"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Validate and format the command line, without terminator.
    pub fn encode(&self) -> DeviceResult<String> {
        self.validate()?;
        let mut line = String::from(self.code());
        // Writing to a String cannot fail.
        let _ = match *self {
            Self::EnableMotors { motor1, motor2 } => write!(line, ",{motor1},{motor2}"),
            Self::StepperMove {
                duration_ms,
                steps1,
                steps2,
            } => write!(line, ",{duration_ms},{steps1},{steps2}"),
            Self::MixedMove {
                duration_ms,
                steps_a,
                steps_b,
            } => write!(line, ",{duration_ms},{steps_a},{steps_b}"),
            Self::LowLevelMove {
                rate1,
                steps1,
                accel1,
                rate2,
                steps2,
                accel2,
                clear,
            } => write!(line, ",{rate1},{steps1},{accel1},{rate2},{steps2},{accel2}")
                .and_then(|()| write_clear(&mut line, clear)),
            Self::LowLevelTime {
                intervals,
                rate1,
                accel1,
                rate2,
                accel2,
                clear,
            } => write!(line, ",{intervals},{rate1},{accel1},{rate2},{accel2}")
                .and_then(|()| write_clear(&mut line, clear)),
            Self::HomeMove {
                step_rate,
                position,
            } => match position {
                Some((p1, p2)) => write!(line, ",{step_rate},{p1},{p2}"),
                None => write!(line, ",{step_rate}"),
            },
            Self::SetPen { up, settle_ms, pin } => {
                let state = u8::from(up);
                match pin {
                    Some(pin) => write!(line, ",{state},{settle_ms},{pin}"),
                    None if settle_ms > 0 => write!(line, ",{state},{settle_ms}"),
                    None => write!(line, ",{state}"),
                }
            }
            Self::Configure { param, value } => write!(line, ",{param},{value}"),
            Self::ServoTimeout { timeout_ms, power } => match power {
                Some(on) => write!(line, ",{timeout_ms},{}", u8::from(on)),
                None => write!(line, ",{timeout_ms}"),
            },
            _ => Ok(()),
        };
        if line.len() > EBB_CMD_MAX_LEN {
            return Err(DeviceError::Validation(format!(
                "command too long ({} bytes)",
                line.len()
            )));
        }
        Ok(line)
    }
}

fn write_clear(line: &mut String, clear: Option<ClearFlags>) -> std::fmt::Result {
    match clear {
        Some(flags) => write!(line, ",{}", flags.bits()),
        None => Ok(()),
    }
}
