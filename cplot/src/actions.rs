//! `cplot device <action>` handlers.
//!
//! Every action except `list` and `profile` runs inside a locked device
//! session. Results meant for the user go to `out`; diagnostics go through
//! tracing.

use crate::CliError;
use crate::context::Context;
use clap::Subcommand;
use cplot_common::consts::{IDLE_WAIT_ATTEMPTS, IDLE_WAIT_PAUSE_MS};
use cplot_common::hal::error::{DeviceError, DeviceResult};
use cplot_common::hal::types::MotorMode;
use cplot_common::profile::PROFILES;
use cplot_hal::Device;
use cplot_hal::drivers::ports::list_ports;
use cplot_hal::ebb::StatusSnapshot;
use cplot_hal::session::with_device;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tracing::{info, warn};

/// Home step-rate bounds (steps/s).
const HOME_RATE_MIN: f64 = 100.0;
const HOME_RATE_MAX: f64 = 25_000.0;

/// Jog offsets below this are ignored (mm).
const JOG_EPS_MM: f64 = 1e-6;

/// Direct device actions.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DeviceAction {
    /// Raise the pen
    PenUp,
    /// Lower the pen
    PenDown,
    /// Flip the pen state
    PenToggle,
    /// Energize both motors at 1/16 microstepping
    MotorsOn,
    /// Release both motors
    MotorsOff,
    /// Emergency stop
    Abort,
    /// Relative move in millimetres
    Jog {
        /// X offset (mm)
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        dx: f64,
        /// Y offset (mm)
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        dy: f64,
    },
    /// Return to the home position and zero the step counters
    Home,
    /// Print the firmware version
    Version,
    /// Print the full device status
    Status,
    /// Print the current position
    Position,
    /// Pen up, zero the counters, release the motors
    Reset,
    /// Reboot the controller
    Reboot,
    /// List candidate serial ports
    List,
    /// Show the active hardware profile
    Profile,
}

impl DeviceAction {
    /// Whether the action needs the device.
    pub const fn needs_device(&self) -> bool {
        !matches!(self, Self::List | Self::Profile)
    }
}

/// Position in millimetres from step counters.
pub fn steps_to_mm(steps: (i32, i32), steps_per_mm: f64) -> (f64, f64) {
    (
        f64::from(steps.0) / steps_per_mm,
        f64::from(steps.1) / steps_per_mm,
    )
}

/// `HM` step rate for a travel speed, clamped to the homing range.
pub fn home_step_rate(speed_mm_s: f64, steps_per_mm: f64) -> u32 {
    (speed_mm_s * steps_per_mm).clamp(HOME_RATE_MIN, HOME_RATE_MAX) as u32
}

fn wait_idle(device: &mut Device) -> DeviceResult<()> {
    device.wait_for_idle(IDLE_WAIT_ATTEMPTS, Duration::from_millis(IDLE_WAIT_PAUSE_MS))
}

fn write_position(
    out: &mut dyn Write,
    prefix: &str,
    steps: (i32, i32),
    ctx: &Context,
) -> Result<(), CliError> {
    match ctx.settings.steps_per_mm() {
        Some(spmm) => {
            let (x, y) = steps_to_mm(steps, spmm);
            writeln!(out, "{prefix}X={x:.3} mm, Y={y:.3} mm")?;
        }
        None => writeln!(out, "{prefix}{} / {} steps (steps per mm unknown)", steps.0, steps.1)?,
    }
    Ok(())
}

// ─── Status report ──────────────────────────────────────────────────

#[derive(Serialize)]
struct StatusReport<'a> {
    #[serde(flatten)]
    snapshot: &'a StatusSnapshot,
    x_mm: Option<f64>,
    y_mm: Option<f64>,
}

fn write_status(
    out: &mut dyn Write,
    snapshot: &StatusSnapshot,
    ctx: &Context,
) -> Result<(), CliError> {
    let position = ctx
        .settings
        .steps_per_mm()
        .map(|spmm| steps_to_mm((snapshot.steps1, snapshot.steps2), spmm));
    if ctx.json {
        let report = StatusReport {
            snapshot,
            x_mm: position.map(|p| p.0),
            y_mm: position.map(|p| p.1),
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    let yes_no = |flag: bool| if flag { "yes" } else { "no" };
    let motion = &snapshot.motion;
    writeln!(out, "Device status:")?;
    writeln!(out, "  Command active:  {}", yes_no(motion.command_active))?;
    writeln!(out, "  Motor 1 active:  {}", yes_no(motion.motor1_active))?;
    writeln!(out, "  Motor 2 active:  {}", yes_no(motion.motor2_active))?;
    writeln!(out, "  FIFO pending:    {}", motion.fifo_pending)?;
    match position {
        Some((x, y)) => {
            writeln!(out, "  Position X:      {x:.3} mm")?;
            writeln!(out, "  Position Y:      {y:.3} mm")?;
        }
        None => writeln!(
            out,
            "  Position:        {} / {} steps (steps per mm unknown)",
            snapshot.steps1, snapshot.steps2
        )?,
    }
    writeln!(out, "  Pen up:          {}", yes_no(snapshot.pen_up))?;
    writeln!(out, "  Servo powered:   {}", yes_no(snapshot.servo_power))?;
    writeln!(out, "  Firmware:        {}", snapshot.firmware)?;
    Ok(())
}

// ─── Local actions ──────────────────────────────────────────────────

fn list(ctx: &Context, out: &mut dyn Write) -> Result<(), CliError> {
    let ports = list_ports();
    if ctx.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&ports)?)?;
        return Ok(());
    }
    if ports.is_empty() {
        writeln!(out, "No candidate serial ports found")?;
    }
    for port in &ports {
        match (&port.version, &port.detail) {
            (Some(version), _) => writeln!(out, "{}  {}", port.path, version)?,
            (None, Some(detail)) => writeln!(out, "{}  (no answer: {detail})", port.path)?,
            (None, None) => writeln!(out, "{}  (no answer)", port.path)?,
        }
    }
    Ok(())
}

fn profile(ctx: &Context, out: &mut dyn Write) -> Result<(), CliError> {
    let p = ctx.profile;
    if ctx.json {
        writeln!(out, "{}", serde_json::to_string_pretty(p)?)?;
        return Ok(());
    }
    writeln!(out, "Profile: {}", p.model_id)?;
    writeln!(out, "  Paper:         {:.0} x {:.0} mm", p.paper_w_mm, p.paper_h_mm)?;
    writeln!(
        out,
        "  Speed:         {:.1} mm/s (effective {:.1})",
        p.speed_mm_s, ctx.settings.speed_mm_s
    )?;
    writeln!(
        out,
        "  Acceleration:  {:.1} mm/s² (effective {:.1})",
        p.accel_mm_s2, ctx.settings.accel_mm_s2
    )?;
    writeln!(out, "  Steps per mm:  {:.2}", p.steps_per_mm)?;
    let others: Vec<&str> = PROFILES
        .iter()
        .map(|p| p.model_id)
        .filter(|id| *id != ctx.profile.model_id)
        .collect();
    if !others.is_empty() {
        writeln!(out, "  Other models:  {}", others.join(", "))?;
    }
    Ok(())
}

// ─── Dispatch ───────────────────────────────────────────────────────

/// Run one device action.
///
/// # Errors
/// Device failures (including `Busy` when another process holds the
/// lock) and output errors.
pub fn run_device_action(
    ctx: &Context,
    action: &DeviceAction,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let options = ctx.session_options();
    info!("Device action: {action:?}");

    match action {
        DeviceAction::PenUp => {
            with_device(&options, true, |d| d.pen_up())?;
            writeln!(out, "Pen raised")?;
        }
        DeviceAction::PenDown => {
            with_device(&options, true, |d| d.pen_down())?;
            writeln!(out, "Pen lowered")?;
        }
        DeviceAction::PenToggle => {
            let raised = with_device(&options, true, |d| {
                if d.query_pen()? {
                    d.pen_down()?;
                    Ok(false)
                } else {
                    d.pen_up()?;
                    Ok(true)
                }
            })?;
            writeln!(out, "Pen {}", if raised { "raised" } else { "lowered" })?;
        }
        DeviceAction::MotorsOn => {
            with_device(&options, false, |d| {
                d.enable_motors(MotorMode::Step16, MotorMode::Step16)
            })?;
            writeln!(out, "Motors enabled (1/16 microstepping)")?;
        }
        DeviceAction::MotorsOff => {
            with_device(&options, false, |d| d.disable_motors())?;
            writeln!(out, "Motors disabled")?;
        }
        DeviceAction::Abort => {
            with_device(&options, false, |d| d.emergency_stop())?;
            writeln!(out, "Emergency stop sent")?;
        }
        DeviceAction::Jog { dx, dy } => {
            if dx.abs() < JOG_EPS_MM && dy.abs() < JOG_EPS_MM {
                warn!("Jog offset is zero, nothing to do");
                return Ok(());
            }
            let steps = with_device(&options, false, |d| {
                d.enable_motors(MotorMode::Step16, MotorMode::Step16)?;
                d.move_mm(*dx, *dy, None)?;
                wait_idle(d)?;
                d.query_steps()
            })?;
            write_position(out, "Jog done, position: ", steps, ctx)?;
        }
        DeviceAction::Home => {
            let Some(spmm) = ctx.settings.steps_per_mm() else {
                return Err(DeviceError::Config("steps_per_mm is not set".to_string()).into());
            };
            let rate = home_step_rate(ctx.settings.speed_mm_s, spmm);
            with_device(&options, false, |d| {
                d.enable_motors(MotorMode::Step16, MotorMode::Step16)?;
                d.home(rate, None)?;
                wait_idle(d)?;
                if let Err(e) = d.clear_steps() {
                    warn!("Could not clear step counters: {e}");
                }
                Ok(())
            })?;
            writeln!(out, "Homing complete")?;
        }
        DeviceAction::Version => {
            let version = with_device(&options, false, |d| d.query_version())?;
            writeln!(out, "{version}")?;
        }
        DeviceAction::Status => {
            let snapshot = with_device(&options, false, |d| d.status())?;
            write_status(out, &snapshot, ctx)?;
        }
        DeviceAction::Position => {
            let steps = with_device(&options, false, |d| d.query_steps())?;
            write_position(out, "Position: ", steps, ctx)?;
        }
        DeviceAction::Reset => {
            with_device(&options, false, |d| {
                d.pen_up()?;
                wait_idle(d)?;
                if let Err(e) = d.clear_steps() {
                    warn!("Could not clear step counters: {e}");
                }
                d.disable_motors()
            })?;
            writeln!(out, "Device reset: pen up, counters cleared, motors off")?;
        }
        DeviceAction::Reboot => {
            with_device(&options, false, |d| d.reboot())?;
            writeln!(out, "Controller rebooting")?;
        }
        DeviceAction::List => list(ctx, out)?,
        DeviceAction::Profile => profile(ctx, out)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_rate_is_clamped() {
        assert_eq!(home_step_rate(254.0, 80.0), 20_320);
        assert_eq!(home_step_rate(1000.0, 80.0), 25_000);
        assert_eq!(home_step_rate(0.5, 80.0), 100);
    }

    #[test]
    fn steps_convert_per_axis() {
        assert_eq!(steps_to_mm((800, -400), 80.0), (10.0, -5.0));
    }

    #[test]
    fn local_actions_skip_the_device() {
        assert!(!DeviceAction::List.needs_device());
        assert!(!DeviceAction::Profile.needs_device());
        assert!(DeviceAction::Status.needs_device());
    }
}
