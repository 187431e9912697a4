//! Plan and plot orchestration.
//!
//! ```text
//! paths.toml ──► polylines ──► segments ──► Planner ──► blocks
//!                                                         │
//!                      dry run: Stepper (log only) ◄──────┤
//!                      real:    Stepper ──► Device ◄──────┘
//! ```

use crate::CliError;
use crate::context::Context;
use crate::paths::PathFile;
use cplot_common::consts::{IDLE_WAIT_ATTEMPTS, IDLE_WAIT_PAUSE_MS};
use cplot_common::hal::types::MotorMode;
use cplot_hal::Device;
use cplot_hal::session::DeviceSession;
use cplot_motion::{PlanBlock, Planner, Stepper, segments_from_polylines};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Load `file` and plan it with the context's limits.
///
/// # Errors
/// Path file errors, `NothingToPlot` for files without drawable geometry,
/// and planner limit errors.
pub fn plan_file(ctx: &Context, file: &Path) -> Result<Vec<PlanBlock>, CliError> {
    let paths = PathFile::read(file)?;
    info!(
        "Loaded {} paths ({} points) from {}",
        paths.paths.len(),
        paths.point_count(),
        file.display()
    );
    let Some((start, segments)) = segments_from_polylines(&paths.polylines(), ctx.settings.speed_mm_s)
    else {
        return Err(CliError::NothingToPlot);
    };
    let planner = Planner::new(ctx.planner_limits())?;
    let blocks = planner.plan(start, &segments)?;
    info!("Planned {} blocks from {} segments", blocks.len(), segments.len());
    Ok(blocks)
}

/// Totals of one plot run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlotSummary {
    /// Blocks submitted.
    pub blocks: usize,
    /// Pen-down distance (mm).
    pub draw_mm: f64,
    /// Pen-up distance (mm).
    pub travel_mm: f64,
    /// Sum of block durations (s).
    pub duration_s: f64,
}

impl PlotSummary {
    fn add(&mut self, block: &PlanBlock) {
        self.blocks += 1;
        if block.pen_down {
            self.draw_mm += block.length;
        } else {
            self.travel_mm += block.length;
        }
        self.duration_s += block_duration(block);
    }

    /// Summary of a plan without running it.
    pub fn of(blocks: &[PlanBlock]) -> Self {
        let mut summary = Self::default();
        blocks.iter().for_each(|b| summary.add(b));
        summary
    }
}

/// Trapezoid duration of one block (s).
fn block_duration(block: &PlanBlock) -> f64 {
    let ramp = |distance: f64, v0: f64, v1: f64| {
        let mean = v0 + v1;
        if distance > 0.0 && mean > 0.0 {
            2.0 * distance / mean
        } else {
            0.0
        }
    };
    ramp(block.accel_distance, block.start_speed, block.cruise_speed)
        + ramp(block.cruise_distance, block.cruise_speed, block.cruise_speed)
        + ramp(block.decel_distance, block.cruise_speed, block.end_speed)
}

// ─── Plan output ────────────────────────────────────────────────────

/// Print `blocks` as a table, or as JSON.
///
/// # Errors
/// Output and serialization errors.
pub fn write_plan(blocks: &[PlanBlock], json: bool, out: &mut dyn Write) -> Result<(), CliError> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(blocks)?)?;
        return Ok(());
    }
    writeln!(
        out,
        "{:>5} {:>4} {:>9} {:>9} {:>9} {:>8} {:>8} {:>8} {:>8}",
        "seq", "pen", "dx", "dy", "len", "v0", "vc", "v1", "accel"
    )?;
    for b in blocks {
        writeln!(
            out,
            "{:>5} {:>4} {:>9.3} {:>9.3} {:>9.3} {:>8.2} {:>8.2} {:>8.2} {:>8.1}",
            b.seq,
            if b.pen_down { "down" } else { "up" },
            b.delta.x,
            b.delta.y,
            b.length,
            b.start_speed,
            b.cruise_speed,
            b.end_speed,
            b.accel
        )?;
    }
    let summary = PlotSummary::of(blocks);
    writeln!(
        out,
        "{} blocks, draw {:.1} mm, travel {:.1} mm, about {:.1} s",
        summary.blocks, summary.draw_mm, summary.travel_mm, summary.duration_s
    )?;
    Ok(())
}

/// Print the totals of a finished run.
///
/// # Errors
/// Output and serialization errors.
pub fn write_summary(
    summary: &PlotSummary,
    dry_run: bool,
    json: bool,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(summary)?)?;
        return Ok(());
    }
    writeln!(
        out,
        "{} {} blocks: draw {:.1} mm, travel {:.1} mm, about {:.1} s",
        if dry_run { "Simulated" } else { "Plotted" },
        summary.blocks,
        summary.draw_mm,
        summary.travel_mm,
        summary.duration_s
    )?;
    Ok(())
}

// ─── Plot ───────────────────────────────────────────────────────────

/// Execute `blocks`.
///
/// A dry run drives the stepper without a device. A real run locks and
/// connects the device, energizes the motors, raises the pen, follows the
/// pen state of each block, raises the pen at the end and waits for idle.
///
/// `abort` is polled between blocks; once set the device is stopped with
/// `ES`, the pen is raised, and `CliError::Aborted` is returned.
///
/// # Errors
/// Session, stepper and device errors, or `Aborted`.
pub fn plot_blocks(
    ctx: &Context,
    blocks: &[PlanBlock],
    dry_run: bool,
    abort: &AtomicBool,
) -> Result<PlotSummary, CliError> {
    let steps_per_mm = ctx.settings.steps_per_mm();
    if dry_run {
        let mut stepper = Stepper::new(None, steps_per_mm)?;
        let mut summary = PlotSummary::default();
        for block in blocks {
            if abort.load(Ordering::SeqCst) {
                return Err(aborted(summary.blocks, blocks.len()));
            }
            stepper.submit_block(block, true)?;
            summary.add(block);
        }
        info!("Dry run: {} blocks simulated", stepper.emitted_blocks());
        return Ok(summary);
    }

    let mut session = DeviceSession::open(&ctx.session_options())?;
    let device = session.device();
    device.enable_motors(MotorMode::Step16, MotorMode::Step16)?;
    device.pen_up()?;

    let mut summary = PlotSummary::default();
    let result = drive(device, blocks, steps_per_mm, abort, &mut summary);
    match result {
        Ok(()) => {
            device.pen_up()?;
            if let Err(e) = device.wait_for_idle(
                IDLE_WAIT_ATTEMPTS,
                Duration::from_millis(IDLE_WAIT_PAUSE_MS),
            ) {
                warn!("Device did not become idle after plotting: {e}");
            }
            info!("Plot complete: {} blocks", summary.blocks);
            Ok(summary)
        }
        Err(CliError::Aborted { completed, total }) => {
            warn!("Plot aborted after {completed}/{total} blocks");
            if let Err(e) = device.emergency_stop() {
                error!("Emergency stop failed: {e}");
            }
            if let Err(e) = device.pen_up() {
                error!("Could not raise the pen: {e}");
            }
            Err(CliError::Aborted { completed, total })
        }
        Err(e) => {
            if let Err(lift) = device.pen_up() {
                error!("Could not raise the pen after failure: {lift}");
            }
            Err(e)
        }
    }
}

fn aborted(completed: usize, total: usize) -> CliError {
    CliError::Aborted { completed, total }
}

/// Submit blocks grouped by pen state, switching the pen between groups.
fn drive(
    device: &mut Device,
    blocks: &[PlanBlock],
    steps_per_mm: Option<f64>,
    abort: &AtomicBool,
    summary: &mut PlotSummary,
) -> Result<(), CliError> {
    let mut pen_down = false;
    for run in blocks.chunk_by(|a, b| a.pen_down == b.pen_down) {
        let Some(first) = run.first() else {
            continue;
        };
        if abort.load(Ordering::SeqCst) {
            return Err(aborted(summary.blocks, blocks.len()));
        }
        if first.pen_down != pen_down {
            if first.pen_down {
                device.pen_down()?;
            } else {
                device.pen_up()?;
            }
            pen_down = first.pen_down;
        }
        debug!("Pen {}: {} blocks", if pen_down { "down" } else { "up" }, run.len());

        let mut stepper = Stepper::new(Some(&mut *device), steps_per_mm)?;
        for block in run {
            if abort.load(Ordering::SeqCst) {
                return Err(aborted(summary.blocks, blocks.len()));
            }
            stepper.submit_block(block, false)?;
            summary.add(block);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cplot_motion::Point2;

    fn block(length: f64, v0: f64, vc: f64, v1: f64, accel_d: f64, decel_d: f64) -> PlanBlock {
        PlanBlock {
            seq: 1,
            delta: Point2::new(length, 0.0),
            length,
            unit: Point2::new(1.0, 0.0),
            start_speed: v0,
            cruise_speed: vc,
            end_speed: v1,
            nominal_speed: vc,
            accel_distance: accel_d,
            cruise_distance: length - accel_d - decel_d,
            decel_distance: decel_d,
            accel: 100.0,
            pen_down: true,
        }
    }

    #[test]
    fn cruise_only_block_duration() {
        let b = block(10.0, 5.0, 5.0, 5.0, 0.0, 0.0);
        assert!((block_duration(&b) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn symmetric_trapezoid_duration() {
        // 0 → 10 over 0.5 mm, 9 mm cruise, 10 → 0 over 0.5 mm.
        let b = block(10.0, 0.0, 10.0, 0.0, 0.5, 0.5);
        assert!((block_duration(&b) - (0.1 + 0.9 + 0.1)).abs() < 1e-12);
    }

    #[test]
    fn summary_splits_draw_and_travel() {
        let mut travel = block(3.0, 1.0, 1.0, 1.0, 0.0, 0.0);
        travel.pen_down = false;
        let draw = block(4.0, 2.0, 2.0, 2.0, 0.0, 0.0);
        let summary = PlotSummary::of(&[travel, draw]);
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.draw_mm, 4.0);
        assert_eq!(summary.travel_mm, 3.0);
        assert!((summary.duration_s - 5.0).abs() < 1e-12);
    }
}
