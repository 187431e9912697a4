//! Block → phase decomposition and dispatch.
//!
//! Each [`PlanBlock`] is split into up to three [`PhaseMove`]s (accelerate,
//! cruise, decelerate). Integer step counts are apportioned per phase on
//! the two CoreXY motor axes; the last phase takes the remainder so the
//! block's step totals are exact. Phases are handed to a
//! [`MotionDevice`], or only logged in dry-run mode.

use crate::planner::PlanBlock;
use cplot_common::hal::driver::MotionDevice;
use cplot_common::hal::error::DeviceError;
use cplot_common::hal::types::PhaseMove;
use thiserror::Error;
use tracing::{debug, error, trace};

/// Distances at or below this are ignored (mm).
const STEPPER_EPS_MM: f64 = 1e-6;

/// Speeds at or below this count as standstill (mm/s).
const SPEED_EPS: f64 = 1e-6;

/// Last-resort speed for phases with no usable speed (mm/s).
const FALLBACK_SPEED_MM_S: f64 = 1.0;

/// Stepper failures.
#[derive(Debug, Error)]
pub enum StepperError {
    /// Neither the caller nor the device supplied a steps-per-mm factor.
    #[error("steps per mm is not set (a device profile is required)")]
    NoStepsPerMm,

    /// A phase ended up with a non-positive duration.
    #[error("invalid duration {duration_s} s for block {seq}")]
    InvalidTiming {
        /// Block sequence number.
        seq: u64,
        /// Computed duration.
        duration_s: f64,
    },

    /// The device rejected a phase.
    #[error("device failure: {0}")]
    Device(#[from] DeviceError),
}

/// Feeds planned blocks to a motion device.
pub struct Stepper<'d> {
    device: Option<&'d mut dyn MotionDevice>,
    steps_per_mm: f64,
    emitted_blocks: u64,
}

impl<'d> Stepper<'d> {
    /// Build a stepper.
    ///
    /// A positive `steps_per_mm` wins; otherwise the device's value is
    /// used. Without either the stepper cannot convert millimetres.
    pub fn new(
        device: Option<&'d mut dyn MotionDevice>,
        steps_per_mm: Option<f64>,
    ) -> Result<Self, StepperError> {
        let resolved = steps_per_mm
            .filter(|s| *s > 0.0 && s.is_finite())
            .or_else(|| device.as_ref().and_then(|d| d.steps_per_mm()));
        let Some(steps_per_mm) = resolved else {
            error!("Stepper: steps per mm is not set");
            return Err(StepperError::NoStepsPerMm);
        };
        Ok(Self {
            device,
            steps_per_mm,
            emitted_blocks: 0,
        })
    }

    /// Conversion factor in use.
    pub fn steps_per_mm(&self) -> f64 {
        self.steps_per_mm
    }

    /// Blocks fully emitted so far.
    pub fn emitted_blocks(&self) -> u64 {
        self.emitted_blocks
    }

    /// Split `block` into phases and emit them in order.
    ///
    /// With `dry_run` or without a device the phases are only logged.
    /// Blocks shorter than the stepper epsilon are no-ops.
    pub fn submit_block(&mut self, block: &PlanBlock, dry_run: bool) -> Result<(), StepperError> {
        if block.length < STEPPER_EPS_MM {
            return Ok(());
        }

        let phases = split_block(block, self.steps_per_mm);
        let send = !dry_run && self.device.is_some();
        debug!(
            "Stepper: block {} delta=({:.3},{:.3}) len={:.3} cruise={:.3} phases={} pen={} mode={}",
            block.seq,
            block.delta.x,
            block.delta.y,
            block.length,
            block.cruise_speed,
            phases.len(),
            block.pen_down,
            if send { "send" } else { "simulate" }
        );

        for (index, phase) in phases.iter().enumerate() {
            if phase.distance_mm <= STEPPER_EPS_MM || phase.is_empty() {
                continue;
            }
            if !(phase.duration_s > 0.0) {
                error!("Stepper: invalid phase duration in block {}", block.seq);
                return Err(StepperError::InvalidTiming {
                    seq: block.seq,
                    duration_s: phase.duration_s,
                });
            }
            trace!(
                "Stepper: block {} phase {}/{} dist={:.4} v0={:.3} v1={:.3} A={} B={} t={:.4}",
                block.seq,
                index + 1,
                phases.len(),
                phase.distance_mm,
                phase.start_speed,
                phase.end_speed,
                phase.steps_a,
                phase.steps_b,
                phase.duration_s
            );
            if send && let Some(device) = self.device.as_deref_mut() {
                device.move_phase(phase).inspect_err(|e| {
                    error!("Stepper: failed to send block {} phase {}: {e}", block.seq, index + 1);
                })?;
            }
        }

        self.emitted_blocks += 1;
        Ok(())
    }
}

/// CoreXY motor step totals `(A, B)` for a block.
pub fn block_steps(block: &PlanBlock, steps_per_mm: f64) -> (i32, i32) {
    let x = (block.delta.x * steps_per_mm).round() as i32;
    let y = (block.delta.y * steps_per_mm).round() as i32;
    (x.saturating_add(y), x.saturating_sub(y))
}

/// Split a block into its non-negligible phases.
///
/// Step counts are proportional to phase distance except for the last
/// phase, which receives whatever is left of the block totals.
pub fn split_block(block: &PlanBlock, steps_per_mm: f64) -> Vec<PhaseMove> {
    let (total_a, total_b) = block_steps(block, steps_per_mm);

    let mut phases: Vec<PhaseMove> = [
        (block.accel_distance, block.start_speed, block.cruise_speed),
        (block.cruise_distance, block.cruise_speed, block.cruise_speed),
        (block.decel_distance, block.cruise_speed, block.end_speed),
    ]
    .into_iter()
    .filter(|(distance, _, _)| *distance > STEPPER_EPS_MM)
    .map(|(distance_mm, start_speed, end_speed)| PhaseMove {
        distance_mm,
        start_speed,
        end_speed,
        ..PhaseMove::default()
    })
    .collect();

    if phases.is_empty() {
        phases.push(PhaseMove {
            distance_mm: block.length,
            start_speed: block.start_speed,
            end_speed: block.end_speed,
            ..PhaseMove::default()
        });
    }

    let count = phases.len();
    let (mut used_a, mut used_b) = (0i64, 0i64);
    for (i, phase) in phases.iter_mut().enumerate() {
        if i + 1 == count {
            phase.steps_a = saturate_i32(i64::from(total_a) - used_a);
            phase.steps_b = saturate_i32(i64::from(total_b) - used_b);
        } else {
            let fraction = if block.length > STEPPER_EPS_MM {
                phase.distance_mm / block.length
            } else {
                0.0
            };
            phase.steps_a = (f64::from(total_a) * fraction).round() as i32;
            phase.steps_b = (f64::from(total_b) * fraction).round() as i32;
        }
        used_a += i64::from(phase.steps_a);
        used_b += i64::from(phase.steps_b);
        phase.duration_s = phase_duration(phase, block);
    }
    phases
}

/// Constant-acceleration travel time of a phase.
fn phase_duration(phase: &PhaseMove, block: &PlanBlock) -> f64 {
    let (d, v0, v1) = (phase.distance_mm, phase.start_speed, phase.end_speed);
    if !(d > 0.0) {
        return 0.0;
    }
    if v0 + v1 > SPEED_EPS {
        return 2.0 * d / (v0 + v1);
    }
    let mut speed = v0.max(v1);
    if !(speed > SPEED_EPS) {
        speed = block.cruise_speed.max(block.nominal_speed);
    }
    if !(speed > SPEED_EPS) {
        speed = FALLBACK_SPEED_MM_S;
    }
    d / speed
}

fn saturate_i32(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2;
    use crate::planner::{PlannerLimits, plan};
    use cplot_common::hal::error::DeviceResult;

    // ─── Helpers ────────────────────────────────────────────────────

    #[derive(Default)]
    struct Recorder {
        phases: Vec<PhaseMove>,
        fail: bool,
    }

    impl MotionDevice for Recorder {
        fn steps_per_mm(&self) -> Option<f64> {
            Some(80.0)
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn move_phase(&mut self, phase: &PhaseMove) -> DeviceResult<()> {
            if self.fail {
                return Err(DeviceError::NotConnected);
            }
            self.phases.push(*phase);
            Ok(())
        }
    }

    fn block(dx: f64, dy: f64, v0: f64, vc: f64, v1: f64, a: f64, c: f64, d: f64) -> PlanBlock {
        let delta = Point2::new(dx, dy);
        let length = delta.length();
        PlanBlock {
            seq: 1,
            delta,
            length,
            unit: delta * (1.0 / length),
            start_speed: v0,
            cruise_speed: vc,
            end_speed: v1,
            nominal_speed: vc,
            accel_distance: a,
            cruise_distance: c,
            decel_distance: d,
            accel: 500.0,
            pen_down: true,
        }
    }

    // ─── Tests ──────────────────────────────────────────────────────

    #[test]
    fn three_phases_with_exact_step_totals() {
        let b = block(10.0, 3.0, 0.0, 50.0, 0.0, 2.5, 10.44 - 5.0, 2.5);
        let phases = split_block(&b, 80.0);
        assert_eq!(phases.len(), 3);
        let (a, bb) = block_steps(&b, 80.0);
        assert_eq!((a, bb), (800 + 240, 800 - 240));
        assert_eq!(phases.iter().map(|p| p.steps_a).sum::<i32>(), a);
        assert_eq!(phases.iter().map(|p| p.steps_b).sum::<i32>(), bb);
    }

    #[test]
    fn durations_follow_constant_acceleration() {
        let b = block(10.0, 0.0, 0.0, 50.0, 10.0, 2.5, 5.0, 2.5);
        let phases = split_block(&b, 80.0);
        assert!((phases[0].duration_s - 2.0 * 2.5 / 50.0).abs() < 1e-12);
        assert!((phases[1].duration_s - 5.0 / 50.0).abs() < 1e-12);
        assert!((phases[2].duration_s - 2.0 * 2.5 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn standstill_phase_uses_fallback_speed() {
        let mut b = block(1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        b.nominal_speed = 0.0;
        let phases = split_block(&b, 80.0);
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].duration_s, 1.0);
        assert_eq!(phases[0].steps_a, 80);
    }

    #[test]
    fn missing_steps_per_mm_is_an_error() {
        assert!(matches!(
            Stepper::new(None, None),
            Err(StepperError::NoStepsPerMm)
        ));
        assert!(matches!(
            Stepper::new(None, Some(0.0)),
            Err(StepperError::NoStepsPerMm)
        ));
    }

    #[test]
    fn phases_are_sent_to_device() {
        let mut dev = Recorder::default();
        {
            let mut stepper = Stepper::new(Some(&mut dev), None).unwrap();
            assert_eq!(stepper.steps_per_mm(), 80.0);
            let b = block(10.0, 0.0, 0.0, 50.0, 0.0, 2.5, 5.0, 2.5);
            stepper.submit_block(&b, false).unwrap();
            assert_eq!(stepper.emitted_blocks(), 1);
        }
        assert_eq!(dev.phases.len(), 3);
        assert_eq!(dev.phases.iter().map(|p| p.steps_a).sum::<i32>(), 800);
    }

    #[test]
    fn dry_run_sends_nothing() {
        let mut dev = Recorder::default();
        {
            let mut stepper = Stepper::new(Some(&mut dev), None).unwrap();
            let b = block(10.0, 0.0, 0.0, 50.0, 0.0, 2.5, 5.0, 2.5);
            stepper.submit_block(&b, true).unwrap();
            assert_eq!(stepper.emitted_blocks(), 1);
        }
        assert!(dev.phases.is_empty());
    }

    #[test]
    fn device_failure_propagates() {
        let mut dev = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let mut stepper = Stepper::new(Some(&mut dev), None).unwrap();
        let b = block(10.0, 0.0, 0.0, 50.0, 0.0, 2.5, 5.0, 2.5);
        let err = stepper.submit_block(&b, false).unwrap_err();
        assert!(matches!(err, StepperError::Device(DeviceError::NotConnected)));
        assert_eq!(stepper.emitted_blocks(), 0);
    }

    #[test]
    fn degenerate_blocks_are_skipped() {
        let mut dev = Recorder::default();
        {
            let mut stepper = Stepper::new(Some(&mut dev), None).unwrap();
            // Sub-step move: all phases carry zero steps.
            let b = block(0.001, 0.0, 0.0, 1.0, 0.0, 0.0, 0.001, 0.0);
            stepper.submit_block(&b, false).unwrap();
        }
        assert!(dev.phases.is_empty());
    }

    #[test]
    fn planned_path_keeps_step_totals() {
        let limits = PlannerLimits::for_profile(50.0, 500.0, 0.2, 0.05);
        let segs: Vec<_> = [(10.0, 0.0), (10.3, 7.7), (-4.1, 2.2), (0.0, 0.0)]
            .into_iter()
            .map(|(x, y)| crate::geometry::Segment::draw(Point2::new(x, y), 40.0))
            .collect();
        let blocks = plan(&limits, Point2::ZERO, &segs).unwrap();
        for b in &blocks {
            let (a, bb) = block_steps(b, 80.0);
            let phases = split_block(b, 80.0);
            assert_eq!(phases.iter().map(|p| p.steps_a).sum::<i32>(), a);
            assert_eq!(phases.iter().map(|p| p.steps_b).sum::<i32>(), bb);
        }
    }
}
