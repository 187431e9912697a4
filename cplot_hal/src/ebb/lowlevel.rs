//! Phase to `LM` conversion.
//!
//! The firmware integrates a 31-bit rate accumulator every 40 µs. A phase
//! with path speeds `v0 → v1` becomes per-motor start rates and a constant
//! per-interval rate delta over `duration / 40 µs` intervals.

use super::command::{ClearFlags, EbbCommand};
use cplot_common::consts::{EBB_LM_INTERVAL_S, EBB_LM_MAX_RATE, EBB_LM_RATE_SCALE};
use cplot_common::hal::types::PhaseMove;

/// Arguments of one `LM` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowLevelMove {
    /// Motor 1 start rate.
    pub rate1: u32,
    /// Motor 1 steps.
    pub steps1: i32,
    /// Motor 1 rate delta per interval.
    pub accel1: i32,
    /// Motor 2 start rate.
    pub rate2: u32,
    /// Motor 2 steps.
    pub steps2: i32,
    /// Motor 2 rate delta per interval.
    pub accel2: i32,
    /// Number of 40 µs intervals the phase spans.
    pub intervals: u32,
}

fn rate_from_steps_per_sec(steps_per_sec: f64) -> u32 {
    let rate = steps_per_sec * EBB_LM_RATE_SCALE;
    if !rate.is_finite() || rate < 0.0 {
        return 0;
    }
    rate.min(f64::from(EBB_LM_MAX_RATE)).round() as u32
}

/// Start rate and per-interval delta of one motor.
fn axis_profile(steps: i32, phase: &PhaseMove, intervals: u32) -> (u32, i32) {
    if steps == 0 {
        return (0, 0);
    }
    let steps_per_mm = f64::from(steps) / phase.distance_mm;
    let start = rate_from_steps_per_sec((phase.start_speed * steps_per_mm).abs());
    let end = rate_from_steps_per_sec((phase.end_speed * steps_per_mm).abs());
    let delta = (f64::from(end) - f64::from(start)) / f64::from(intervals);
    let mut accel = delta
        .round()
        .clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
    if accel == 0 && end != start {
        accel = if end > start { 1 } else { -1 };
    }
    (start, accel)
}

impl LowLevelMove {
    /// Convert a phase, or `None` when it moves nothing.
    ///
    /// The phase duration must be positive; callers check it first.
    pub fn from_phase(phase: &PhaseMove) -> Option<Self> {
        if phase.is_empty() || phase.distance_mm <= 0.0 {
            return None;
        }
        let intervals = (phase.duration_s / EBB_LM_INTERVAL_S).round();
        let intervals = if intervals.is_finite() && intervals >= 1.0 {
            intervals.min(f64::from(u32::MAX)) as u32
        } else {
            1
        };
        let (rate1, accel1) = axis_profile(phase.steps_a, phase, intervals);
        let (rate2, accel2) = axis_profile(phase.steps_b, phase, intervals);
        Some(Self {
            rate1,
            steps1: phase.steps_a,
            accel1,
            rate2,
            steps2: phase.steps_b,
            accel2,
            intervals,
        })
    }

    /// The `LM` command for this move.
    pub fn command(&self, clear: Option<ClearFlags>) -> EbbCommand {
        EbbCommand::LowLevelMove {
            rate1: self.rate1,
            steps1: self.steps1,
            accel1: self.accel1,
            rate2: self.rate2,
            steps2: self.steps2,
            accel2: self.accel2,
            clear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(v0: f64, v1: f64, a: i32, b: i32, duration_s: f64) -> PhaseMove {
        PhaseMove {
            distance_mm: 1.0,
            start_speed: v0,
            end_speed: v1,
            steps_a: a,
            steps_b: b,
            duration_s,
        }
    }

    #[test]
    fn cruise_has_constant_rate() {
        // 80 steps over 1 mm at 10 mm/s: 800 steps/s.
        let lm = LowLevelMove::from_phase(&phase(10.0, 10.0, 80, 0, 0.1)).unwrap();
        assert_eq!(lm.intervals, 2500);
        assert_eq!(lm.rate1, (800.0 * EBB_LM_RATE_SCALE).round() as u32);
        assert_eq!(lm.accel1, 0);
        assert_eq!((lm.rate2, lm.accel2), (0, 0));
    }

    #[test]
    fn ramp_sign_follows_speed_change() {
        let up = LowLevelMove::from_phase(&phase(0.0, 20.0, 80, -80, 0.1)).unwrap();
        assert_eq!(up.rate1, 0);
        assert!(up.accel1 > 0);
        // Direction lives in the step sign; rates stay positive.
        assert_eq!(up.rate2, 0);
        assert!(up.accel2 > 0);
        assert_eq!(up.steps2, -80);

        let down = LowLevelMove::from_phase(&phase(20.0, 0.0, 80, 0, 0.1)).unwrap();
        assert!(down.accel1 < 0);
    }

    #[test]
    fn ramp_delta_rounds_to_nearest() {
        // 0 to 1600 steps/s over 2500 intervals: 137_438_953 / 2500 = 54_975.58.
        let lm = LowLevelMove::from_phase(&phase(0.0, 20.0, 80, 0, 0.1)).unwrap();
        assert_eq!(lm.intervals, 2500);
        assert_eq!(lm.accel1, 54_976);
    }

    #[test]
    fn tiny_rate_change_still_accelerates() {
        let lm = LowLevelMove::from_phase(&phase(10.0, 10.000_01, 80, 0, 10.0)).unwrap();
        assert_eq!(lm.accel1, 1);
    }

    #[test]
    fn short_phase_gets_one_interval() {
        let lm = LowLevelMove::from_phase(&phase(5.0, 5.0, 1, 1, 0.000_001)).unwrap();
        assert_eq!(lm.intervals, 1);
    }

    #[test]
    fn empty_phase_yields_nothing() {
        assert!(LowLevelMove::from_phase(&phase(5.0, 5.0, 0, 0, 0.1)).is_none());
    }

    #[test]
    fn command_carries_clear_flags() {
        let lm = LowLevelMove::from_phase(&phase(10.0, 10.0, 80, 0, 0.1)).unwrap();
        let line = lm.command(Some(ClearFlags::empty())).encode().unwrap();
        assert!(line.starts_with("LM,"));
        assert!(line.ends_with(",80,0,0,0,0,0"), "{line}");
    }
}
