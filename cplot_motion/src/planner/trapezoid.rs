//! Trapezoidal speed profile of a single block.

use serde::Serialize;

/// Acceleration used when the configured one is unusable.
const FALLBACK_ACCEL: f64 = 1000.0;

/// Accelerate / cruise / decelerate split of one block.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Trapezoid {
    /// Clamped entry speed (mm/s).
    pub start_speed: f64,
    /// Peak speed actually reached (mm/s).
    pub cruise_speed: f64,
    /// Clamped exit speed (mm/s).
    pub end_speed: f64,
    /// Ramp-up distance (mm).
    pub accel_distance: f64,
    /// Constant-speed distance (mm).
    pub cruise_distance: f64,
    /// Ramp-down distance (mm).
    pub decel_distance: f64,
    /// Acceleration used for both ramps (mm/s²).
    pub accel: f64,
}

/// Compute the profile for a block of `length` mm.
///
/// `v0`/`v1` are clamped to `[0, max_speed]` and `nominal` to `max_speed`.
/// When both ramps do not fit, the peak is lowered to the speed where they
/// meet; any residual floating overshoot is scaled away so the three
/// distances always sum to `length`.
pub fn compute_trapezoid(
    length: f64,
    v0: f64,
    v1: f64,
    nominal: f64,
    max_speed: f64,
    max_accel: f64,
) -> Trapezoid {
    let v0 = clamp_speed(v0, max_speed);
    let v1 = clamp_speed(v1, max_speed);
    let accel = if max_accel > 0.0 {
        max_accel
    } else {
        FALLBACK_ACCEL
    };

    if !(length > 0.0) {
        let cruise = v0.max(v1);
        return Trapezoid {
            start_speed: v0,
            cruise_speed: cruise,
            end_speed: v1,
            accel,
            ..Trapezoid::default()
        };
    }

    let vmax = if nominal > 0.0 && nominal <= max_speed {
        nominal
    } else {
        max_speed
    };

    let ramp = |from: f64, to: f64| ((to * to - from * from) / (2.0 * accel)).max(0.0);
    let mut cruise_speed = vmax;
    let mut accel_distance = ramp(v0, vmax);
    let mut decel_distance = ramp(v1, vmax);

    if accel_distance + decel_distance > length {
        let peak_sq = (2.0 * accel * length + v0 * v0 + v1 * v1).max(0.0) / 2.0;
        let peak = peak_sq.sqrt().max(v0.max(v1)).min(vmax);
        cruise_speed = peak;
        accel_distance = ramp(v0, peak);
        decel_distance = ramp(v1, peak);

        let sum = accel_distance + decel_distance;
        if sum > length && sum > 0.0 {
            let scale = length / sum;
            accel_distance *= scale;
            decel_distance *= scale;
        }
    }

    let cruise_distance = (length - accel_distance - decel_distance).max(0.0);

    Trapezoid {
        start_speed: v0.min(cruise_speed),
        cruise_speed,
        end_speed: v1.min(cruise_speed),
        accel_distance,
        cruise_distance,
        decel_distance,
        accel,
    }
}

fn clamp_speed(v: f64, max_speed: f64) -> f64 {
    if v > 0.0 { v.min(max_speed) } else { 0.0 }
}
