//! Cornering speed at the junction of two consecutive blocks.
//!
//! Junction deviation model: the tool may leave the ideal corner by at most
//! `cornering_distance`, which bounds the centripetal speed through the turn.

use super::PlannerLimits;
use crate::geometry::Point2;

/// Cosine above which two directions count as identical.
const COLLINEAR_COS: f64 = 0.999_999;

/// `sin(θ/2)` below which the turn is treated as straight.
const MIN_SIN_HALF: f64 = 1e-9;

/// Maximum speed through the junction between two unit directions.
///
/// Straight-through junctions allow `max_speed`. With zero cornering
/// distance every real turn forces a full stop. A 180° reversal yields 0.
pub fn junction_speed(limits: &PlannerLimits, prev_unit: Point2, curr_unit: Point2) -> f64 {
    let dot = prev_unit.dot(curr_unit);
    if !dot.is_finite() {
        return 0.0;
    }
    let full = limits.max_speed.max(0.0);
    if dot > COLLINEAR_COS {
        return full;
    }
    if limits.cornering_distance <= 0.0 {
        return 0.0;
    }

    if dot < -COLLINEAR_COS {
        return 0.0;
    }
    let sin_half = (0.5 * (1.0 - dot)).sqrt();
    if sin_half <= MIN_SIN_HALF {
        return full;
    }
    let denom = 1.0 - sin_half;
    if denom <= 0.0 {
        return 0.0;
    }
    let v = (limits.max_accel * limits.cornering_distance * sin_half / denom).sqrt();
    if !v.is_finite() || v <= 0.0 {
        return 0.0;
    }
    v.min(limits.max_speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(cornering: f64) -> PlannerLimits {
        PlannerLimits {
            max_speed: 100.0,
            max_accel: 1000.0,
            cornering_distance: cornering,
            min_segment_length: 0.0,
        }
    }

    const EAST: Point2 = Point2::new(1.0, 0.0);
    const NORTH: Point2 = Point2::new(0.0, 1.0);
    const WEST: Point2 = Point2::new(-1.0, 0.0);

    #[test]
    fn straight_line_allows_full_speed() {
        assert_eq!(junction_speed(&limits(0.5), EAST, EAST), 100.0);
        assert_eq!(junction_speed(&limits(0.0), EAST, EAST), 100.0);
    }

    #[test]
    fn zero_cornering_distance_stops_at_any_turn() {
        assert_eq!(junction_speed(&limits(0.0), EAST, NORTH), 0.0);
        let slight = Point2::new(0.999, 0.0447);
        assert_eq!(junction_speed(&limits(0.0), EAST, slight), 0.0);
    }

    #[test]
    fn right_angle_matches_deviation_formula() {
        let s = (0.5_f64).sqrt();
        let expected = (1000.0 * 0.05 * s / (1.0 - s)).sqrt();
        let v = junction_speed(&limits(0.05), EAST, NORTH);
        assert!((v - expected).abs() < 1e-9, "{v} vs {expected}");
    }

    #[test]
    fn speed_is_capped_at_max_speed() {
        assert_eq!(junction_speed(&limits(1000.0), EAST, NORTH), 100.0);
    }

    #[test]
    fn reversal_is_much_slower_than_right_angle() {
        let l = limits(0.5);
        let reverse = junction_speed(&l, EAST, WEST);
        let corner = junction_speed(&l, EAST, NORTH);
        assert!(reverse < corner);
        assert!(reverse >= 0.0);
    }

    #[test]
    fn full_reversal_stops() {
        assert_eq!(junction_speed(&limits(0.5), EAST, WEST), 0.0);
        assert_eq!(junction_speed(&limits(1000.0), NORTH, Point2::new(0.0, -1.0)), 0.0);
    }

    #[test]
    fn non_finite_direction_stops() {
        assert_eq!(junction_speed(&limits(0.5), EAST, Point2::new(f64::NAN, 0.0)), 0.0);
    }
}
