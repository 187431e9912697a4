//! Look-ahead trajectory planner.
//!
//! Turns an ordered list of linear [`Segment`]s into [`PlanBlock`]s, each
//! carrying a trapezoidal speed profile that respects the machine limits,
//! cornering speeds between blocks, and a full stop at the end of the path.
//!
//! # Module Structure
//!
//! - [`junction`] - cornering speed between two directions
//! - [`trapezoid`] - per-block accelerate/cruise/decelerate split
//!
//! Planning is a pure batch transform: the limits travel with the
//! [`Planner`] value, so independent paths may be planned concurrently.

pub mod junction;
pub mod trapezoid;

pub use junction::junction_speed;
pub use trapezoid::{Trapezoid, compute_trapezoid};

use crate::geometry::{Point2, Segment};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

/// Segments at or below this length only advance the position.
pub const EPSILON_MM: f64 = 1e-6;

/// Minimum cosine between a block and its extension for a merge (≈2.6°).
const MERGE_MIN_COS: f64 = 0.999;

// ─── Limits ─────────────────────────────────────────────────────────

/// Global physical limits of one planning run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlannerLimits {
    /// Top speed (mm/s), > 0.
    pub max_speed: f64,
    /// Acceleration (mm/s²), > 0.
    pub max_accel: f64,
    /// Junction deviation constant (mm), ≥ 0.
    pub cornering_distance: f64,
    /// Segments shorter than this may be merged (mm), ≥ 0.
    pub min_segment_length: f64,
}

impl PlannerLimits {
    /// Limits from profile speed/acceleration and planner tuning.
    pub const fn for_profile(
        speed_mm_s: f64,
        accel_mm_s2: f64,
        cornering_distance: f64,
        min_segment_length: f64,
    ) -> Self {
        Self {
            max_speed: speed_mm_s,
            max_accel: accel_mm_s2,
            cornering_distance,
            min_segment_length,
        }
    }

    /// Check signs and finiteness of every field.
    pub fn validate(&self) -> Result<(), PlannerError> {
        if !(self.max_speed > 0.0 && self.max_speed.is_finite()) {
            return Err(PlannerError::InvalidLimits(format!(
                "max_speed must be positive, got {}",
                self.max_speed
            )));
        }
        if !(self.max_accel > 0.0 && self.max_accel.is_finite()) {
            return Err(PlannerError::InvalidLimits(format!(
                "max_accel must be positive, got {}",
                self.max_accel
            )));
        }
        if !(self.cornering_distance >= 0.0 && self.cornering_distance.is_finite()) {
            return Err(PlannerError::InvalidLimits(format!(
                "cornering_distance must be non-negative, got {}",
                self.cornering_distance
            )));
        }
        if !(self.min_segment_length >= 0.0 && self.min_segment_length.is_finite()) {
            return Err(PlannerError::InvalidLimits(format!(
                "min_segment_length must be non-negative, got {}",
                self.min_segment_length
            )));
        }
        Ok(())
    }

    /// Nominal speed of a segment: its feed, capped at `max_speed`.
    /// Non-positive or non-finite feeds fall back to `max_speed`.
    fn nominal_for(&self, feed: f64) -> f64 {
        if feed > 0.0 && feed.is_finite() {
            feed.min(self.max_speed)
        } else {
            self.max_speed
        }
    }
}

/// Planner failures. Planning produces no partial output.
#[derive(Debug, Error, PartialEq)]
pub enum PlannerError {
    /// A limit is out of range.
    #[error("invalid planner limits: {0}")]
    InvalidLimits(String),

    /// Block storage could not be reserved.
    #[error("cannot allocate {requested} planner blocks")]
    Allocation {
        /// Number of blocks requested.
        requested: usize,
    },
}

// ─── Output ─────────────────────────────────────────────────────────

/// One planned linear move with its speed profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlanBlock {
    /// Sequence number, starting at 1.
    pub seq: u64,
    /// Displacement (mm).
    pub delta: Point2,
    /// Length of `delta` (mm).
    pub length: f64,
    /// Unit direction.
    pub unit: Point2,
    /// Entry speed (mm/s).
    pub start_speed: f64,
    /// Peak speed (mm/s).
    pub cruise_speed: f64,
    /// Exit speed (mm/s).
    pub end_speed: f64,
    /// Requested speed after limiting (mm/s).
    pub nominal_speed: f64,
    /// Ramp-up distance (mm).
    pub accel_distance: f64,
    /// Constant-speed distance (mm).
    pub cruise_distance: f64,
    /// Ramp-down distance (mm).
    pub decel_distance: f64,
    /// Acceleration used (mm/s²).
    pub accel: f64,
    /// Pen lowered during the move.
    pub pen_down: bool,
}

// ─── Planner ────────────────────────────────────────────────────────

/// Working record of one block during planning.
#[derive(Debug, Clone, Copy)]
struct Node {
    seq: u64,
    origin: Point2,
    delta: Point2,
    length: f64,
    unit: Point2,
    nominal: f64,
    max_entry: f64,
    entry: f64,
    exit: f64,
    pen_down: bool,
}

impl Node {
    fn new(seq: u64, origin: Point2, target: Point2, nominal: f64, pen_down: bool) -> Self {
        let delta = target - origin;
        let length = delta.length();
        Self {
            seq,
            origin,
            delta,
            length,
            unit: delta * (1.0 / length),
            nominal,
            max_entry: 0.0,
            entry: 0.0,
            exit: 0.0,
            pen_down,
        }
    }
}

/// Planner bound to validated limits.
#[derive(Debug, Clone)]
pub struct Planner {
    limits: PlannerLimits,
}

impl Planner {
    /// Validate `limits` and build a planner.
    pub fn new(limits: PlannerLimits) -> Result<Self, PlannerError> {
        limits.validate()?;
        Ok(Self { limits })
    }

    /// Limits in use.
    pub fn limits(&self) -> &PlannerLimits {
        &self.limits
    }

    /// Plan `segments` starting from `start`.
    pub fn plan(&self, start: Point2, segments: &[Segment]) -> Result<Vec<PlanBlock>, PlannerError> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        let mut nodes = self.intake(start, segments)?;
        self.apply_junction_limits(&mut nodes);
        self.reconcile_speeds(&mut nodes);

        let blocks: Vec<PlanBlock> = nodes.iter().map(|n| self.finish(n)).collect();
        debug!(
            "Planned {} segments into {} blocks",
            segments.len(),
            blocks.len()
        );
        Ok(blocks)
    }

    /// Drop degenerate segments and merge short collinear ones.
    fn intake(&self, start: Point2, segments: &[Segment]) -> Result<Vec<Node>, PlannerError> {
        let mut nodes: Vec<Node> = Vec::new();
        nodes
            .try_reserve_exact(segments.len())
            .map_err(|_| PlannerError::Allocation {
                requested: segments.len(),
            })?;

        let mut current = start;
        let mut next_seq = 0u64;

        for segment in segments {
            let length = current.distance(segment.target);
            if length <= EPSILON_MM {
                current = segment.target;
                continue;
            }

            let nominal = self.limits.nominal_for(segment.feed);

            if length < self.limits.min_segment_length
                && let Some(last) = nodes.last_mut()
                && try_merge(last, segment, nominal)
            {
                trace!("Merged short segment into block {}", last.seq);
                current = segment.target;
                continue;
            }

            next_seq += 1;
            nodes.push(Node::new(
                next_seq,
                current,
                segment.target,
                nominal,
                segment.pen_down,
            ));
            current = segment.target;
        }

        Ok(nodes)
    }

    fn apply_junction_limits(&self, nodes: &mut [Node]) {
        let max_speed = self.limits.max_speed;
        let Some(first) = nodes.first_mut() else {
            return;
        };
        first.max_entry = first.nominal.min(max_speed).max(0.0);

        for i in 1..nodes.len() {
            let (prev, curr) = (nodes[i - 1], nodes[i]);
            let junction = junction_speed(&self.limits, prev.unit, curr.unit).max(0.0);
            nodes[i].max_entry = junction
                .min(prev.nominal)
                .min(curr.nominal)
                .min(max_speed)
                .max(0.0);
        }
    }

    /// Backward pass then forward pass.
    fn reconcile_speeds(&self, nodes: &mut [Node]) {
        let accel = self.limits.max_accel;
        let reach = |v: f64, length: f64| (v * v + 2.0 * accel * length).max(0.0).sqrt();

        let Some(last) = nodes.last_mut() else {
            return;
        };
        last.exit = 0.0;
        last.entry = last.max_entry.min(reach(0.0, last.length)).max(0.0);

        for i in (0..nodes.len() - 1).rev() {
            let exit = nodes[i + 1].entry;
            let node = &mut nodes[i];
            node.exit = exit;
            node.entry = node.max_entry.min(reach(exit, node.length)).max(0.0);
        }

        for i in 0..nodes.len() - 1 {
            let reachable = reach(nodes[i].entry, nodes[i].length);
            if nodes[i + 1].entry > reachable {
                nodes[i + 1].entry = reachable;
            }
            let next_entry = nodes[i + 1].entry;
            let node = &mut nodes[i];
            node.exit = next_entry.min(node.nominal);
            node.entry = node.entry.min(node.nominal);
        }

        if let Some(last) = nodes.last_mut() {
            last.entry = last.entry.min(last.nominal);
        }
    }

    fn finish(&self, node: &Node) -> PlanBlock {
        let profile = compute_trapezoid(
            node.length,
            node.entry,
            node.exit,
            node.nominal,
            self.limits.max_speed,
            self.limits.max_accel,
        );
        trace!(
            "Block #{} len={:.3} v0={:.3} v1={:.3} vc={:.3} a/c/d={:.3}/{:.3}/{:.3} pen={}",
            node.seq,
            node.length,
            profile.start_speed,
            profile.end_speed,
            profile.cruise_speed,
            profile.accel_distance,
            profile.cruise_distance,
            profile.decel_distance,
            node.pen_down
        );
        PlanBlock {
            seq: node.seq,
            delta: node.delta,
            length: node.length,
            unit: node.unit,
            start_speed: profile.start_speed,
            cruise_speed: profile.cruise_speed,
            end_speed: profile.end_speed,
            nominal_speed: node.nominal,
            accel_distance: profile.accel_distance,
            cruise_distance: profile.cruise_distance,
            decel_distance: profile.decel_distance,
            accel: profile.accel,
            pen_down: node.pen_down,
        }
    }
}

/// Extend `last` to `segment.target` when the combined move stays within
/// the merge cone and keeps the pen state.
fn try_merge(last: &mut Node, segment: &Segment, nominal: f64) -> bool {
    if last.pen_down != segment.pen_down {
        return false;
    }
    let delta = segment.target - last.origin;
    let length = delta.length();
    if length <= EPSILON_MM {
        return false;
    }
    let unit = delta * (1.0 / length);
    if last.unit.dot(unit).min(1.0) < MERGE_MIN_COS {
        return false;
    }
    last.delta = delta;
    last.length = length;
    last.unit = unit;
    if last.nominal <= 0.0 || nominal < last.nominal {
        last.nominal = nominal;
    }
    true
}

/// Plan in one call.
pub fn plan(
    limits: &PlannerLimits,
    start: Point2,
    segments: &[Segment],
) -> Result<Vec<PlanBlock>, PlannerError> {
    Planner::new(*limits)?.plan(start, segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Helpers ────────────────────────────────────────────────────

    fn limits(cornering: f64, min_segment: f64) -> PlannerLimits {
        PlannerLimits {
            max_speed: 50.0,
            max_accel: 500.0,
            cornering_distance: cornering,
            min_segment_length: min_segment,
        }
    }

    fn draw(x: f64, y: f64) -> Segment {
        Segment::draw(Point2::new(x, y), 50.0)
    }

    fn assert_invariants(l: &PlannerLimits, blocks: &[PlanBlock]) {
        for b in blocks {
            for v in [b.start_speed, b.cruise_speed, b.end_speed] {
                assert!((0.0..=l.max_speed).contains(&v), "block {}: {v}", b.seq);
            }
            let sum = b.accel_distance + b.cruise_distance + b.decel_distance;
            assert!((sum - b.length).abs() < 1e-6, "block {}: {sum} vs {}", b.seq, b.length);
        }
        for pair in blocks.windows(2) {
            let j = junction_speed(l, pair[0].unit, pair[1].unit);
            assert!(pair[1].start_speed <= j + 1e-9);
        }
        if let Some(last) = blocks.last() {
            assert_eq!(last.end_speed, 0.0);
        }
    }

    // ─── Validation ─────────────────────────────────────────────────

    #[test]
    fn invalid_limits_are_rejected() {
        let bad = [
            PlannerLimits { max_speed: 0.0, ..limits(0.1, 0.1) },
            PlannerLimits { max_accel: -1.0, ..limits(0.1, 0.1) },
            PlannerLimits { max_speed: f64::INFINITY, ..limits(0.1, 0.1) },
            limits(-0.1, 0.1),
            limits(0.1, f64::NAN),
        ];
        for l in bad {
            assert!(matches!(
                plan(&l, Point2::ZERO, &[draw(1.0, 0.0)]),
                Err(PlannerError::InvalidLimits(_))
            ));
        }
    }

    #[test]
    fn empty_input_is_empty_success() {
        assert_eq!(plan(&limits(0.1, 0.1), Point2::ZERO, &[]).unwrap(), vec![]);
    }

    // ─── Intake ─────────────────────────────────────────────────────

    #[test]
    fn zero_length_segments_are_dropped() {
        let segs = [draw(0.0, 0.0), draw(5.0, 0.0), draw(5.0, 0.0), draw(5.0, 5.0)];
        let blocks = plan(&limits(0.1, 0.0), Point2::ZERO, &segs).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].seq, 1);
        assert_eq!(blocks[1].seq, 2);
        assert_eq!(blocks[1].delta, Point2::new(0.0, 5.0));
    }

    #[test]
    fn feed_is_capped_and_invalid_feed_falls_back() {
        let segs = [
            Segment::draw(Point2::new(10.0, 0.0), 500.0),
            Segment::draw(Point2::new(20.0, 0.0), f64::NAN),
            Segment::draw(Point2::new(30.0, 0.0), 10.0),
        ];
        let blocks = plan(&limits(0.1, 0.0), Point2::ZERO, &segs).unwrap();
        assert_eq!(blocks[0].nominal_speed, 50.0);
        assert_eq!(blocks[1].nominal_speed, 50.0);
        assert_eq!(blocks[2].nominal_speed, 10.0);
    }

    #[test]
    fn short_collinear_segments_merge() {
        let l = limits(0.1, 1.0);
        let segs = [
            draw(10.0, 0.0),
            Segment::draw(Point2::new(10.5, 0.0), 20.0),
            draw(10.9, 0.01),
        ];
        let blocks = plan(&l, Point2::ZERO, &segs).unwrap();
        assert_eq!(blocks.len(), 1);
        assert!((blocks[0].length - Point2::new(10.9, 0.01).length()).abs() < 1e-12);
        assert_eq!(blocks[0].nominal_speed, 20.0);
        assert_invariants(&l, &blocks);
    }

    #[test]
    fn short_turning_segment_is_not_merged() {
        let l = limits(0.1, 1.0);
        let blocks = plan(&l, Point2::ZERO, &[draw(10.0, 0.0), draw(10.0, 0.5)]).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_invariants(&l, &blocks);
    }

    #[test]
    fn short_segment_with_other_pen_state_is_not_merged() {
        let l = limits(0.1, 1.0);
        let segs = [draw(10.0, 0.0), Segment::travel(Point2::new(10.5, 0.0), 50.0)];
        let blocks = plan(&l, Point2::ZERO, &segs).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(!blocks[1].pen_down);
    }

    #[test]
    fn short_first_segment_is_kept() {
        let l = limits(0.1, 1.0);
        let blocks = plan(&l, Point2::ZERO, &[draw(0.5, 0.0), draw(0.5, 10.0)]).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!((blocks[0].length - 0.5).abs() < 1e-12);
    }

    // ─── Speeds ─────────────────────────────────────────────────────

    #[test]
    fn single_block_ends_at_rest() {
        let l = limits(0.2, 0.05);
        let blocks = plan(&l, Point2::ZERO, &[draw(10.0, 0.0)]).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].end_speed, 0.0);
        assert_invariants(&l, &blocks);
    }

    #[test]
    fn collinear_chain_keeps_speed_through_joints() {
        let l = limits(0.2, 0.0);
        let segs = [draw(20.0, 0.0), draw(40.0, 0.0), draw(60.0, 0.0)];
        let blocks = plan(&l, Point2::ZERO, &segs).unwrap();
        assert_eq!(blocks[1].start_speed, 50.0);
        assert_eq!(blocks[1].end_speed, 50.0);
        assert_invariants(&l, &blocks);
    }

    #[test]
    fn right_angle_with_zero_cornering_stops() {
        let l = limits(0.0, 0.0);
        let blocks = plan(&l, Point2::ZERO, &[draw(10.0, 0.0), draw(10.0, 10.0)]).unwrap();
        assert_eq!(blocks[0].end_speed, 0.0);
        assert_eq!(blocks[1].start_speed, 0.0);
        assert_invariants(&l, &blocks);
    }

    #[test]
    fn deceleration_is_propagated_backwards() {
        let l = limits(0.0, 0.0);
        // Long block followed by a tiny one and a hard stop.
        let segs = [draw(100.0, 0.0), draw(100.1, 0.0), draw(100.1, 10.0)];
        let blocks = plan(&l, Point2::ZERO, &segs).unwrap();
        let reach = (2.0_f64 * 500.0 * 0.1).sqrt();
        assert!(blocks[0].end_speed <= reach + 1e-9);
        assert_invariants(&l, &blocks);
    }

    #[test]
    fn zigzag_satisfies_invariants() {
        let l = limits(0.3, 0.2);
        let segs: Vec<Segment> = (1..200)
            .map(|i| {
                let x = i as f64 * 0.7;
                let y = if i % 2 == 0 { 0.0 } else { 1.3 };
                draw(x, y)
            })
            .collect();
        let blocks = plan(&l, Point2::ZERO, &segs).unwrap();
        assert!(!blocks.is_empty());
        assert_invariants(&l, &blocks);
    }
}
