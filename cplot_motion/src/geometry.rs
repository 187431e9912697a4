//! Planar geometry primitives and the polyline → segment conversion.
//!
//! All coordinates are millimetres in the plotter's local XY frame.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Distance below which a polyline start counts as "already there".
const TRAVEL_EPS_MM: f64 = 1e-6;

/// Per-axis tolerance for dropping repeated polyline points.
const POINT_EPS_MM: f64 = 1e-9;

/// Point (or displacement) in the XY plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    /// X coordinate (mm).
    pub x: f64,
    /// Y coordinate (mm).
    pub y: f64,
}

impl Point2 {
    /// Origin.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Construct from coordinates.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean norm.
    #[inline]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Dot product.
    #[inline]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        (other - self).length()
    }

    /// `true` when both axes differ by at most `eps`.
    #[inline]
    pub fn approx_eq(self, other: Self, eps: f64) -> bool {
        (self.x - other.x).abs() <= eps && (self.y - other.y).abs() <= eps
    }
}

impl Add for Point2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point2 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl From<[f64; 2]> for Point2 {
    fn from([x, y]: [f64; 2]) -> Self {
        Self::new(x, y)
    }
}

/// One linear move requested from the planner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Absolute end point (mm).
    pub target: Point2,
    /// Desired speed (mm/s).
    pub feed: f64,
    /// Pen lowered while moving.
    pub pen_down: bool,
}

impl Segment {
    /// Pen-down drawing move.
    pub const fn draw(target: Point2, feed: f64) -> Self {
        Self {
            target,
            feed,
            pen_down: true,
        }
    }

    /// Pen-up travel move.
    pub const fn travel(target: Point2, feed: f64) -> Self {
        Self {
            target,
            feed,
            pen_down: false,
        }
    }
}

/// Ordered list of points drawn with the pen down.
pub type Polyline = Vec<Point2>;

/// Flatten polylines into planner segments.
///
/// The start position is the first point of the first non-empty polyline.
/// A pen-up travel is inserted whenever the next polyline starts away from
/// the current position. Repeated points are skipped. Returns `None` when
/// there is nothing to draw.
pub fn segments_from_polylines(
    polylines: &[Polyline],
    feed: f64,
) -> Option<(Point2, Vec<Segment>)> {
    let start = polylines.iter().find_map(|p| p.first().copied())?;
    let mut current = start;
    let mut segments = Vec::new();

    for polyline in polylines {
        let Some((&first, rest)) = polyline.split_first() else {
            continue;
        };
        if current.distance(first) > TRAVEL_EPS_MM {
            segments.push(Segment::travel(first, feed));
            current = first;
        }
        for &point in rest {
            if point.approx_eq(current, POINT_EPS_MM) {
                continue;
            }
            segments.push(Segment::draw(point, feed));
            current = point;
        }
    }

    if segments.is_empty() {
        return None;
    }
    Some((start, segments))
}
