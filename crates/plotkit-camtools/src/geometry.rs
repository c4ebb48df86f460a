//! Geometry utilities for polylines.
//!
//! Points, distances, collinearity tests and tolerance-based equality used by
//! the optimizer and the emitter.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

use crate::error::{CamToolError, CamToolResult, ParameterError};

/// A 2-D point in drawing units or millimeters, depending on the stage
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// True when the points lie within `tolerance` of each other
    pub fn approx_eq(&self, other: &Point, tolerance: f64) -> bool {
        self.distance_to(other) <= tolerance
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

/// Signed cross product of `(b - a) × (c - a)`.
///
/// Twice the signed area of triangle `abc`; zero when the points are collinear.
pub fn cross(a: &Point, b: &Point, c: &Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Whether `b` lies on the line through `a` and `c`, within an area tolerance
pub fn are_collinear(a: &Point, b: &Point, c: &Point, tolerance: f64) -> bool {
    cross(a, b, c).abs() < tolerance
}

/// Shortest distance from `p` to the segment `a`-`b`
pub fn point_segment_distance(p: &Point, a: &Point, b: &Point) -> f64 {
    let ab = *b - *a;
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    if len_sq == 0.0 {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len_sq).clamp(0.0, 1.0);
    p.distance_to(&(*a + ab * t))
}

/// Sum of segment lengths along a polyline
pub fn path_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}

/// An ordered polyline, optionally tagged with a tool/color (1..4)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Path {
    pub points: Vec<Point>,
    #[serde(default)]
    pub tool: Option<u8>,
}

impl Path {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points, tool: None }
    }

    pub fn with_tool(points: Vec<Point>, tool: u8) -> Self {
        Self {
            points,
            tool: Some(tool),
        }
    }

    /// Paths with fewer than two points draw nothing
    pub fn is_drawable(&self) -> bool {
        self.points.len() >= 2
    }

    pub fn start(&self) -> Option<Point> {
        self.points.first().copied()
    }

    pub fn end(&self) -> Option<Point> {
        self.points.last().copied()
    }

    pub fn length(&self) -> f64 {
        path_length(&self.points)
    }

    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// A copy with the point order reversed
    pub fn reversed(&self) -> Path {
        let mut points = self.points.clone();
        points.reverse();
        Path {
            points,
            tool: self.tool,
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    /// Bounds of every point in `paths`, or `None` when there are no points
    pub fn of_paths(paths: &[Path]) -> Option<Bounds> {
        let mut points = paths.iter().flat_map(|p| p.points.iter());
        let first = *points.next()?;
        Some(points.fold(
            Bounds {
                min: first,
                max: first,
            },
            |b, p| Bounds {
                min: Point::new(b.min.x.min(p.x), b.min.y.min(p.y)),
                max: Point::new(b.max.x.max(p.x), b.max.y.max(p.y)),
            },
        ))
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}

#[derive(Debug, Deserialize)]
struct PathRecord {
    points: Vec<[f64; 2]>,
    #[serde(default)]
    tool: Option<u8>,
}

/// Parse polylines from JSON: `[{"points": [[x, y], ...], "tool": 1}, ...]`
pub fn paths_from_json(text: &str) -> CamToolResult<Vec<Path>> {
    let records: Vec<PathRecord> = serde_json::from_str(text)?;
    if records.is_empty() {
        return Err(CamToolError::EmptyInput("no paths in input".to_string()));
    }

    records
        .into_iter()
        .map(|record| {
            if let Some(tool) = record.tool {
                if !(1..=4).contains(&tool) {
                    return Err(CamToolError::from(ParameterError::OutOfRange {
                        name: "tool".to_string(),
                        value: f64::from(tool),
                        min: 1.0,
                        max: 4.0,
                    }));
                }
            }
            Ok(Path {
                points: record.points.iter().map(|&[x, y]| Point::new(x, y)).collect(),
                tool: record.tool,
            })
        })
        .collect()
}
