//! Path Optimizer
//!
//! Turns raw polylines into a smaller, better-ordered set of strokes:
//! artefact filtering, duplicate segment removal, collinear simplification,
//! merging of touching paths and greedy nearest-neighbor ordering.
//!
//! Merging and ordering are heuristics behind the [`MergeStrategy`] and
//! [`OrderStrategy`] traits so other implementations can be plugged in.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ParameterError, ParameterResult};
use crate::geometry::{cross, path_length, Path, Point};

/// Options controlling each optimizer stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerOptions {
    /// Grid size used to round segment endpoints when detecting duplicates
    pub line_tolerance: f64,
    /// Maximum endpoint distance for two paths to be merged
    pub point_tolerance: f64,
    /// Cross-product area below which an interior point is dropped
    pub simplify_tolerance: f64,
    /// Paths shorter than this are treated as artefacts and removed
    pub min_path_length: f64,
    pub remove_artefacts: bool,
    pub remove_duplicates: bool,
    pub simplify: bool,
    pub merge: bool,
    pub reorder: bool,
    /// Pen position before the first stroke
    pub start_point: Point,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            line_tolerance: 0.1,
            point_tolerance: 0.1,
            simplify_tolerance: 0.01,
            min_path_length: 0.0,
            remove_artefacts: true,
            remove_duplicates: true,
            simplify: true,
            merge: true,
            reorder: true,
            start_point: Point::ORIGIN,
        }
    }
}

impl OptimizerOptions {
    pub fn validate(&self) -> ParameterResult<()> {
        ParameterError::require_positive("line_tolerance", self.line_tolerance)?;
        ParameterError::require_non_negative("point_tolerance", self.point_tolerance)?;
        ParameterError::require_non_negative("simplify_tolerance", self.simplify_tolerance)?;
        ParameterError::require_non_negative("min_path_length", self.min_path_length)?;
        Ok(())
    }
}

/// Aggregate statistics for one optimizer run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStats {
    pub paths_before: usize,
    pub paths_after: usize,
    pub segments_before: usize,
    pub segments_after: usize,
    pub artefacts_removed: usize,
    pub duplicates_removed: usize,
    pub paths_merged: usize,
    /// Pen-down distance of the output
    pub draw_distance: f64,
    /// Pen-up distance of the output, starting from the start point
    pub travel_distance: f64,
    /// Pen-up distance of the input in its original order
    pub travel_distance_before: f64,
    /// Travel saved relative to the input order, in percent
    pub travel_reduction_percent: f64,
}

/// Strategy for joining paths whose endpoints touch
pub trait MergeStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Merge paths, returning the new set and the number of merges performed
    fn merge(&self, paths: Vec<Path>, tolerance: f64) -> (Vec<Path>, usize);
}

/// Strategy for ordering and orienting paths to reduce pen-up travel
pub trait OrderStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Reorder paths starting from `start`; must return the same set of paths
    fn order(&self, paths: Vec<Path>, start: Point) -> Vec<Path>;
}

/// Fixpoint pairwise merge, see [`merge_connected_paths`]
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyMerge;

impl MergeStrategy for GreedyMerge {
    fn name(&self) -> &str {
        "greedy-merge"
    }

    fn merge(&self, paths: Vec<Path>, tolerance: f64) -> (Vec<Path>, usize) {
        merge_connected_paths(paths, tolerance)
    }
}

/// Greedy nearest-neighbor ordering, see [`optimize_path_order`]
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestNeighborOrder;

impl OrderStrategy for NearestNeighborOrder {
    fn name(&self) -> &str {
        "nearest-neighbor"
    }

    fn order(&self, paths: Vec<Path>, start: Point) -> Vec<Path> {
        optimize_path_order(paths, start)
    }
}

/// Drop paths with fewer than two points or a drawn length below `min_length`
pub fn remove_short_paths(paths: Vec<Path>, min_length: f64) -> (Vec<Path>, usize) {
    let before = paths.len();
    let kept: Vec<Path> = paths
        .into_iter()
        .filter(|p| p.is_drawable() && p.length() >= min_length)
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

fn grid(value: f64, tolerance: f64) -> i64 {
    (value / tolerance).round() as i64
}

type SegmentKey = ((i64, i64), (i64, i64));

fn segment_key(a: &Point, b: &Point, tolerance: f64) -> SegmentKey {
    let ka = (grid(a.x, tolerance), grid(a.y, tolerance));
    let kb = (grid(b.x, tolerance), grid(b.y, tolerance));
    if ka <= kb {
        (ka, kb)
    } else {
        (kb, ka)
    }
}

/// Remove segments that repeat an earlier segment in either direction.
///
/// Endpoints are snapped to a `tolerance` grid to build the key. A duplicate
/// splits the path it occurs in; segments whose endpoints snap to the same
/// cell are skipped without splitting. Returns the paths and the number of
/// duplicate segments dropped.
pub fn remove_duplicate_segments(paths: Vec<Path>, tolerance: f64) -> (Vec<Path>, usize) {
    let tolerance = tolerance.max(f64::EPSILON);
    let mut seen: HashSet<SegmentKey> = HashSet::new();
    let mut output = Vec::with_capacity(paths.len());
    let mut removed = 0;

    for path in paths {
        let mut current: Vec<Point> = Vec::new();
        for pair in path.points.windows(2) {
            let key = segment_key(&pair[0], &pair[1], tolerance);
            if key.0 == key.1 {
                continue;
            }
            if !seen.insert(key) {
                removed += 1;
                if current.len() >= 2 {
                    output.push(Path {
                        points: std::mem::take(&mut current),
                        tool: path.tool,
                    });
                }
                current.clear();
                continue;
            }
            if current.is_empty() {
                current.push(pair[0]);
            }
            current.push(pair[1]);
        }
        if current.len() >= 2 {
            output.push(Path {
                points: current,
                tool: path.tool,
            });
        }
    }

    (output, removed)
}

/// Drop near-collinear interior points.
///
/// Each candidate is tested against the last kept point and its successor,
/// so long runs of tiny deviations do not accumulate. Endpoints are always
/// kept and paths with fewer than two points are dropped.
pub fn simplify_paths(paths: Vec<Path>, tolerance: f64) -> Vec<Path> {
    paths
        .into_iter()
        .filter(Path::is_drawable)
        .map(|path| {
            let points = &path.points;
            let last = points.len() - 1;
            let mut kept = Vec::with_capacity(points.len());
            kept.push(points[0]);
            for i in 1..last {
                let anchor = kept[kept.len() - 1];
                if cross(&anchor, &points[i], &points[i + 1]).abs() >= tolerance {
                    kept.push(points[i]);
                }
            }
            kept.push(points[last]);
            Path {
                points: kept,
                tool: path.tool,
            }
        })
        .collect()
}

/// Splice `b` onto `a` if any pair of their endpoints touch.
///
/// Cases are tried in order: end to start, end to end (b reversed),
/// start to end (b first) and start to start (b reversed, first).
fn join(a: &[Point], b: &[Point], tolerance: f64) -> Option<Vec<Point>> {
    let (a_start, a_end) = (a.first()?, a.last()?);
    let (b_start, b_end) = (b.first()?, b.last()?);
    let mut joined = Vec::with_capacity(a.len() + b.len() - 1);

    if a_end.approx_eq(b_start, tolerance) {
        joined.extend_from_slice(a);
        joined.extend_from_slice(&b[1..]);
    } else if a_end.approx_eq(b_end, tolerance) {
        joined.extend_from_slice(a);
        joined.extend(b.iter().rev().skip(1));
    } else if a_start.approx_eq(b_end, tolerance) {
        joined.extend_from_slice(b);
        joined.extend_from_slice(&a[1..]);
    } else if a_start.approx_eq(b_start, tolerance) {
        joined.extend(b.iter().rev());
        joined.extend_from_slice(&a[1..]);
    } else {
        return None;
    }
    Some(joined)
}

/// Repeatedly merge paths whose endpoints lie within `tolerance` of each
/// other until no merge is possible.
///
/// Paths with different tool tags are never merged. Returns the merged set
/// and the number of merges performed.
pub fn merge_connected_paths(paths: Vec<Path>, tolerance: f64) -> (Vec<Path>, usize) {
    let mut pool: Vec<Path> = paths.into_iter().filter(Path::is_drawable).collect();
    let mut merges = 0;

    loop {
        let mut merged_any = false;
        let mut i = 0;
        while i < pool.len() {
            let mut j = i + 1;
            while j < pool.len() {
                if pool[i].tool == pool[j].tool {
                    if let Some(points) = join(&pool[i].points, &pool[j].points, tolerance) {
                        pool[i].points = points;
                        pool.remove(j);
                        merges += 1;
                        merged_any = true;
                        j = i + 1;
                        continue;
                    }
                }
                j += 1;
            }
            i += 1;
        }
        if !merged_any {
            break;
        }
    }

    (pool, merges)
}

fn order_group(mut remaining: Vec<Path>, cursor: &mut Point, output: &mut Vec<Path>) {
    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_reversed = false;
        let mut best_distance = f64::INFINITY;

        for (index, path) in remaining.iter().enumerate() {
            let (Some(start), Some(end)) = (path.start(), path.end()) else {
                continue;
            };
            let to_start = cursor.distance_to(&start);
            if to_start < best_distance {
                best = index;
                best_reversed = false;
                best_distance = to_start;
            }
            let to_end = cursor.distance_to(&end);
            if to_end < best_distance {
                best = index;
                best_reversed = true;
                best_distance = to_end;
            }
        }

        let mut next = remaining.remove(best);
        if best_reversed {
            next.points.reverse();
        }
        if let Some(end) = next.end() {
            *cursor = end;
        }
        output.push(next);
    }
}

/// Greedy nearest-neighbor ordering.
///
/// Starting from `start`, repeatedly picks the remaining path with an
/// endpoint closest to the pen, reversing it when its far end is nearer.
/// Ties go to the first path found. Paths are grouped by tool tag
/// (untagged first, then ascending) and the pen position carries over from
/// one group to the next.
pub fn optimize_path_order(paths: Vec<Path>, start: Point) -> Vec<Path> {
    let mut groups: BTreeMap<Option<u8>, Vec<Path>> = BTreeMap::new();
    for path in paths {
        groups.entry(path.tool).or_default().push(path);
    }

    let mut output = Vec::new();
    let mut cursor = start;
    for (_, group) in groups {
        order_group(group, &mut cursor, &mut output);
    }
    output
}

/// Pen-up distance needed to draw `paths` in the given order from `start`
pub fn travel_distance(paths: &[Path], start: Point) -> f64 {
    let mut cursor = start;
    let mut total = 0.0;
    for path in paths {
        if let (Some(first), Some(last)) = (path.start(), path.end()) {
            total += cursor.distance_to(&first);
            cursor = last;
        }
    }
    total
}

fn segment_count(paths: &[Path]) -> usize {
    paths.iter().map(Path::segment_count).sum()
}

/// Runs the optimizer stages with configurable merge and order strategies
pub struct PathOptimizer {
    options: OptimizerOptions,
    merge: Box<dyn MergeStrategy>,
    order: Box<dyn OrderStrategy>,
}

impl PathOptimizer {
    pub fn new(options: OptimizerOptions) -> Self {
        Self::with_strategies(options, Box::new(GreedyMerge), Box::new(NearestNeighborOrder))
    }

    pub fn with_strategies(
        options: OptimizerOptions,
        merge: Box<dyn MergeStrategy>,
        order: Box<dyn OrderStrategy>,
    ) -> Self {
        Self {
            options,
            merge,
            order,
        }
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    /// Run the enabled stages in pipeline order
    pub fn optimize(&self, paths: &[Path]) -> (Vec<Path>, OptimizationStats) {
        let opts = &self.options;
        let mut stats = OptimizationStats {
            paths_before: paths.len(),
            segments_before: segment_count(paths),
            travel_distance_before: travel_distance(paths, opts.start_point),
            ..Default::default()
        };

        let mut current: Vec<Path> = paths.to_vec();

        if opts.remove_artefacts {
            let (kept, removed) = remove_short_paths(current, opts.min_path_length);
            current = kept;
            stats.artefacts_removed = removed;
        }

        if opts.remove_duplicates {
            let (kept, removed) = remove_duplicate_segments(current, opts.line_tolerance);
            current = kept;
            stats.duplicates_removed = removed;
        }

        if opts.simplify {
            current = simplify_paths(current, opts.simplify_tolerance);
        }

        if opts.merge {
            let (merged, count) = self.merge.merge(current, opts.point_tolerance);
            current = merged;
            stats.paths_merged = count;
        }

        if opts.reorder {
            current = self.order.order(current, opts.start_point);
        }

        stats.paths_after = current.len();
        stats.segments_after = segment_count(&current);
        stats.draw_distance = current.iter().map(|p| path_length(&p.points)).sum();
        stats.travel_distance = travel_distance(&current, opts.start_point);
        if stats.travel_distance_before > 0.0 {
            stats.travel_reduction_percent = (stats.travel_distance_before
                - stats.travel_distance)
                / stats.travel_distance_before
                * 100.0;
        }

        tracing::debug!(
            merge = self.merge.name(),
            order = self.order.name(),
            paths_before = stats.paths_before,
            paths_after = stats.paths_after,
            duplicates = stats.duplicates_removed,
            merged = stats.paths_merged,
            "Optimized paths, travel reduced by {:.1}%",
            stats.travel_reduction_percent
        );

        (current, stats)
    }
}

impl Default for PathOptimizer {
    fn default() -> Self {
        Self::new(OptimizerOptions::default())
    }
}

impl std::fmt::Debug for PathOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathOptimizer")
            .field("options", &self.options)
            .field("merge", &self.merge.name())
            .field("order", &self.order.name())
            .finish()
    }
}

/// Optimize `paths` with the default strategies
pub fn optimize(paths: &[Path], options: &OptimizerOptions) -> (Vec<Path>, OptimizationStats) {
    PathOptimizer::new(options.clone()).optimize(paths)
}
