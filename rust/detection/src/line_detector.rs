// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Regularization of alpha-shape rings into straight edges.
//!
//! Every ring is handled in the 2-D frame of its plane:
//!
//! 1. Douglas–Peucker reduction bounded by `distance_tolerance`
//! 2. Angular merge of vertices turning less than `angle_tolerance`
//! 3. Orthogonal-regression fit of each merged edge over the source vertices
//!    it spans, then snapping to the plane's dominant directions
//! 4. Corners from intersections of consecutive lines
//! 5. Fallback to the merged or the source geometry if the result is not
//!    simple
//!
//! All operations are deterministic, so repeated runs produce bit-identical
//! edges.

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::{Point2, Vector2};
use rayon::prelude::*;
use roofer_core::fit::fit_line_2d;
use roofer_core::frame::signed_area_2d;
use roofer_core::{
    principal_direction_2d, Diagnostic, EdgeSegment, Error, PlaneFrame, PlaneId, Result, Ring,
    RingEdges, RingKind, RingLabel, RoofPlane, Stage,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::{DominantDirections, LineDetectorConfig};
use crate::predicates::self_intersections;

/// Sine of the smallest angle between two lines that still get intersected.
const PARALLEL_SINE: f64 = 1e-3;

/// Regularized edges of all rings that could be processed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineDetection {
    pub rings: Vec<RingEdges>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LineDetection {
    pub fn edge_count(&self) -> usize {
        self.rings.iter().map(|r| r.edges.len()).sum()
    }

    pub fn edges(&self) -> impl Iterator<Item = &EdgeSegment> {
        self.rings.iter().flat_map(|r| r.edges.iter())
    }
}

/// Per-vertex turning angle of a closed polygon, in `[0, π]`.
///
/// The angle at vertex `i` is between the incoming edge `(i - 1, i)` and the
/// outgoing edge `(i, i + 1)`; 0 means no change in direction. A vertex with
/// a zero-length neighbouring edge reports 0.
pub fn turning_angles(polygon: &[Point2<f64>]) -> Vec<f64> {
    let n = polygon.len();
    if n < 3 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| {
            let prev = polygon[(i + n - 1) % n];
            let next = polygon[(i + 1) % n];
            let incoming = polygon[i] - prev;
            let outgoing = next - polygon[i];
            if incoming.norm_squared() == 0.0 || outgoing.norm_squared() == 0.0 {
                return 0.0;
            }
            let cross = incoming.x * outgoing.y - incoming.y * outgoing.x;
            cross.abs().atan2(incoming.dot(&outgoing))
        })
        .collect()
}

/// A ring after distance and angle reduction.
struct MergedRing<'a> {
    ring_index: usize,
    plane: &'a RoofPlane,
    kind: RingKind,
    frame: PlaneFrame,
    /// Source ring in frame coordinates.
    source: Vec<Point2<f64>>,
    /// Indices into `source` of the surviving vertices, ascending.
    kept: Vec<usize>,
}

impl MergedRing<'_> {
    fn vertex(&self, k: usize) -> Point2<f64> {
        self.source[self.kept[k]]
    }

    fn polygon(&self) -> Vec<Point2<f64>> {
        self.kept.iter().map(|&i| self.source[i]).collect()
    }

    /// Source vertices from kept vertex `k` to kept vertex `k + 1`, inclusive.
    fn span(&self, k: usize) -> Vec<Point2<f64>> {
        let n = self.source.len();
        let from = self.kept[k];
        let to = self.kept[(k + 1) % self.kept.len()];
        let steps = (to + n - from) % n;
        (0..=steps).map(|s| self.source[(from + s) % n]).collect()
    }
}

/// A fitted edge line through `point` with unit `direction`, oriented along
/// the ring.
#[derive(Debug, Clone, Copy)]
struct EdgeLine {
    point: Point2<f64>,
    direction: Vector2<f64>,
}

/// Ring regularizer.
#[derive(Debug, Clone, Default)]
pub struct LineDetector {
    config: LineDetectorConfig,
}

impl LineDetector {
    pub fn new(config: LineDetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LineDetectorConfig {
        &self.config
    }

    /// Regularize every ring.
    ///
    /// `labels` must be parallel to `rings` and name planes present in
    /// `planes`. Rings that cannot be regularized are dropped and reported in
    /// `diagnostics`.
    pub fn detect(
        &self,
        rings: &[Ring],
        labels: &[RingLabel],
        planes: &[RoofPlane],
    ) -> Result<LineDetection> {
        self.config.validate()?;
        if rings.len() != labels.len() {
            return Err(Error::InvalidInput(format!(
                "{} rings but {} ring labels",
                rings.len(),
                labels.len()
            )));
        }

        let by_id: FxHashMap<PlaneId, &RoofPlane> = planes.iter().map(|p| (p.id, p)).collect();
        let mut units = Vec::with_capacity(rings.len());
        for (ring_index, (ring, label)) in rings.iter().zip(labels).enumerate() {
            let plane = by_id.get(&label.plane_id).copied().ok_or_else(|| {
                Error::InvalidInput(format!(
                    "ring {} refers to unknown plane {}",
                    ring_index, label.plane_id
                ))
            })?;
            units.push((ring_index, ring, plane));
        }

        let mut diagnostics = Vec::new();

        let merged: Vec<(usize, PlaneId, Result<MergedRing<'_>>)> = if self.config.parallel {
            units
                .par_iter()
                .map(|&(index, ring, plane)| (index, plane.id, self.merge_ring(index, ring, plane)))
                .collect()
        } else {
            units
                .iter()
                .map(|&(index, ring, plane)| (index, plane.id, self.merge_ring(index, ring, plane)))
                .collect()
        };

        let mut ready = Vec::with_capacity(merged.len());
        for (ring_index, plane_id, result) in merged {
            match result {
                Ok(ring) => ready.push(ring),
                Err(err) => self.record(&mut diagnostics, plane_id, ring_index, err)?,
            }
        }

        let directions = self.plane_directions(&ready);
        let no_directions = Vec::new();

        let regularize = |ring: &MergedRing<'_>| {
            let dirs = directions.get(&ring.plane.id).unwrap_or(&no_directions);
            (ring.ring_index, ring.plane.id, self.regularize(ring, dirs))
        };
        let mut results: Vec<(usize, PlaneId, Result<RingEdges>)> = if self.config.parallel {
            ready.par_iter().map(regularize).collect()
        } else {
            ready.iter().map(regularize).collect()
        };
        results.sort_by_key(|(index, plane_id, _)| (*plane_id, *index));

        let mut output = Vec::with_capacity(results.len());
        for (ring_index, plane_id, result) in results {
            match result {
                Ok(edges) => {
                    tracing::debug!(
                        plane_id,
                        ring_index,
                        edges = edges.edges.len(),
                        source = rings[ring_index].len(),
                        "Regularized ring"
                    );
                    output.push(edges);
                }
                Err(err) => self.record(&mut diagnostics, plane_id, ring_index, err)?,
            }
        }
        diagnostics.sort_by_key(|d| (d.plane_id, d.ring_index));

        let detection = LineDetection {
            rings: output,
            diagnostics,
        };
        tracing::info!(
            rings = rings.len(),
            regularized = detection.rings.len(),
            edges = detection.edge_count(),
            skipped = detection.diagnostics.len(),
            "Completed line detection"
        );
        Ok(detection)
    }

    fn record(
        &self,
        diagnostics: &mut Vec<Diagnostic>,
        plane_id: PlaneId,
        ring_index: usize,
        err: Error,
    ) -> Result<()> {
        tracing::warn!(plane_id, ring_index, error = %err, "Dropping ring in line detector");
        match Diagnostic::from_error(Stage::LineDetection, plane_id, Some(ring_index), &err) {
            Some(diagnostic) => {
                diagnostics.push(diagnostic);
                Ok(())
            }
            None => Err(err),
        }
    }

    /// Distance and angle reduction of one ring.
    fn merge_ring<'a>(
        &self,
        ring_index: usize,
        ring: &Ring,
        plane: &'a RoofPlane,
    ) -> Result<MergedRing<'a>> {
        if ring.len() < 3 {
            return Err(Error::DegenerateGeometry(format!(
                "ring {} has {} vertices",
                ring_index,
                ring.len()
            )));
        }

        let frame = plane.frame();
        let source = frame.project_all(&ring.vertices);
        if source.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::NumericalInstability(format!(
                "ring {} projects to non-finite coordinates",
                ring_index
            )));
        }

        let mut kept = simplify_closed(&source, self.config.distance_tolerance);

        while kept.len() > 3 {
            let polygon: Vec<Point2<f64>> = kept.iter().map(|&i| source[i]).collect();
            let Some((position, angle)) = turning_angles(&polygon)
                .into_iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(&b.1))
            else {
                break;
            };
            if angle >= self.config.angle_tolerance {
                break;
            }
            kept.remove(position);
        }

        if kept.len() < 3 {
            return Err(Error::DegenerateGeometry(format!(
                "ring {} reduces to {} vertices",
                ring_index,
                kept.len()
            )));
        }

        let merged = MergedRing {
            ring_index,
            plane,
            kind: ring.kind,
            frame,
            source,
            kept,
        };
        if signed_area_2d(&merged.polygon()) == 0.0 {
            return Err(Error::DegenerateGeometry(format!(
                "ring {} encloses no area",
                ring_index
            )));
        }
        Ok(merged)
    }

    /// Snapping directions per plane, as angles in `[0, π)`.
    fn plane_directions(&self, rings: &[MergedRing<'_>]) -> FxHashMap<PlaneId, Vec<f64>> {
        let mut directions: FxHashMap<PlaneId, Vec<f64>> = FxHashMap::default();
        match &self.config.dominant_directions {
            DominantDirections::None => {}
            DominantDirections::Fixed(angles) => {
                let fixed: Vec<f64> = angles.iter().map(|a| a.rem_euclid(PI)).collect();
                for ring in rings {
                    directions.insert(ring.plane.id, fixed.clone());
                }
            }
            DominantDirections::PrincipalAxes => {
                for ring in rings {
                    directions.entry(ring.plane.id).or_insert_with(|| {
                        let points = ring.frame.project_all(&ring.plane.points);
                        principal_direction_2d(&points)
                            .map(axis_pair)
                            .unwrap_or_default()
                    });
                }
            }
            DominantDirections::Histogram => {
                // Length-weighted mean of 4θ, i.e. direction modulo 90°
                let mut sums: FxHashMap<PlaneId, (f64, f64)> = FxHashMap::default();
                for ring in rings {
                    let entry = sums.entry(ring.plane.id).or_insert((0.0, 0.0));
                    let polygon = ring.polygon();
                    let n = polygon.len();
                    for i in 0..n {
                        let d = polygon[(i + 1) % n] - polygon[i];
                        let length = d.norm();
                        let theta = d.y.atan2(d.x);
                        entry.0 += length * (4.0 * theta).sin();
                        entry.1 += length * (4.0 * theta).cos();
                    }
                }
                for (plane_id, (sin, cos)) in sums {
                    if sin.hypot(cos) > 0.0 {
                        directions.insert(plane_id, axis_pair(0.25 * sin.atan2(cos)));
                    }
                }
            }
        }
        directions
    }

    /// Fit, snap, intersect and lift one merged ring.
    fn regularize(&self, ring: &MergedRing<'_>, directions: &[f64]) -> Result<RingEdges> {
        let m = ring.kept.len();

        let lines: Vec<EdgeLine> = (0..m)
            .map(|k| {
                let chord = ring.vertex((k + 1) % m) - ring.vertex(k);
                let line = match fit_line_2d(&ring.span(k)) {
                    Some((point, direction)) => EdgeLine {
                        point,
                        direction: if direction.dot(&chord) < 0.0 {
                            -direction
                        } else {
                            direction
                        },
                    },
                    None => EdgeLine {
                        point: ring.vertex(k),
                        direction: chord.normalize(),
                    },
                };
                snap(line, directions, self.config.angle_tolerance)
            })
            .collect();

        let corners: Vec<Point2<f64>> = (0..m)
            .map(|k| {
                let fallback = ring.vertex(k);
                match intersect(&lines[(k + m - 1) % m], &lines[k]) {
                    Some(corner)
                        if corner.x.is_finite()
                            && corner.y.is_finite()
                            && (corner - fallback).norm() <= self.config.max_corner_shift =>
                    {
                        corner
                    }
                    _ => fallback,
                }
            })
            .collect();

        let polygon = self.ensure_simple(ring, corners);
        let edges = polygon_edges(&ring.frame, &polygon);

        Ok(RingEdges {
            plane_id: ring.plane.id,
            ring_index: ring.ring_index,
            kind: ring.kind,
            edges,
        })
    }

    /// The regularized polygon, or the closest simple fallback.
    fn ensure_simple(&self, ring: &MergedRing<'_>, mut corners: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
        let conflicts = self_intersections(&corners);
        if conflicts.is_empty() {
            return corners;
        }

        let m = corners.len();
        for (i, j) in conflicts {
            for k in [i, (i + 1) % m, j, (j + 1) % m] {
                corners[k] = ring.vertex(k);
            }
        }
        if self_intersections(&corners).is_empty() {
            tracing::debug!(
                plane_id = ring.plane.id,
                ring_index = ring.ring_index,
                "Reverted self-intersecting edges"
            );
            return corners;
        }

        let merged = ring.polygon();
        if self_intersections(&merged).is_empty() {
            tracing::debug!(
                plane_id = ring.plane.id,
                ring_index = ring.ring_index,
                "Using merged ring without snapping"
            );
            return merged;
        }

        tracing::debug!(
            plane_id = ring.plane.id,
            ring_index = ring.ring_index,
            "Using source ring edges"
        );
        ring.source.clone()
    }
}

/// An angle and its perpendicular, both in `[0, π)`.
fn axis_pair(angle: f64) -> Vec<f64> {
    vec![angle.rem_euclid(PI), (angle + FRAC_PI_2).rem_euclid(PI)]
}

/// Rotate `line` about its point onto the closest direction within
/// `tolerance`, keeping its orientation.
fn snap(line: EdgeLine, directions: &[f64], tolerance: f64) -> EdgeLine {
    let theta = line.direction.y.atan2(line.direction.x);
    let best = directions
        .iter()
        .map(|&d| (theta - d + FRAC_PI_2).rem_euclid(PI) - FRAC_PI_2)
        .min_by(|a, b| a.abs().total_cmp(&b.abs()));

    match best {
        Some(diff) if diff.abs() < tolerance => {
            let snapped = theta - diff;
            EdgeLine {
                point: line.point,
                direction: Vector2::new(snapped.cos(), snapped.sin()),
            }
        }
        _ => line,
    }
}

/// Intersection of two lines, `None` when they are near parallel.
fn intersect(a: &EdgeLine, b: &EdgeLine) -> Option<Point2<f64>> {
    let denom = a.direction.x * b.direction.y - a.direction.y * b.direction.x;
    if denom.abs() < PARALLEL_SINE {
        return None;
    }
    let w = b.point - a.point;
    let t = (w.x * b.direction.y - w.y * b.direction.x) / denom;
    Some(a.point + a.direction * t)
}

fn polygon_edges(frame: &PlaneFrame, polygon: &[Point2<f64>]) -> Vec<EdgeSegment> {
    let lifted: Vec<_> = polygon.iter().map(|p| frame.lift(p)).collect();
    let n = lifted.len();
    (0..n)
        .map(|i| EdgeSegment::new(lifted[i], lifted[(i + 1) % n]))
        .collect()
}

/// Distance from `p` to the segment `(a, b)`.
fn point_segment_distance(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Douglas–Peucker on a closed ring.
///
/// Starts from the vertex farthest from the centroid and the vertex farthest
/// from that one. Returns ascending indices of the kept vertices.
fn simplify_closed(points: &[Point2<f64>], tolerance: f64) -> Vec<usize> {
    let n = points.len();
    if n <= 3 {
        return (0..n).collect();
    }

    let sum = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords);
    let centroid = Point2::from(sum / n as f64);
    let farthest_from = |origin: &Point2<f64>| {
        let mut best = 0;
        let mut best_d = -1.0;
        for (i, p) in points.iter().enumerate() {
            let d = (p - origin).norm_squared();
            if d > best_d {
                best = i;
                best_d = d;
            }
        }
        best
    };

    let a = farthest_from(&centroid);
    let b = farthest_from(&points[a]);
    if a == b {
        return vec![a];
    }

    let mut keep = vec![false; n];
    keep[a] = true;
    keep[b] = true;

    let mut stack = vec![(a, b), (b, a)];
    while let Some((start, end)) = stack.pop() {
        let steps = (end + n - start) % n;
        let mut split = None;
        let mut max_d = tolerance;
        for s in 1..steps {
            let i = (start + s) % n;
            let d = point_segment_distance(&points[i], &points[start], &points[end]);
            if d > max_d {
                max_d = d;
                split = Some(i);
            }
        }
        if let Some(i) = split {
            keep[i] = true;
            stack.push((start, i));
            stack.push((i, end));
        }
    }

    (0..n).filter(|&i| keep[i]).collect()
}
