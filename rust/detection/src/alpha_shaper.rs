// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Alpha-shape boundaries of roof planes.
//!
//! Each plane's points are projected into the plane frame, triangulated with
//! `delaunator` and filtered by circumradius. The boundary of the remaining
//! triangle complex is traced into closed rings which are lifted back onto
//! the fitted plane.
//!
//! Projected points are sorted lexicographically by `(u, v)` and exact
//! duplicates removed before triangulation; ring tracing starts from the
//! unused boundary edge with the smallest `(from, to)` vertex pair. Together
//! this fixes the topology for a given input independent of thread
//! scheduling.
//!
//! `delaunator` decides orientation exactly but legalizes edges with a
//! floating point in-circle test. Four nearly co-circular projected points
//! may therefore take either diagonal, and the circumradius filter can then
//! keep or drop a sliver near the alpha threshold. Results stay reproducible
//! for identical input.

use nalgebra::Point2;
use rayon::prelude::*;
use roofer_core::frame::signed_area_2d;
use roofer_core::{
    Diagnostic, Error, PlaneId, Result, Ring, RingKind, RingLabel, RoofPlane, Stage,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::AlphaShaperConfig;
use crate::predicates::orient2d;

/// Rings of all planes with their owning plane labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlphaShapes {
    pub rings: Vec<Ring>,
    /// Parallel to `rings`.
    pub ring_labels: Vec<RingLabel>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AlphaShapes {
    /// Rings owned by the given plane, with their indices.
    pub fn rings_of(&self, plane_id: PlaneId) -> impl Iterator<Item = (usize, &Ring)> {
        self.rings
            .iter()
            .enumerate()
            .zip(&self.ring_labels)
            .filter(move |(_, label)| label.plane_id == plane_id)
            .map(|(ring, _)| ring)
    }
}

/// Alpha-shape boundary extractor.
#[derive(Debug, Clone, Default)]
pub struct AlphaShaper {
    config: AlphaShaperConfig,
}

impl AlphaShaper {
    pub fn new(config: AlphaShaperConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlphaShaperConfig {
        &self.config
    }

    /// Boundary rings for every plane.
    ///
    /// Planes that cannot produce a ring are skipped and reported in
    /// `diagnostics`; they never affect the other planes.
    pub fn compute(&self, planes: &[RoofPlane]) -> Result<AlphaShapes> {
        self.config.validate()?;

        let mut results: Vec<(PlaneId, Result<Vec<Ring>>)> = if self.config.parallel {
            planes
                .par_iter()
                .map(|plane| (plane.id, self.shape_plane(plane)))
                .collect()
        } else {
            planes
                .iter()
                .map(|plane| (plane.id, self.shape_plane(plane)))
                .collect()
        };
        results.sort_by_key(|(id, _)| *id);

        let mut shapes = AlphaShapes::default();
        for (plane_id, result) in results {
            match result {
                Ok(rings) => {
                    tracing::debug!(plane_id, rings = rings.len(), "Alpha shape computed");
                    for ring in rings {
                        shapes.rings.push(ring);
                        shapes.ring_labels.push(RingLabel { plane_id });
                    }
                }
                Err(err) => {
                    tracing::warn!(plane_id, error = %err, "Skipping plane in alpha shaper");
                    match Diagnostic::from_error(Stage::AlphaShape, plane_id, None, &err) {
                        Some(diagnostic) => shapes.diagnostics.push(diagnostic),
                        None => return Err(err),
                    }
                }
            }
        }

        tracing::info!(
            planes = planes.len(),
            rings = shapes.rings.len(),
            skipped = shapes.diagnostics.len(),
            "Completed alpha shaper"
        );

        Ok(shapes)
    }

    /// Rings of a single plane, largest absolute area first.
    pub fn shape_plane(&self, plane: &RoofPlane) -> Result<Vec<Ring>> {
        if plane.points.len() < 3 {
            return Err(Error::DegenerateGeometry(format!(
                "plane {} has {} points, at least 3 are needed",
                plane.id,
                plane.points.len()
            )));
        }

        let frame = plane.frame();
        let mut projected = frame.project_all(&plane.points);
        if projected.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::NumericalInstability(format!(
                "plane {} projects to non-finite coordinates",
                plane.id
            )));
        }
        projected.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        projected.dedup();
        if projected.len() < 3 {
            return Err(Error::DegenerateGeometry(format!(
                "plane {} has {} distinct points, at least 3 are needed",
                plane.id,
                projected.len()
            )));
        }

        let triangles = alpha_triangles(&projected, self.config.alpha);
        if triangles.is_empty() {
            return Err(Error::DegenerateGeometry(format!(
                "alpha {} keeps no triangles of plane {}",
                self.config.alpha, plane.id
            )));
        }

        let mut rings: Vec<(f64, Ring)> = trace_boundary(&projected, &triangles)
            .into_iter()
            .filter_map(|ring| {
                let pts: Vec<Point2<f64>> = ring.iter().map(|&i| projected[i]).collect();
                let area = signed_area_2d(&pts);
                if area.abs() < self.config.min_ring_area || area == 0.0 {
                    return None;
                }
                let kind = if area > 0.0 {
                    RingKind::Outer
                } else {
                    RingKind::Hole
                };
                let vertices = pts.iter().map(|p| frame.lift(p)).collect();
                Some((area.abs(), Ring { vertices, kind }))
            })
            .collect();

        if rings.is_empty() {
            return Err(Error::DegenerateGeometry(format!(
                "plane {} has no ring with area of at least {}",
                plane.id, self.config.min_ring_area
            )));
        }

        rings.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(rings.into_iter().map(|(_, ring)| ring).collect())
    }
}

/// Delaunay triangles with circumradius below `alpha`, counter-clockwise.
///
/// Triangles whose exact orientation is zero are excluded.
pub fn alpha_triangles(points: &[Point2<f64>], alpha: f64) -> Vec<[usize; 3]> {
    let input: Vec<delaunator::Point> = points
        .iter()
        .map(|p| delaunator::Point { x: p.x, y: p.y })
        .collect();
    let triangulation = delaunator::triangulate(&input);

    triangulation
        .triangles
        .chunks_exact(3)
        .filter_map(|t| {
            let (a, b, c) = (t[0], t[1], t[2]);
            let det = orient2d(&points[a], &points[b], &points[c]);
            if det == 0.0 {
                return None;
            }
            let ab = (points[b] - points[a]).norm();
            let bc = (points[c] - points[b]).norm();
            let ca = (points[a] - points[c]).norm();
            // det is twice the signed area
            let radius = ab * bc * ca / (2.0 * det.abs());
            if !radius.is_finite() || radius >= alpha {
                return None;
            }
            Some(if det > 0.0 { [a, b, c] } else { [a, c, b] })
        })
        .collect()
}

/// Boundary loops of a set of counter-clockwise triangles over `points`.
///
/// Every loop keeps the triangle interior on its left: outer boundaries run
/// counter-clockwise, holes clockwise. No vertex appears twice in a loop.
pub fn trace_boundary(points: &[Point2<f64>], triangles: &[[usize; 3]]) -> Vec<Vec<usize>> {
    let mut directed: FxHashSet<(usize, usize)> = FxHashSet::default();
    for t in triangles {
        for k in 0..3 {
            directed.insert((t[k], t[(k + 1) % 3]));
        }
    }

    let mut boundary: Vec<(usize, usize)> = directed
        .iter()
        .copied()
        .filter(|&(u, v)| !directed.contains(&(v, u)))
        .collect();
    boundary.sort_unstable();

    let mut outgoing: FxHashMap<usize, SmallVec<[usize; 2]>> = FxHashMap::default();
    for &(u, v) in &boundary {
        outgoing.entry(u).or_default().push(v);
    }

    let mut used: FxHashSet<(usize, usize)> = FxHashSet::default();
    let mut loops = Vec::new();

    for &(start, first) in &boundary {
        if used.contains(&(start, first)) {
            continue;
        }
        used.insert((start, first));

        let mut walk = vec![start];
        let mut prev = start;
        let mut current = first;
        let mut closed = false;

        while walk.len() <= boundary.len() {
            if current == start {
                closed = true;
                break;
            }
            walk.push(current);

            let Some(next) = outgoing.get(&current).and_then(|targets| {
                choose_next(points, prev, current, targets, &used)
            }) else {
                break;
            };
            used.insert((current, next));
            prev = current;
            current = next;
        }

        if closed {
            split_at_repeats(walk, &mut loops);
        }
    }

    loops
}

/// Among the unused boundary edges leaving `current`, the one reached first
/// when turning clockwise from the reversed incoming direction.
fn choose_next(
    points: &[Point2<f64>],
    prev: usize,
    current: usize,
    targets: &[usize],
    used: &FxHashSet<(usize, usize)>,
) -> Option<usize> {
    let free = targets
        .iter()
        .copied()
        .filter(|&t| !used.contains(&(current, t)));

    let back = points[prev] - points[current];
    free.map(|t| {
        let d = points[t] - points[current];
        let cross = back.x * d.y - back.y * d.x;
        let dot = back.dot(&d);
        let mut ccw = cross.atan2(dot).rem_euclid(std::f64::consts::TAU);
        if ccw == 0.0 {
            ccw = -1.0;
        }
        (t, ccw)
    })
    // Largest counter-clockwise angle = smallest clockwise angle
    .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
    .map(|(t, _)| t)
}

/// Split a closed walk into loops that visit each vertex once.
fn split_at_repeats(walk: Vec<usize>, loops: &mut Vec<Vec<usize>>) {
    let mut stack: Vec<usize> = Vec::with_capacity(walk.len());
    let mut position: FxHashMap<usize, usize> = FxHashMap::default();

    for v in walk {
        if let Some(&at) = position.get(&v) {
            let sub: Vec<usize> = stack.drain(at + 1..).collect();
            for w in &sub {
                position.remove(w);
            }
            let mut ring = Vec::with_capacity(sub.len() + 1);
            ring.push(v);
            ring.extend(sub);
            if ring.len() >= 3 {
                loops.push(ring);
            }
        } else {
            position.insert(v, stack.len());
            stack.push(v);
        }
    }

    if stack.len() >= 3 {
        loops.push(stack);
    }
}
