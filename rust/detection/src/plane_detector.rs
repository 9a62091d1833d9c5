// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Roof plane segmentation.
//!
//! Planes are extracted greedily with seeded RANSAC followed by
//! least-squares refinement. A consensus set only keeps the members that
//! form spatially connected groups of at least `min_inliers` points, so
//! scattered points that happen to share a slab never make a plane. Once
//! extraction stops, every claimed point is
//! handed to the accepted plane with the smallest residual among those whose
//! acceptance test it passes (ties go to the earlier plane), so assignment
//! does not depend on extraction order alone.
//!
//! # Usage
//!
//! ```rust,ignore
//! use roofer_detection::{PlaneDetector, PlaneDetectorConfig};
//!
//! let detector = PlaneDetector::new(PlaneDetectorConfig::default());
//! let detection = detector.detect(&cloud)?;
//! for plane in &detection.planes {
//!     println!("plane {} has {} points", plane.id, plane.inlier_count());
//! }
//! ```

use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roofer_core::{
    fit_plane, Diagnostic, DiagnosticKind, Error, GridIndex, Plane, PlaneId, PointCloud, Result,
    RoofPlane, Stage, NO_PLANE,
};
use serde::{Deserialize, Serialize};

use crate::config::PlaneDetectorConfig;
use crate::normals::estimate_normals;

/// Coarse roof shape derived from the detected planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoofType {
    NoPlanes,
    Horizontal,
    MultipleHorizontal,
    Slanted,
}

/// Plane registry plus per-point assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaneDetection {
    /// Detected planes; `planes[i].id == i + 1`.
    pub planes: Vec<RoofPlane>,
    /// Plane id per input point, `NO_PLANE` when unassigned.
    pub plane_id: Vec<PlaneId>,
    pub roof_type: RoofType,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlaneDetection {
    pub fn plane(&self, id: PlaneId) -> Option<&RoofPlane> {
        self.planes.iter().find(|p| p.id == id)
    }

    pub fn horizontal_count(&self) -> usize {
        self.planes
            .iter()
            .filter(|p| p.is_horizontal && !p.is_wall)
            .count()
    }

    pub fn slanted_count(&self) -> usize {
        self.planes
            .iter()
            .filter(|p| !p.is_horizontal && !p.is_wall)
            .count()
    }

    pub fn unassigned_count(&self) -> usize {
        self.plane_id.iter().filter(|&&id| id == NO_PLANE).count()
    }
}

/// RANSAC plane detector.
#[derive(Debug, Clone, Default)]
pub struct PlaneDetector {
    config: PlaneDetectorConfig,
}

/// Point normals plus the cosine threshold they are tested against.
struct NormalTest {
    normals: Vec<Vector3<f64>>,
    min_cos: f64,
}

impl PlaneDetector {
    pub fn new(config: PlaneDetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlaneDetectorConfig {
        &self.config
    }

    /// Segment every point of the cloud.
    pub fn detect(&self, cloud: &PointCloud) -> Result<PlaneDetection> {
        let all: Vec<usize> = (0..cloud.len()).collect();
        self.detect_subset(cloud, &all)
    }

    /// Segment only `candidates`; all other points keep `NO_PLANE`.
    pub fn detect_subset(&self, cloud: &PointCloud, candidates: &[usize]) -> Result<PlaneDetection> {
        self.config.validate()?;
        if cloud.is_empty() {
            return Err(Error::InvalidInput("point cloud is empty".to_string()));
        }
        if candidates.is_empty() {
            return Err(Error::InvalidInput(
                "no points selected for plane detection".to_string(),
            ));
        }
        if let Some(&bad) = candidates.iter().find(|&&i| i >= cloud.len()) {
            return Err(Error::InvalidInput(format!(
                "candidate index {} out of range for {} points",
                bad,
                cloud.len()
            )));
        }

        let mut candidates = candidates.to_vec();
        candidates.sort_unstable();
        candidates.dedup();

        let points = cloud.points();
        let normal_test = self.config.normal_angle_tolerance.map(|angle| NormalTest {
            normals: estimate_normals(points, &candidates, self.config.normal_k),
            min_cos: angle.cos(),
        });

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut pool = candidates.clone();
        let mut accepted: Vec<Plane> = Vec::new();

        loop {
            if pool.len() < self.config.min_inliers {
                break;
            }
            if self.config.max_planes.is_some_and(|max| accepted.len() >= max) {
                break;
            }
            let Some((plane, inliers)) =
                self.extract_plane(points, normal_test.as_ref(), &pool, &mut rng)
            else {
                break;
            };
            if inliers.len() < self.config.min_inliers {
                break;
            }

            tracing::debug!(
                candidate = accepted.len() + 1,
                inliers = inliers.len(),
                remaining = pool.len() - inliers.len(),
                "Accepted plane candidate"
            );

            // Both lists are ascending
            let mut claimed = inliers.iter().peekable();
            pool.retain(|i| {
                while claimed.next_if(|&&c| c < *i).is_some() {}
                claimed.peek().map_or(true, |&&c| c != *i)
            });
            accepted.push(plane);
        }

        // Points left in the pool were never part of a plane
        let mut unclaimed = vec![false; cloud.len()];
        for &i in &pool {
            unclaimed[i] = true;
        }
        let claimed: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| !unclaimed[i])
            .collect();

        let (assignment, diagnostics) =
            self.resolve_assignment(points, normal_test.as_ref(), &claimed, &accepted);

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); accepted.len()];
        for (&point, slot) in claimed.iter().zip(&assignment) {
            if let Some(slot) = *slot {
                members[slot].push(point);
            }
        }

        let mut plane_id = vec![NO_PLANE; cloud.len()];
        let mut planes = Vec::new();
        for (plane, indices) in accepted.iter().zip(members) {
            if indices.is_empty() {
                continue;
            }
            let id = planes.len() as PlaneId + 1;
            for &i in &indices {
                plane_id[i] = id;
            }
            let member_points = indices.iter().map(|&i| points[i]).collect();
            let mut roof = RoofPlane::new(id, *plane, indices, member_points);
            let nz = plane.normal.z.abs();
            roof.is_horizontal = nz >= self.config.horizontal_normal_z;
            roof.is_wall = nz < self.config.wall_normal_z;
            planes.push(roof);
        }

        let roof_type = classify_roof(&planes);
        let detection = PlaneDetection {
            planes,
            plane_id,
            roof_type,
            diagnostics,
        };

        tracing::info!(
            planes = detection.planes.len(),
            horizontal = detection.horizontal_count(),
            slanted = detection.slanted_count(),
            unassigned = detection.unassigned_count(),
            roof_type = ?detection.roof_type,
            "Completed plane detection"
        );

        Ok(detection)
    }

    /// Best RANSAC sample on `pool`, refined by least squares.
    ///
    /// Returns the plane together with the spatially coherent part of the
    /// pool points it was selected against, ascending.
    fn extract_plane(
        &self,
        points: &[Point3<f64>],
        normal_test: Option<&NormalTest>,
        pool: &[usize],
        rng: &mut StdRng,
    ) -> Option<(Plane, Vec<usize>)> {
        let n = pool.len();
        if n < 3 {
            return None;
        }

        let mut best: Option<(Plane, usize)> = None;
        for _ in 0..self.config.sample_iterations {
            let a = rng.random_range(0..n);
            let mut b = rng.random_range(0..n);
            while b == a {
                b = rng.random_range(0..n);
            }
            let mut c = rng.random_range(0..n);
            while c == a || c == b {
                c = rng.random_range(0..n);
            }

            let Some(plane) =
                Plane::from_points(&points[pool[a]], &points[pool[b]], &points[pool[c]])
            else {
                continue;
            };

            let count = pool
                .iter()
                .filter(|&&i| self.accepts(&plane, points, normal_test, i))
                .count();
            if best.map_or(true, |(_, best_count)| count > best_count) {
                best = Some((plane, count));
            }
        }

        let (mut plane, _) = best?;
        let mut inliers = self.select(&plane, points, normal_test, pool);

        for _ in 0..self.config.refine_iterations {
            let refit = match fit_plane(inliers.iter().map(|&i| points[i])) {
                Ok(refit) => refit,
                Err(err) => {
                    tracing::debug!(error = %err, "Plane refinement stopped");
                    break;
                }
            };
            let next = self.select(&refit, points, normal_test, pool);
            if next.len() < inliers.len() {
                break;
            }
            let converged = next == inliers;
            plane = refit;
            inliers = next;
            if converged {
                break;
            }
        }

        let coherent = self.coherent_members(points, &inliers);
        if coherent.len() < inliers.len() {
            tracing::debug!(
                consensus = inliers.len(),
                coherent = coherent.len(),
                "Dropped scattered consensus points"
            );
        }
        Some((plane, coherent))
    }

    /// Members of `inliers` (ascending) lying in connected groups of at
    /// least `min_inliers` points. Two points are connected when one is
    /// among the other's nearest neighbours and they are at most
    /// `cluster_distance` apart.
    fn coherent_members(&self, points: &[Point3<f64>], inliers: &[usize]) -> Vec<usize> {
        let n = inliers.len();
        if n == 0 {
            return Vec::new();
        }
        let radius = self.config.cluster_distance;
        let k = self.config.normal_k.max(3) + 1;
        let index = GridIndex::build(points, inliers, radius);

        let mut parent: Vec<usize> = (0..n).collect();
        for (pos, &i) in inliers.iter().enumerate() {
            for j in index.k_nearest(points, &points[i], k) {
                if j == i || (points[j] - points[i]).norm() > radius {
                    continue;
                }
                if let Ok(other) = inliers.binary_search(&j) {
                    union(&mut parent, pos, other);
                }
            }
        }

        let mut sizes = vec![0usize; n];
        for pos in 0..n {
            sizes[find(&mut parent, pos)] += 1;
        }
        (0..n)
            .filter(|&pos| sizes[find(&mut parent, pos)] >= self.config.min_inliers)
            .map(|pos| inliers[pos])
            .collect()
    }

    fn select(
        &self,
        plane: &Plane,
        points: &[Point3<f64>],
        normal_test: Option<&NormalTest>,
        pool: &[usize],
    ) -> Vec<usize> {
        pool.iter()
            .copied()
            .filter(|&i| self.accepts(plane, points, normal_test, i))
            .collect()
    }

    /// Acceptance test: within ε_dist, and, when enabled, a point normal
    /// within ε_angle of the plane normal. Points without a usable normal
    /// only need to pass the distance test.
    #[inline]
    fn accepts(
        &self,
        plane: &Plane,
        points: &[Point3<f64>],
        normal_test: Option<&NormalTest>,
        index: usize,
    ) -> bool {
        if plane.distance(&points[index]) > self.config.distance_tolerance {
            return false;
        }
        match normal_test {
            Some(test) => {
                let normal = &test.normals[index];
                normal.norm_squared() == 0.0 || normal.dot(&plane.normal).abs() >= test.min_cos
            }
            None => true,
        }
    }

    /// Assign each candidate to the accepted plane with the smallest
    /// residual among the planes accepting it. Planes that end up below
    /// `min_inliers` (or walls, when discarded) are dissolved and the
    /// assignment is recomputed without them.
    fn resolve_assignment(
        &self,
        points: &[Point3<f64>],
        normal_test: Option<&NormalTest>,
        candidates: &[usize],
        planes: &[Plane],
    ) -> (Vec<Option<usize>>, Vec<Diagnostic>) {
        let mut alive: Vec<bool> = planes
            .iter()
            .map(|p| !(self.config.discard_walls && p.normal.z.abs() < self.config.wall_normal_z))
            .collect();
        let mut diagnostics = Vec::new();

        loop {
            let assignment: Vec<Option<usize>> = candidates
                .iter()
                .map(|&i| {
                    let mut best: Option<(usize, f64)> = None;
                    for (slot, plane) in planes.iter().enumerate() {
                        if !alive[slot] || !self.accepts(plane, points, normal_test, i) {
                            continue;
                        }
                        let residual = plane.distance(&points[i]);
                        if best.map_or(true, |(_, r)| residual < r) {
                            best = Some((slot, residual));
                        }
                    }
                    best.map(|(slot, _)| slot)
                })
                .collect();

            let mut counts = vec![0usize; planes.len()];
            for slot in assignment.iter().flatten() {
                counts[*slot] += 1;
            }

            let mut dissolved = false;
            for slot in 0..planes.len() {
                if alive[slot] && counts[slot] < self.config.min_inliers {
                    alive[slot] = false;
                    dissolved = true;
                    tracing::debug!(
                        candidate = slot + 1,
                        inliers = counts[slot],
                        "Dissolved plane candidate after reassignment"
                    );
                    diagnostics.push(Diagnostic {
                        stage: Stage::PlaneDetection,
                        kind: DiagnosticKind::DegenerateGeometry,
                        plane_id: NO_PLANE,
                        ring_index: None,
                        message: format!(
                            "plane candidate {} kept {} of the required {} inliers after reassignment",
                            slot + 1,
                            counts[slot],
                            self.config.min_inliers
                        ),
                    });
                }
            }

            if !dissolved {
                return (assignment, diagnostics);
            }
        }
    }
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Join two sets, rooting the result at the smaller index.
fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

fn classify_roof(planes: &[RoofPlane]) -> RoofType {
    let roof: Vec<&RoofPlane> = planes.iter().filter(|p| !p.is_wall).collect();
    if roof.is_empty() {
        return RoofType::NoPlanes;
    }
    if roof.iter().all(|p| p.is_horizontal) {
        if roof.len() == 1 {
            RoofType::Horizontal
        } else {
            RoofType::MultipleHorizontal
        }
    } else {
        RoofType::Slanted
    }
}
