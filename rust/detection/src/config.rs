// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tunable thresholds for the detection stages.
//!
//! Distances are in the units of the point cloud (metres for AHN/LAS data),
//! angles in radians.

use roofer_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for [`crate::PlaneDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneDetectorConfig {
    /// Maximum orthogonal distance of an inlier to its plane (ε_dist)
    pub distance_tolerance: f64,
    /// Maximum angle between a point normal and the plane normal (ε_angle).
    /// `None` disables the normal-consistency test.
    pub normal_angle_tolerance: Option<f64>,
    /// Neighbourhood size for point normal estimation
    pub normal_k: usize,
    /// Minimum consensus size for a plane to be accepted
    pub min_inliers: usize,
    /// Random minimal samples drawn per extracted plane
    pub sample_iterations: usize,
    /// Maximum fit / re-select rounds on an accepted sample
    pub refine_iterations: usize,
    /// Largest gap between neighbouring members of one plane. Consensus
    /// points in groups that stay smaller than `min_inliers` under this
    /// linkage go back to the pool.
    pub cluster_distance: f64,
    /// Upper bound on the number of planes, `None` for unbounded
    pub max_planes: Option<usize>,
    /// Seed for the sampling RNG
    pub seed: u64,
    /// |normal.z| at or above which a plane counts as horizontal
    pub horizontal_normal_z: f64,
    /// |normal.z| below which a plane counts as a wall
    pub wall_normal_z: f64,
    /// Drop wall planes from the registry (their points stay unassigned)
    pub discard_walls: bool,
}

impl Default for PlaneDetectorConfig {
    fn default() -> Self {
        Self {
            distance_tolerance: 0.2,
            normal_angle_tolerance: Some(0.7), // ~40 degrees
            normal_k: 10,
            min_inliers: 15,
            sample_iterations: 500,
            refine_iterations: 10,
            cluster_distance: 1.0,
            max_planes: None,
            seed: 42,
            horizontal_normal_z: 0.97,
            wall_normal_z: 0.3,
            discard_walls: false,
        }
    }
}

impl PlaneDetectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distance_tolerance(mut self, distance: f64) -> Self {
        self.distance_tolerance = distance;
        self
    }

    pub fn with_normal_angle_tolerance(mut self, angle: Option<f64>) -> Self {
        self.normal_angle_tolerance = angle;
        self
    }

    pub fn with_normal_k(mut self, k: usize) -> Self {
        self.normal_k = k;
        self
    }

    pub fn with_min_inliers(mut self, count: usize) -> Self {
        self.min_inliers = count;
        self
    }

    pub fn with_sample_iterations(mut self, iterations: usize) -> Self {
        self.sample_iterations = iterations;
        self
    }

    pub fn with_refine_iterations(mut self, iterations: usize) -> Self {
        self.refine_iterations = iterations;
        self
    }

    pub fn with_cluster_distance(mut self, distance: f64) -> Self {
        self.cluster_distance = distance;
        self
    }

    pub fn with_max_planes(mut self, max: Option<usize>) -> Self {
        self.max_planes = max;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_horizontal_normal_z(mut self, nz: f64) -> Self {
        self.horizontal_normal_z = nz;
        self
    }

    pub fn with_wall_normal_z(mut self, nz: f64) -> Self {
        self.wall_normal_z = nz;
        self
    }

    pub fn with_discard_walls(mut self, discard: bool) -> Self {
        self.discard_walls = discard;
        self
    }

    pub fn validate(&self) -> Result<()> {
        positive("plane distance_tolerance", self.distance_tolerance)?;
        positive("plane cluster_distance", self.cluster_distance)?;
        if let Some(angle) = self.normal_angle_tolerance {
            positive("plane normal_angle_tolerance", angle)?;
            if self.normal_k < 3 {
                return Err(Error::InvalidInput(format!(
                    "normal_k must be at least 3, got {}",
                    self.normal_k
                )));
            }
        }
        if self.min_inliers < 3 {
            return Err(Error::InvalidInput(format!(
                "min_inliers must be at least 3, got {}",
                self.min_inliers
            )));
        }
        if self.sample_iterations == 0 {
            return Err(Error::InvalidInput(
                "sample_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for [`crate::AlphaShaper`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaShaperConfig {
    /// Triangles with a circumradius at or above this are removed (α)
    pub alpha: f64,
    /// Rings enclosing less area than this are dropped
    pub min_ring_area: f64,
    /// Process planes on the rayon pool
    pub parallel: bool,
}

impl Default for AlphaShaperConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            min_ring_area: 0.0,
            parallel: true,
        }
    }
}

impl AlphaShaperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_min_ring_area(mut self, area: f64) -> Self {
        self.min_ring_area = area;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        positive("alpha", self.alpha)?;
        if !self.min_ring_area.is_finite() || self.min_ring_area < 0.0 {
            return Err(Error::InvalidInput(format!(
                "min_ring_area must be non-negative, got {}",
                self.min_ring_area
            )));
        }
        Ok(())
    }
}

/// Directions that regularized edges are snapped to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DominantDirections {
    /// Keep fitted edge directions.
    None,
    /// Principal axis of the plane's points and its perpendicular.
    PrincipalAxes,
    /// Length-weighted mean edge direction modulo 90°, and its perpendicular.
    Histogram,
    /// Caller supplied angles in the plane frame, in radians.
    Fixed(Vec<f64>),
}

/// Configuration for [`crate::LineDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDetectorConfig {
    /// Turning angle below which consecutive edges merge, and the snapping
    /// window around dominant directions (ε_theta)
    pub angle_tolerance: f64,
    /// Maximum distance of a ring vertex to the merged edge that replaces it
    pub distance_tolerance: f64,
    pub dominant_directions: DominantDirections,
    /// Furthest a regularized corner may move from its source vertex
    pub max_corner_shift: f64,
    /// Process rings on the rayon pool
    pub parallel: bool,
}

impl Default for LineDetectorConfig {
    fn default() -> Self {
        Self {
            angle_tolerance: 0.26, // ~15 degrees
            distance_tolerance: 0.4,
            dominant_directions: DominantDirections::Histogram,
            max_corner_shift: 1.0,
            parallel: true,
        }
    }
}

impl LineDetectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_angle_tolerance(mut self, angle: f64) -> Self {
        self.angle_tolerance = angle;
        self
    }

    pub fn with_distance_tolerance(mut self, distance: f64) -> Self {
        self.distance_tolerance = distance;
        self
    }

    pub fn with_dominant_directions(mut self, directions: DominantDirections) -> Self {
        self.dominant_directions = directions;
        self
    }

    pub fn with_max_corner_shift(mut self, shift: f64) -> Self {
        self.max_corner_shift = shift;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        positive("line angle_tolerance", self.angle_tolerance)?;
        positive("line distance_tolerance", self.distance_tolerance)?;
        positive("max_corner_shift", self.max_corner_shift)?;
        if let DominantDirections::Fixed(angles) = &self.dominant_directions {
            if angles.is_empty() || angles.iter().any(|a| !a.is_finite()) {
                return Err(Error::InvalidInput(
                    "fixed dominant directions must be a non-empty set of finite angles"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Configuration for a full [`crate::reconstruct`] run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Only points with this classification label enter plane detection
    pub classification: Option<i32>,
    pub plane_detector: PlaneDetectorConfig,
    pub alpha_shaper: AlphaShaperConfig,
    pub line_detector: LineDetectorConfig,
}

impl ReconstructionConfig {
    pub fn validate(&self) -> Result<()> {
        self.plane_detector.validate()?;
        self.alpha_shaper.validate()?;
        self.line_detector.validate()
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} must be positive and finite, got {}",
            name, value
        )))
    }
}
