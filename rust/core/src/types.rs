// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core types flowing between the detection stages.

use std::collections::BTreeMap;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frame::PlaneFrame;

/// Plane identifier. `NO_PLANE` marks points outside every detected plane,
/// detected planes are numbered from 1.
pub type PlaneId = u32;

/// Sentinel plane id for unassigned points.
pub const NO_PLANE: PlaneId = 0;

/// ASPRS classification codes used by building point clouds.
pub mod classification {
    pub const UNCLASSIFIED: i32 = 1;
    pub const GROUND: i32 = 2;
    pub const BUILDING: i32 = 6;
}

/// Ordered point set with parallel per-point attributes.
///
/// The index of a point is its only identity; every attribute array is
/// indexed the same way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointCloud {
    points: Vec<Point3<f64>>,
    classification: Vec<i32>,
    attributes: BTreeMap<String, Vec<f64>>,
}

impl PointCloud {
    /// Create a point cloud from coordinates and their classification labels.
    pub fn new(points: Vec<Point3<f64>>, classification: Vec<i32>) -> Result<Self> {
        if points.len() != classification.len() {
            return Err(Error::InvalidInput(format!(
                "{} points but {} classification labels",
                points.len(),
                classification.len()
            )));
        }
        if let Some(i) = points.iter().position(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(Error::InvalidInput(format!(
                "point {} has non-finite coordinates",
                i
            )));
        }
        Ok(Self {
            points,
            classification,
            attributes: BTreeMap::new(),
        })
    }

    /// Create a point cloud where every point is unclassified.
    pub fn from_points(points: Vec<Point3<f64>>) -> Result<Self> {
        let classification = vec![classification::UNCLASSIFIED; points.len()];
        Self::new(points, classification)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn point(&self, index: usize) -> Option<&Point3<f64>> {
        self.points.get(index)
    }

    pub fn classification(&self) -> &[i32] {
        &self.classification
    }

    /// Attach an extra per-point attribute. Replaces an attribute of the same name.
    pub fn insert_attribute(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.points.len() {
            return Err(Error::InvalidInput(format!(
                "attribute '{}' has {} values for {} points",
                name,
                values.len(),
                self.points.len()
            )));
        }
        self.attributes.insert(name, values);
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&[f64]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Indices of all points carrying the given classification label.
    pub fn indices_with_class(&self, class: i32) -> Vec<usize> {
        self.classification
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == class)
            .map(|(i, _)| i)
            .collect()
    }

    /// Axis-aligned bounds, `None` for an empty cloud.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = *self.points.first()?;
        let mut min = first;
        let mut max = first;
        for p in &self.points[1..] {
            min = min.inf(p);
            max = max.sup(p);
        }
        Some((min, max))
    }
}

/// Fitted plane `normal · p + offset = 0`.
///
/// The normal is unit length and oriented upwards (non-negative z); for
/// vertical planes the sign is fixed on y, then x.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub offset: f64,
}

impl Plane {
    /// Plane through `point` with the given normal. The normal is normalized
    /// and oriented upwards.
    pub fn from_point_normal(point: &Point3<f64>, normal: Vector3<f64>) -> Self {
        let normal = orient_upward(normal.normalize());
        Self {
            normal,
            offset: -normal.dot(&point.coords),
        }
    }

    /// Plane through three points, `None` if they are (nearly) collinear.
    pub fn from_points(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<Self> {
        let normal = (b - a).cross(&(c - a));
        let len = normal.norm();
        if !len.is_finite() || len < 1e-12 {
            return None;
        }
        Some(Self::from_point_normal(a, normal / len))
    }

    pub fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        self.normal.dot(&point.coords) + self.offset
    }

    pub fn distance(&self, point: &Point3<f64>) -> f64 {
        self.signed_distance(point).abs()
    }

    /// Orthogonal projection of `point` onto the plane.
    pub fn project(&self, point: &Point3<f64>) -> Point3<f64> {
        point - self.normal * self.signed_distance(point)
    }

    /// Inclination from horizontal, in radians.
    pub fn slope(&self) -> f64 {
        self.normal.z.abs().min(1.0).acos()
    }
}

pub(crate) fn orient_upward(normal: Vector3<f64>) -> Vector3<f64> {
    const EPS: f64 = 1e-12;
    let flip = if normal.z.abs() > EPS {
        normal.z < 0.0
    } else if normal.y.abs() > EPS {
        normal.y < 0.0
    } else {
        normal.x < 0.0
    };
    if flip {
        -normal
    } else {
        normal
    }
}

/// A detected planar cluster of roof points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoofPlane {
    pub id: PlaneId,
    pub plane: Plane,
    /// Indices into the source point cloud, ascending.
    pub indices: Vec<usize>,
    /// Copies of the member points, parallel to `indices`.
    pub points: Vec<Point3<f64>>,
    /// Centroid of the members, projected onto the plane.
    pub centroid: Point3<f64>,
    /// Root-mean-square orthogonal distance of the members to the plane.
    pub rms: f64,
    pub is_horizontal: bool,
    pub is_wall: bool,
}

impl RoofPlane {
    /// Build a plane record from its members, deriving centroid and residual.
    pub fn new(id: PlaneId, plane: Plane, indices: Vec<usize>, points: Vec<Point3<f64>>) -> Self {
        let centroid = if points.is_empty() {
            plane.project(&Point3::origin())
        } else {
            let sum = points
                .iter()
                .fold(Vector3::zeros(), |acc, p| acc + p.coords);
            plane.project(&Point3::from(sum / points.len() as f64))
        };
        let rms = crate::fit::rms_distance(&plane, &points);
        Self {
            id,
            plane,
            indices,
            points,
            centroid,
            rms,
            is_horizontal: false,
            is_wall: false,
        }
    }

    pub fn inlier_count(&self) -> usize {
        self.indices.len()
    }

    /// 2-D frame on the plane, anchored at the centroid.
    pub fn frame(&self) -> PlaneFrame {
        PlaneFrame::new(&self.plane, &self.centroid)
    }
}

/// Whether a ring bounds a region or a hole in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingKind {
    /// Counter-clockwise seen from the plane normal.
    Outer,
    /// Clockwise seen from the plane normal.
    Hole,
}

/// Closed boundary polygon. The first vertex is not repeated at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    pub vertices: Vec<Point3<f64>>,
    pub kind: RingKind,
}

impl Ring {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Signed area in the given frame, positive for counter-clockwise rings.
    pub fn signed_area(&self, frame: &PlaneFrame) -> f64 {
        let pts: Vec<_> = self.vertices.iter().map(|p| frame.project(p)).collect();
        crate::frame::signed_area_2d(&pts)
    }
}

/// Owning plane of a ring, parallel to the ring sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingLabel {
    pub plane_id: PlaneId,
}

/// One regularized boundary edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSegment {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
}

impl EdgeSegment {
    pub fn new(start: Point3<f64>, end: Point3<f64>) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Unit direction from start to end (zero for a degenerate edge).
    pub fn direction(&self) -> Vector3<f64> {
        let d = self.end - self.start;
        let len = d.norm();
        if len > 0.0 {
            d / len
        } else {
            Vector3::zeros()
        }
    }
}

/// Regularized edges of one ring, in the ring's winding order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingEdges {
    pub plane_id: PlaneId,
    /// Index of the source ring in the alpha shaper output.
    pub ring_index: usize,
    pub kind: RingKind,
    pub edges: Vec<EdgeSegment>,
}
