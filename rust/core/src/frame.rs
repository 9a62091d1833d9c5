// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 2-D coordinate frames on fitted planes.

use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::types::Plane;

/// Orthonormal frame `(u_axis, v_axis, normal)` anchored on a plane.
///
/// `u_axis × v_axis == normal`, so a counter-clockwise polygon in frame
/// coordinates is counter-clockwise when viewed from the normal side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneFrame {
    pub origin: Point3<f64>,
    pub u_axis: Vector3<f64>,
    pub v_axis: Vector3<f64>,
    pub normal: Vector3<f64>,
}

impl PlaneFrame {
    /// Frame on `plane` with its origin at the projection of `anchor`.
    pub fn new(plane: &Plane, anchor: &Point3<f64>) -> Self {
        let normal = plane.normal;

        // Use the axis least parallel to the normal for a stable cross product
        let abs_x = normal.x.abs();
        let abs_y = normal.y.abs();
        let abs_z = normal.z.abs();

        let reference = if abs_x <= abs_y && abs_x <= abs_z {
            Vector3::new(1.0, 0.0, 0.0)
        } else if abs_y <= abs_z {
            Vector3::new(0.0, 1.0, 0.0)
        } else {
            Vector3::new(0.0, 0.0, 1.0)
        };

        let u_axis = normal.cross(&reference).normalize();
        let v_axis = normal.cross(&u_axis).normalize();

        Self {
            origin: plane.project(anchor),
            u_axis,
            v_axis,
            normal,
        }
    }

    /// Orthogonal projection into frame coordinates.
    #[inline]
    pub fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        let v = point - self.origin;
        Point2::new(v.dot(&self.u_axis), v.dot(&self.v_axis))
    }

    /// Point on the plane at the given frame coordinates.
    #[inline]
    pub fn lift(&self, point: &Point2<f64>) -> Point3<f64> {
        self.origin + self.u_axis * point.x + self.v_axis * point.y
    }

    pub fn project_all(&self, points: &[Point3<f64>]) -> Vec<Point2<f64>> {
        points.iter().map(|p| self.project(p)).collect()
    }
}

/// Shoelace area, positive for counter-clockwise polygons.
pub fn signed_area_2d(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    area / 2.0
}
