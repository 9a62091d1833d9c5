// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Least-squares plane and line fitting.
//!
//! Both fits use the eigen-decomposition of the covariance matrix: the plane
//! normal is the eigenvector of the smallest eigenvalue, the 2-D principal
//! direction the eigenvector of the largest one.

use nalgebra::{Matrix2, Matrix3, Point2, Point3, SymmetricEigen, Vector2, Vector3};

use crate::error::{Error, Result};
use crate::types::Plane;

/// Fit a plane minimizing the orthogonal distance to `points`.
///
/// The iterator is walked twice (centroid, then covariance).
pub fn fit_plane<I>(points: I) -> Result<Plane>
where
    I: Iterator<Item = Point3<f64>> + Clone,
{
    let mut count = 0usize;
    let mut sum = Vector3::zeros();
    for p in points.clone() {
        sum += p.coords;
        count += 1;
    }
    if count < 3 {
        return Err(Error::DegenerateGeometry(format!(
            "plane fit needs at least 3 points, got {}",
            count
        )));
    }
    let centroid = Point3::from(sum / count as f64);

    let mut cov = Matrix3::zeros();
    for p in points {
        let d = p - centroid;
        cov += d * d.transpose();
    }
    cov /= count as f64;

    let eigen = SymmetricEigen::new(cov);
    let normal: Vector3<f64> = eigen.eigenvectors.column(eigen.eigenvalues.imin()).into_owned();
    let norm = normal.norm();
    if !norm.is_finite() || norm < 1e-12 || !centroid.coords.iter().all(|c| c.is_finite()) {
        return Err(Error::NumericalInstability(
            "plane fit produced a non-finite normal".to_string(),
        ));
    }

    Ok(Plane::from_point_normal(&centroid, normal / norm))
}

/// Root-mean-square orthogonal distance of `points` to `plane`.
pub fn rms_distance(plane: &Plane, points: &[Point3<f64>]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = points
        .iter()
        .map(|p| plane.signed_distance(p).powi(2))
        .sum();
    (sum_sq / points.len() as f64).sqrt()
}

/// Orthogonal-regression line through 2-D points.
///
/// Returns the centroid and the unit direction of largest spread, `None` for
/// fewer than 2 points or coincident points.
pub fn fit_line_2d(points: &[Point2<f64>]) -> Option<(Point2<f64>, Vector2<f64>)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let sum = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords);
    let centroid = Point2::from(sum / n);

    let mut cov = Matrix2::zeros();
    for p in points {
        let d = p - centroid;
        cov += d * d.transpose();
    }
    if cov.trace() < 1e-24 {
        return None;
    }

    let eigen = SymmetricEigen::new(cov);
    let direction: Vector2<f64> = eigen.eigenvectors.column(eigen.eigenvalues.imax()).into_owned();
    let norm = direction.norm();
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    Some((centroid, direction / norm))
}

/// Angle in `[0, π)` of the principal axis of a 2-D point set.
pub fn principal_direction_2d(points: &[Point2<f64>]) -> Option<f64> {
    let (_, dir) = fit_line_2d(points)?;
    let angle = dir.y.atan2(dir.x).rem_euclid(std::f64::consts::PI);
    Some(angle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_horizontal_plane() {
        let points = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let plane = fit_plane(points.iter().copied()).unwrap();
        assert_relative_eq!(plane.normal.z, 1.0, epsilon = 1e-9);
        assert_relative_eq!(plane.offset, -1.0, epsilon = 1e-9);
        assert_relative_eq!(rms_distance(&plane, &points), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_slanted_plane() {
        // z = 0.5 x + 2
        let points: Vec<_> = (0..5)
            .flat_map(|i| (0..5).map(move |j| (i as f64, j as f64)))
            .map(|(x, y)| Point3::new(x, y, 0.5 * x + 2.0))
            .collect();
        let plane = fit_plane(points.iter().copied()).unwrap();
        let expected = Vector3::new(-0.5, 0.0, 1.0).normalize();
        assert_relative_eq!(plane.normal, expected, epsilon = 1e-9);
        assert!(plane.distance(&Point3::new(10.0, -3.0, 7.0)) < 1e-9);
    }

    #[test]
    fn test_fit_needs_three_points() {
        let points = [Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let result = fit_plane(points.iter().copied());
        assert!(matches!(result, Err(Error::DegenerateGeometry(_))));
    }

    #[test]
    fn test_fit_line_2d() {
        let points = vec![
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(2.0, 3.0),
            Point2::new(3.0, 4.0),
        ];
        let (centroid, dir) = fit_line_2d(&points).unwrap();
        assert_relative_eq!(centroid, Point2::new(1.5, 2.5), epsilon = 1e-12);
        assert_relative_eq!((dir.x * dir.y).abs(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_principal_direction() {
        let points: Vec<_> = (0..10)
            .map(|i| Point2::new(i as f64, 0.1 * ((i % 2) as f64)))
            .collect();
        let angle = principal_direction_2d(&points).unwrap();
        assert!(angle < 0.05 || angle > std::f64::consts::PI - 0.05);
        assert!(principal_direction_2d(&[Point2::new(1.0, 1.0)]).is_none());
    }
}
