// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-point normal estimation from k-nearest neighbourhoods.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use roofer_core::{fit_plane, GridIndex};

/// Normals for `candidates`, as a vector parallel to `points`.
///
/// Entries of non-candidates, and of candidates whose neighbourhood is
/// degenerate, are zero vectors.
pub fn estimate_normals(points: &[Point3<f64>], candidates: &[usize], k: usize) -> Vec<Vector3<f64>> {
    let mut normals = vec![Vector3::zeros(); points.len()];
    if candidates.is_empty() {
        return normals;
    }

    let cell_size = GridIndex::suggested_cell_size(points, candidates, k);
    let index = GridIndex::build(points, candidates, cell_size);

    let estimated: Vec<(usize, Vector3<f64>)> = candidates
        .par_iter()
        .map(|&i| {
            let neighbours = index.k_nearest(points, &points[i], k);
            let normal = fit_plane(neighbours.iter().map(|&j| points[j]))
                .map(|plane| plane.normal)
                .unwrap_or_else(|_| Vector3::zeros());
            (i, normal)
        })
        .collect();

    for (i, normal) in estimated {
        normals[i] = normal;
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normals_on_slanted_plane() {
        let points: Vec<_> = (0..12)
            .flat_map(|i| (0..12).map(move |j| (i as f64 * 0.5, j as f64 * 0.5)))
            .map(|(x, y)| Point3::new(x, y, 0.4 * y))
            .collect();
        let candidates: Vec<usize> = (0..points.len()).collect();
        let normals = estimate_normals(&points, &candidates, 8);
        let expected = Vector3::new(0.0, -0.4, 1.0).normalize();
        for n in &normals {
            assert!(n.dot(&expected) > 0.999);
        }
    }

    #[test]
    fn test_non_candidates_stay_zero() {
        let points: Vec<_> = (0..20)
            .map(|i| Point3::new((i % 5) as f64, (i / 5) as f64, 0.0))
            .collect();
        let candidates: Vec<usize> = (0..10).collect();
        let normals = estimate_normals(&points, &candidates, 5);
        assert!(normals[15].norm() == 0.0);
        assert!(normals[3].z > 0.99);
    }
}
