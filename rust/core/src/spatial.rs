// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Grid-based spatial hash for nearest-neighbour queries on point indices.
//!
//! Space is divided into cubic cells of side `cell_size`. A k-nearest query
//! visits shells of cells around the query cell until the k-th candidate is
//! closer than any point that an unvisited shell could hold.

use nalgebra::Point3;
use rustc_hash::FxHashMap;

type Cell = (i64, i64, i64);

/// Spatial hash over indices into an external point slice.
#[derive(Debug, Clone)]
pub struct GridIndex {
    cell_size: f64,
    grid: FxHashMap<Cell, Vec<usize>>,
    min_cell: Cell,
    max_cell: Cell,
    len: usize,
}

impl GridIndex {
    /// Creates an empty index. `cell_size` must be positive.
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            grid: FxHashMap::default(),
            min_cell: (i64::MAX, i64::MAX, i64::MAX),
            max_cell: (i64::MIN, i64::MIN, i64::MIN),
            len: 0,
        }
    }

    /// Builds an index over `indices` of `points`.
    pub fn build(points: &[Point3<f64>], indices: &[usize], cell_size: f64) -> Self {
        let mut index = Self::new(cell_size);
        for &i in indices {
            index.insert(i, &points[i]);
        }
        index
    }

    /// Cell size giving roughly `k` points per cell column for a 2.5-D point
    /// set such as a roof.
    pub fn suggested_cell_size(points: &[Point3<f64>], indices: &[usize], k: usize) -> f64 {
        let Some(&first) = indices.first() else {
            return 1.0;
        };
        let mut min = points[first];
        let mut max = points[first];
        for &i in &indices[1..] {
            min = min.inf(&points[i]);
            max = max.sup(&points[i]);
        }
        let ext = max - min;
        let mut dims = [ext.x, ext.y, ext.z];
        dims.sort_by(|a, b| b.total_cmp(a));
        let area = dims[0] * dims[1].max(dims[0] * 1e-3);
        let size = (k.max(1) as f64 * area / indices.len() as f64).sqrt();
        if size.is_finite() && size > 1e-9 {
            size
        } else {
            1.0
        }
    }

    pub fn insert(&mut self, index: usize, point: &Point3<f64>) {
        let cell = self.cell_coords(point);
        self.min_cell = (
            self.min_cell.0.min(cell.0),
            self.min_cell.1.min(cell.1),
            self.min_cell.2.min(cell.2),
        );
        self.max_cell = (
            self.max_cell.0.max(cell.0),
            self.max_cell.1.max(cell.1),
            self.max_cell.2.max(cell.2),
        );
        self.grid.entry(cell).or_default().push(index);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `k` indexed points closest to `query`, nearest first.
    ///
    /// Equal distances are ordered by index so results are reproducible.
    pub fn k_nearest(&self, points: &[Point3<f64>], query: &Point3<f64>, k: usize) -> Vec<usize> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let (cx, cy, cz) = self.cell_coords(query);
        let max_r = [
            cx - self.min_cell.0,
            self.max_cell.0 - cx,
            cy - self.min_cell.1,
            self.max_cell.1 - cy,
            cz - self.min_cell.2,
            self.max_cell.2 - cz,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
        .max(0);

        let mut candidates: Vec<(f64, usize)> = Vec::new();
        for r in 0..=max_r {
            self.visit_shell((cx, cy, cz), r, |i| {
                candidates.push(((points[i] - query).norm_squared(), i));
            });

            if candidates.len() >= k {
                candidates.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                // Points in unvisited shells are at least r cells away
                let bound = r as f64 * self.cell_size;
                if candidates[k - 1].0 <= bound * bound {
                    break;
                }
            }
        }

        candidates.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        candidates.truncate(k);
        candidates.into_iter().map(|(_, i)| i).collect()
    }

    fn visit_shell(&self, center: Cell, r: i64, mut f: impl FnMut(usize)) {
        let (cx, cy, cz) = center;
        for dx in -r..=r {
            for dy in -r..=r {
                let on_face = dx.abs() == r || dy.abs() == r;
                let mut visit = |dz: i64| {
                    if let Some(cell) = self.grid.get(&(cx + dx, cy + dy, cz + dz)) {
                        cell.iter().copied().for_each(&mut f);
                    }
                };
                if on_face {
                    for dz in -r..=r {
                        visit(dz);
                    }
                } else if r > 0 {
                    visit(-r);
                    visit(r);
                } else {
                    visit(0);
                }
            }
        }
    }

    fn cell_coords(&self, p: &Point3<f64>) -> Cell {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> Vec<Point3<f64>> {
        (0..10)
            .flat_map(|i| (0..10).map(move |j| Point3::new(i as f64, j as f64, 0.0)))
            .collect()
    }

    fn brute_force(points: &[Point3<f64>], query: &Point3<f64>, k: usize) -> Vec<usize> {
        let mut all: Vec<(f64, usize)> = points
            .iter()
            .enumerate()
            .map(|(i, p)| ((p - query).norm_squared(), i))
            .collect();
        all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        all.into_iter().take(k).map(|(_, i)| i).collect()
    }

    #[test]
    fn test_k_nearest_matches_brute_force() {
        let points = grid_points();
        let indices: Vec<usize> = (0..points.len()).collect();
        let index = GridIndex::build(&points, &indices, 1.5);
        for query in [
            Point3::new(0.2, 0.1, 0.0),
            Point3::new(4.6, 5.4, 0.3),
            Point3::new(12.0, -3.0, 1.0),
        ] {
            assert_eq!(
                index.k_nearest(&points, &query, 7),
                brute_force(&points, &query, 7)
            );
        }
    }

    #[test]
    fn test_k_larger_than_index() {
        let points = grid_points();
        let index = GridIndex::build(&points, &[0, 1, 2], 1.0);
        let found = index.k_nearest(&points, &Point3::origin(), 10);
        assert_eq!(found, vec![0, 1, 2]);
    }

    #[test]
    fn test_subset_only() {
        let points = grid_points();
        let index = GridIndex::build(&points, &[50, 99], 1.0);
        assert_eq!(index.len(), 2);
        assert_eq!(index.k_nearest(&points, &Point3::origin(), 1), vec![50]);
    }

    #[test]
    fn test_suggested_cell_size() {
        let points = grid_points();
        let indices: Vec<usize> = (0..points.len()).collect();
        let size = GridIndex::suggested_cell_size(&points, &indices, 4);
        // 81 m² over 100 points, 4 per cell
        assert!((size - (4.0_f64 * 81.0 / 100.0).sqrt()).abs() < 1e-9);
    }
}
