// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Exact 2-D predicates and polygon simplicity checks.
//!
//! Orientation signs come from `robust::orient2d` (adaptive exact
//! arithmetic), so topology decisions do not flip on near-degenerate input.

use nalgebra::Point2;
use robust::Coord;

#[inline]
fn coord(p: &Point2<f64>) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

/// Orientation of the triangle `(a, b, c)`: positive when counter-clockwise,
/// negative when clockwise, exactly zero when collinear.
#[inline]
pub fn orient2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    robust::orient2d(coord(a), coord(b), coord(c))
}

/// `p` lies within the bounding box of segment `(a, b)`. Only meaningful
/// when `p` is known to be collinear with the segment.
#[inline]
fn within_box(a: &Point2<f64>, b: &Point2<f64>, p: &Point2<f64>) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Whether closed segments `(a, b)` and `(c, d)` share at least one point.
pub fn segments_intersect(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>, d: &Point2<f64>) -> bool {
    let o1 = orient2d(a, b, c);
    let o2 = orient2d(a, b, d);
    let o3 = orient2d(c, d, a);
    let o4 = orient2d(c, d, b);

    if ((o1 > 0.0 && o2 < 0.0) || (o1 < 0.0 && o2 > 0.0))
        && ((o3 > 0.0 && o4 < 0.0) || (o3 < 0.0 && o4 > 0.0))
    {
        return true;
    }

    (o1 == 0.0 && within_box(a, b, c))
        || (o2 == 0.0 && within_box(a, b, d))
        || (o3 == 0.0 && within_box(c, d, a))
        || (o4 == 0.0 && within_box(c, d, b))
}

/// Pairs of edge indices `(i, j)`, `i < j`, that violate simplicity of the
/// closed polygon. Edge `i` runs from vertex `i` to vertex `i + 1`.
///
/// Adjacent edges may only share their common vertex; a zero-length edge or
/// an edge folding back onto its neighbour is reported against that
/// neighbour.
pub fn self_intersections(polygon: &[Point2<f64>]) -> Vec<(usize, usize)> {
    let n = polygon.len();
    let mut found = Vec::new();
    if n < 3 {
        return found;
    }

    let edge = |i: usize| (&polygon[i], &polygon[(i + 1) % n]);

    for i in 0..n {
        let (a, b) = edge(i);
        for j in (i + 1)..n {
            let (c, d) = edge(j);
            let adjacent_forward = j == i + 1;
            let adjacent_wrap = i == 0 && j == n - 1;

            if adjacent_forward || adjacent_wrap {
                // Shared vertex: b == c (forward) or d == a (wrap)
                let (p, shared, q) = if adjacent_forward { (a, b, d) } else { (c, a, b) };
                if p == shared || q == shared {
                    found.push((i, j));
                    continue;
                }
                if orient2d(p, shared, q) == 0.0 {
                    let folds_back = (shared - p).dot(&(q - shared)) < 0.0;
                    if folds_back {
                        found.push((i, j));
                    }
                }
                continue;
            }

            if segments_intersect(a, b, c, d) {
                found.push((i, j));
            }
        }
    }

    found
}

/// Whether the closed polygon has no self-intersections.
pub fn is_simple(polygon: &[Point2<f64>]) -> bool {
    polygon.len() >= 3 && self_intersections(polygon).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point2<f64> {
        Point2::new(x, y)
    }

    #[test]
    fn test_orientation_sign() {
        assert!(orient2d(&p(0.0, 0.0), &p(1.0, 0.0), &p(0.0, 1.0)) > 0.0);
        assert!(orient2d(&p(0.0, 0.0), &p(0.0, 1.0), &p(1.0, 0.0)) < 0.0);
        assert_eq!(orient2d(&p(0.0, 0.0), &p(1.0, 1.0), &p(3.0, 3.0)), 0.0);
    }

    #[test]
    fn test_near_collinear_is_exact() {
        let a = p(0.5, 0.5);
        let b = p(12.0, 12.0);
        let c = p(24.0, 24.0);
        assert_eq!(orient2d(&a, &b, &c), 0.0);
        let c_off = p(24.0, 24.0 + f64::EPSILON * 32.0);
        assert!(orient2d(&a, &b, &c_off) > 0.0);
    }

    #[test]
    fn test_segments_intersect() {
        assert!(segments_intersect(&p(0.0, 0.0), &p(2.0, 2.0), &p(0.0, 2.0), &p(2.0, 0.0)));
        assert!(!segments_intersect(&p(0.0, 0.0), &p(1.0, 0.0), &p(0.0, 1.0), &p(1.0, 1.0)));
        // Touching at an endpoint
        assert!(segments_intersect(&p(0.0, 0.0), &p(1.0, 0.0), &p(1.0, 0.0), &p(1.0, 1.0)));
        // Collinear, disjoint
        assert!(!segments_intersect(&p(0.0, 0.0), &p(1.0, 0.0), &p(2.0, 0.0), &p(3.0, 0.0)));
    }

    #[test]
    fn test_square_is_simple() {
        let square = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)];
        assert!(is_simple(&square));
    }

    #[test]
    fn test_bowtie_is_not_simple() {
        let bowtie = [p(0.0, 0.0), p(1.0, 1.0), p(1.0, 0.0), p(0.0, 1.0)];
        assert_eq!(self_intersections(&bowtie), vec![(0, 2)]);
    }

    #[test]
    fn test_spike_is_not_simple() {
        let spike = [p(0.0, 0.0), p(2.0, 0.0), p(1.0, 0.0), p(1.0, 1.0)];
        assert!(!is_simple(&spike));
    }

    #[test]
    fn test_duplicate_vertex_is_not_simple() {
        let dup = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 0.0), p(0.0, 1.0)];
        assert!(!is_simple(&dup));
    }
}
