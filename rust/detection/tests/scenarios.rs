// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roofer_core::frame::signed_area_2d;
use roofer_core::{
    classification, DiagnosticKind, EdgeSegment, Error, Plane, PointCloud, RingKind, RoofPlane,
    Stage, NO_PLANE,
};
use roofer_detection::predicates::is_simple;
use roofer_detection::{
    reconstruct, AlphaShaper, AlphaShaperConfig, LineDetector, ReconstructionConfig,
};

/// 40 x 25 jittered grid over a 10 m square at z = 0.
fn jittered_square(rng: &mut StdRng) -> Vec<Point3<f64>> {
    let mut points = Vec::new();
    for i in 0..40 {
        for j in 0..25 {
            let x = (i as f64 + 0.5) * 0.25 + rng.random_range(-0.05..0.05);
            let y = (j as f64 + 0.5) * 0.4 + rng.random_range(-0.05..0.05);
            let z = rng.random_range(-0.02..0.02);
            points.push(Point3::new(x, y, z));
        }
    }
    points
}

/// Square plus 200 outliers above it.
fn square_with_outliers(seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = jittered_square(&mut rng);
    for _ in 0..200 {
        points.push(Point3::new(
            rng.random_range(-2.0..12.0),
            rng.random_range(-2.0..12.0),
            rng.random_range(0.5..5.0),
        ));
    }
    PointCloud::from_points(points).unwrap()
}

/// Square plus 200 outliers in a 2 m slab centred on it.
fn square_with_band_outliers(seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = jittered_square(&mut rng);
    for _ in 0..200 {
        points.push(Point3::new(
            rng.random_range(0.0..10.0),
            rng.random_range(0.0..10.0),
            rng.random_range(-1.0..1.0),
        ));
    }
    PointCloud::from_points(points).unwrap()
}

/// 10 m square with a 2 m square hole in the middle, at z = 1.
fn square_with_hole() -> PointCloud {
    let step = 10.0 / 39.0;
    let points: Vec<_> = (0..40)
        .flat_map(|i| (0..40).map(move |j| Point3::new(i as f64 * step, j as f64 * step, 1.0)))
        .filter(|p| !((4.0..=6.0).contains(&p.x) && (4.0..=6.0).contains(&p.y)))
        .collect();
    PointCloud::from_points(points).unwrap()
}

fn assert_square_corners(edges: &[EdgeSegment]) {
    assert_eq!(edges.len(), 4);
    for i in 0..4 {
        let dot = edges[i].direction().dot(&edges[(i + 1) % 4].direction());
        assert!(dot.abs() < 1e-6, "corner {} is not square: {}", i, dot);
    }
}

/// Gable roof, ridge along x at y = 4, classified as building, with ground
/// points around it.
fn gable_building(seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::new();
    let mut classes = Vec::new();
    for _ in 0..960 {
        let x: f64 = rng.random_range(0.0..12.0);
        let y: f64 = rng.random_range(0.0..8.0);
        let z = 5.0 - 0.5 * (y - 4.0).abs() + rng.random_range(-0.03..0.03);
        points.push(Point3::new(x, y, z));
        classes.push(classification::BUILDING);
    }
    for _ in 0..300 {
        let x: f64 = rng.random_range(-4.0..16.0);
        let y: f64 = rng.random_range(-4.0..-1.0);
        points.push(Point3::new(x, y, rng.random_range(-0.03..0.03)));
        classes.push(classification::GROUND);
    }
    PointCloud::new(points, classes).unwrap()
}

fn building_config() -> ReconstructionConfig {
    ReconstructionConfig {
        classification: Some(classification::BUILDING),
        alpha_shaper: AlphaShaperConfig::default().with_alpha(1.0),
        ..Default::default()
    }
}

#[test]
fn test_flat_square_with_outliers() {
    let cloud = square_with_outliers(7);
    let result = reconstruct(&cloud, &ReconstructionConfig::default()).unwrap();

    assert_eq!(result.planes.planes.len(), 1);
    let plane = &result.planes.planes[0];
    assert!(plane.inlier_count() >= 800, "only {} inliers", plane.inlier_count());
    assert!(plane.plane.normal.z > 0.99);

    assert_eq!(result.alpha_shapes.rings.len(), 1);
    assert_eq!(result.alpha_shapes.rings[0].kind, RingKind::Outer);
    let area = result.alpha_shapes.rings[0].signed_area(&plane.frame());
    assert!(area > 85.0 && area < 101.0, "ring area {}", area);

    assert_eq!(result.lines.rings.len(), 1);
    assert_square_corners(&result.lines.rings[0].edges);
    assert!(result.diagnostics().next().is_none());
}

#[test]
fn test_flat_square_with_band_outliers() {
    for seed in [1, 7, 21, 99] {
        let cloud = square_with_band_outliers(seed);
        let result = reconstruct(&cloud, &ReconstructionConfig::default()).unwrap();

        assert_eq!(result.planes.planes.len(), 1, "seed {}", seed);
        let plane = &result.planes.planes[0];
        assert!(plane.inlier_count() >= 800, "seed {}: {} inliers", seed, plane.inlier_count());
        assert!(plane.plane.normal.z.abs() > 0.99);

        let outer = result
            .alpha_shapes
            .rings
            .iter()
            .filter(|ring| ring.kind == RingKind::Outer)
            .count();
        assert_eq!(outer, 1, "seed {}", seed);
        let line_outer: Vec<_> = result
            .lines
            .rings
            .iter()
            .filter(|ring| ring.kind == RingKind::Outer)
            .collect();
        assert_eq!(line_outer.len(), 1, "seed {}", seed);
        assert_square_corners(&line_outer[0].edges);
    }
}

#[test]
fn test_line_rings_keep_source_winding() {
    let cloud = square_with_hole();
    let config = ReconstructionConfig {
        alpha_shaper: AlphaShaperConfig::default().with_alpha(0.5),
        ..Default::default()
    };
    let result = reconstruct(&cloud, &config).unwrap();
    assert_eq!(result.planes.planes.len(), 1);
    let frame = result.planes.planes[0].frame();

    let kinds: Vec<_> = result.lines.rings.iter().map(|ring| ring.kind).collect();
    assert_eq!(kinds, vec![RingKind::Outer, RingKind::Hole]);

    for ring in &result.lines.rings {
        let source = result.alpha_shapes.rings[ring.ring_index].signed_area(&frame);
        let polygon: Vec<_> = ring.edges.iter().map(|e| frame.project(&e.start)).collect();
        let area = signed_area_2d(&polygon);
        assert!(area * source > 0.0, "ring {}: {} vs {}", ring.ring_index, area, source);
        match ring.kind {
            RingKind::Outer => assert!(area > 0.0),
            RingKind::Hole => assert!(area < 0.0),
        }
    }
}

#[test]
fn test_empty_cloud_is_invalid_input() {
    let cloud = PointCloud::from_points(Vec::new()).unwrap();
    let err = reconstruct(&cloud, &ReconstructionConfig::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn test_disjoint_coplanar_clusters() {
    let mut points = Vec::new();
    for offset in [0.0, 10.0] {
        for i in 0..20 {
            for j in 0..20 {
                points.push(Point3::new(offset + i as f64 * 0.25, j as f64 * 0.25, 2.0));
            }
        }
    }
    let cloud = PointCloud::from_points(points).unwrap();
    let config = ReconstructionConfig {
        alpha_shaper: AlphaShaperConfig::default().with_alpha(1.0),
        ..Default::default()
    };
    let result = reconstruct(&cloud, &config).unwrap();

    assert_eq!(result.planes.planes.len(), 1);
    assert_eq!(result.alpha_shapes.rings.len(), 2);
    assert!(result
        .alpha_shapes
        .ring_labels
        .iter()
        .all(|label| label.plane_id == 1));
    assert!(result
        .alpha_shapes
        .rings
        .iter()
        .all(|ring| ring.kind == RingKind::Outer));
    assert_eq!(result.lines.rings.len(), 2);
    assert_eq!(result.edge_count(), 8);
}

#[test]
fn test_degenerate_plane_is_isolated() {
    let tiny = RoofPlane::new(
        1,
        Plane::from_point_normal(&Point3::new(0.0, 0.0, 1.0), Vector3::z()),
        vec![0, 1],
        vec![Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 0.0, 1.0)],
    );
    let points: Vec<_> = (0..10)
        .flat_map(|i| (0..10).map(move |j| Point3::new(i as f64 * 0.3, j as f64 * 0.3, 4.0)))
        .collect();
    let healthy = RoofPlane::new(
        2,
        Plane::from_point_normal(&points[0], Vector3::z()),
        (2..102).collect(),
        points,
    );
    let planes = vec![tiny, healthy];

    let shapes = AlphaShaper::default().compute(&planes).unwrap();
    assert_eq!(shapes.diagnostics.len(), 1);
    let diagnostic = &shapes.diagnostics[0];
    assert_eq!(diagnostic.plane_id, 1);
    assert_eq!(diagnostic.stage, Stage::AlphaShape);
    assert_eq!(diagnostic.kind, DiagnosticKind::DegenerateGeometry);
    assert_eq!(shapes.rings.len(), 1);

    let lines = LineDetector::default()
        .detect(&shapes.rings, &shapes.ring_labels, &planes)
        .unwrap();
    assert_eq!(lines.rings.len(), 1);
    assert_eq!(lines.rings[0].plane_id, 2);
    assert_eq!(lines.rings[0].edges.len(), 4);
}

#[test]
fn test_gable_roof_partition() {
    let cloud = gable_building(11);
    let result = reconstruct(&cloud, &building_config()).unwrap();
    let planes = &result.planes;

    assert_eq!(planes.planes.len(), 2);
    assert_eq!(planes.plane_id.len(), cloud.len());

    let mut owner = vec![NO_PLANE; cloud.len()];
    for plane in &planes.planes {
        for &i in &plane.indices {
            assert_eq!(owner[i], NO_PLANE, "point {} in two planes", i);
            owner[i] = plane.id;
        }
    }
    assert_eq!(owner, planes.plane_id);

    // Ground points never enter segmentation
    for (i, &class) in cloud.classification().iter().enumerate() {
        if class == classification::GROUND {
            assert_eq!(planes.plane_id[i], NO_PLANE);
        }
    }
}

#[test]
fn test_plane_residuals_within_tolerance() {
    let cloud = gable_building(3);
    let config = building_config();
    let result = reconstruct(&cloud, &config).unwrap();
    for plane in &result.planes.planes {
        assert!(plane.rms <= config.plane_detector.distance_tolerance);
        for p in &plane.points {
            assert!(plane.plane.distance(p) <= config.plane_detector.distance_tolerance);
        }
    }
}

#[test]
fn test_rings_and_edges_are_simple() {
    let cloud = gable_building(5);
    let result = reconstruct(&cloud, &building_config()).unwrap();
    assert!(!result.lines.rings.is_empty());

    for (ring, label) in result.alpha_shapes.rings.iter().zip(&result.alpha_shapes.ring_labels) {
        let plane = result.planes.plane(label.plane_id).unwrap();
        let frame = plane.frame();
        assert!(is_simple(&frame.project_all(&ring.vertices)));
    }

    for ring in &result.lines.rings {
        let plane = result.planes.plane(ring.plane_id).unwrap();
        let frame = plane.frame();
        let polygon: Vec<_> = ring.edges.iter().map(|e| frame.project(&e.start)).collect();
        assert!(is_simple(&polygon), "ring {} self-intersects", ring.ring_index);

        // Closed chain
        let n = ring.edges.len();
        for i in 0..n {
            assert_eq!(ring.edges[i].end, ring.edges[(i + 1) % n].start);
        }
    }
}

#[test]
fn test_merging_never_adds_edges() {
    let cloud = gable_building(9);
    let result = reconstruct(&cloud, &building_config()).unwrap();
    for ring in &result.lines.rings {
        let source = &result.alpha_shapes.rings[ring.ring_index];
        assert!(ring.edges.len() <= source.len());
        assert_eq!(ring.kind, source.kind);
    }
}

#[test]
fn test_line_detection_is_repeatable() {
    let cloud = gable_building(13);
    let result = reconstruct(&cloud, &building_config()).unwrap();
    let shapes = &result.alpha_shapes;
    let detector = LineDetector::default();
    let again = detector
        .detect(&shapes.rings, &shapes.ring_labels, &result.planes.planes)
        .unwrap();
    assert_eq!(again.rings, result.lines.rings);
}

#[test]
fn test_parallel_matches_sequential() {
    let cloud = gable_building(17);
    let parallel = reconstruct(&cloud, &building_config()).unwrap();

    let mut config = building_config();
    config.alpha_shaper.parallel = false;
    config.line_detector.parallel = false;
    let sequential = reconstruct(&cloud, &config).unwrap();

    assert_eq!(parallel.planes.plane_id, sequential.planes.plane_id);
    assert_eq!(parallel.alpha_shapes.rings, sequential.alpha_shapes.rings);
    assert_eq!(parallel.lines.rings, sequential.lines.rings);
}
