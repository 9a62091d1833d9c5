// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end reconstruction: planes, alpha shapes, then regularized lines.

use roofer_core::{Diagnostic, PointCloud, Result};
use serde::{Deserialize, Serialize};

use crate::alpha_shaper::{AlphaShaper, AlphaShapes};
use crate::config::ReconstructionConfig;
use crate::line_detector::{LineDetection, LineDetector};
use crate::plane_detector::{PlaneDetection, PlaneDetector};

/// Output of every stage of a reconstruction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconstruction {
    pub planes: PlaneDetection,
    pub alpha_shapes: AlphaShapes,
    pub lines: LineDetection,
}

impl Reconstruction {
    /// Diagnostics of all stages, in stage order.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.planes
            .diagnostics
            .iter()
            .chain(&self.alpha_shapes.diagnostics)
            .chain(&self.lines.diagnostics)
    }

    pub fn edge_count(&self) -> usize {
        self.lines.edge_count()
    }
}

/// Run plane detection, alpha shaping and line detection on `cloud`.
///
/// With `config.classification` set only points carrying that label are
/// segmented; `planes.plane_id` still covers every input point.
pub fn reconstruct(cloud: &PointCloud, config: &ReconstructionConfig) -> Result<Reconstruction> {
    config.validate()?;

    let detector = PlaneDetector::new(config.plane_detector.clone());
    let planes = match config.classification {
        Some(class) => {
            let candidates = cloud.indices_with_class(class);
            tracing::debug!(class, candidates = candidates.len(), "Selected classified points");
            detector.detect_subset(cloud, &candidates)?
        }
        None => detector.detect(cloud)?,
    };

    let alpha_shapes = AlphaShaper::new(config.alpha_shaper.clone()).compute(&planes.planes)?;

    let lines = LineDetector::new(config.line_detector.clone()).detect(
        &alpha_shapes.rings,
        &alpha_shapes.ring_labels,
        &planes.planes,
    )?;

    let reconstruction = Reconstruction {
        planes,
        alpha_shapes,
        lines,
    };
    tracing::info!(
        planes = reconstruction.planes.planes.len(),
        rings = reconstruction.alpha_shapes.rings.len(),
        edges = reconstruction.edge_count(),
        diagnostics = reconstruction.diagnostics().count(),
        "Reconstruction finished"
    );
    Ok(reconstruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use roofer_core::{classification, Error};

    fn flat_roof() -> PointCloud {
        let mut points = Vec::new();
        let mut classes = Vec::new();
        for i in 0..30 {
            for j in 0..20 {
                points.push(Point3::new(i as f64 * 0.3, j as f64 * 0.3, 4.0));
                classes.push(classification::BUILDING);
            }
        }
        // Ground around the building
        for i in 0..40 {
            for j in 0..10 {
                points.push(Point3::new(-3.0 + i as f64 * 0.4, -4.0 + j as f64 * 0.3, 0.0));
                classes.push(classification::GROUND);
            }
        }
        PointCloud::new(points, classes).unwrap()
    }

    #[test]
    fn test_reconstruct_flat_roof() {
        let config = ReconstructionConfig {
            classification: Some(classification::BUILDING),
            ..Default::default()
        };
        let result = reconstruct(&flat_roof(), &config).unwrap();
        assert_eq!(result.planes.planes.len(), 1);
        assert_eq!(result.planes.unassigned_count(), 400);
        assert_eq!(result.alpha_shapes.rings.len(), 1);
        assert_eq!(result.lines.rings.len(), 1);
        assert_eq!(result.edge_count(), 4);
        assert_eq!(result.diagnostics().count(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ReconstructionConfig::default();
        config.alpha_shaper.alpha = -1.0;
        assert!(matches!(
            reconstruct(&flat_roof(), &config),
            Err(Error::InvalidInput(_))
        ));
    }
}
