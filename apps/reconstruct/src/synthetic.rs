// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic classified point cloud of a gable-roofed building.

use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roofer_core::{classification, PointCloud, Result};

/// Building outline and sampling density.
#[derive(Debug, Clone)]
pub struct GableBuilding {
    pub length: f64,
    pub width: f64,
    pub eave_height: f64,
    pub ridge_height: f64,
    /// Points per square metre of footprint.
    pub density: f64,
    /// Half-range of the uniform height noise.
    pub noise: f64,
    /// Margin of ground points around the footprint.
    pub ground_margin: f64,
}

impl Default for GableBuilding {
    fn default() -> Self {
        Self {
            length: 12.0,
            width: 8.0,
            eave_height: 3.0,
            ridge_height: 5.0,
            density: 10.0,
            noise: 0.03,
            ground_margin: 4.0,
        }
    }
}

impl GableBuilding {
    /// Roof height above `(x, y)`, ridge along the x axis.
    fn roof_height(&self, y: f64) -> f64 {
        let half = self.width / 2.0;
        let rise = self.ridge_height - self.eave_height;
        self.eave_height + rise * (1.0 - (y - half).abs() / half)
    }

    /// Building points (class 6) followed by ground points (class 2).
    pub fn generate(&self, seed: u64) -> Result<PointCloud> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut points = Vec::new();
        let mut classes = Vec::new();

        let roof_count = (self.length * self.width * self.density).round() as usize;
        for _ in 0..roof_count {
            let x = rng.random_range(0.0..self.length);
            let y = rng.random_range(0.0..self.width);
            let z = self.roof_height(y) + rng.random_range(-self.noise..=self.noise);
            points.push(Point3::new(x, y, z));
            classes.push(classification::BUILDING);
        }

        let m = self.ground_margin;
        let outer = (self.length + 2.0 * m) * (self.width + 2.0 * m);
        let ground_count = ((outer - self.length * self.width) * self.density * 0.5).round() as usize;
        while points.len() < roof_count + ground_count {
            let x = rng.random_range(-m..self.length + m);
            let y = rng.random_range(-m..self.width + m);
            if (0.0..=self.length).contains(&x) && (0.0..=self.width).contains(&y) {
                continue;
            }
            let z = rng.random_range(-self.noise..=self.noise);
            points.push(Point3::new(x, y, z));
            classes.push(classification::GROUND);
        }

        PointCloud::new(points, classes)
    }
}
