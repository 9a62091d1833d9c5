// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver configuration loaded from environment variables.

use roofer_core::classification;
use roofer_detection::ReconstructionConfig;

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Alpha-shape circumradius threshold.
    pub alpha: f64,
    /// Plane inlier distance threshold.
    pub plane_epsilon: f64,
    /// Minimum points per plane.
    pub plane_min_points: usize,
    /// Line regularization distance threshold.
    pub line_epsilon: f64,
    /// Merge and snap angle in radians.
    pub angle_tolerance: f64,
    /// Seed for plane sampling and the synthetic cloud.
    pub seed: u64,
    /// Number of worker threads for parallel processing.
    pub worker_threads: usize,
    /// Log per-plane and per-ring progress.
    pub verbose: bool,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = ReconstructionConfig::default();
        Self {
            alpha: env_or("ROOFER_ALPHA", defaults.alpha_shaper.alpha),
            plane_epsilon: env_or(
                "ROOFER_PLANE_EPSILON",
                defaults.plane_detector.distance_tolerance,
            ),
            plane_min_points: env_or("ROOFER_PLANE_MIN_POINTS", defaults.plane_detector.min_inliers),
            line_epsilon: env_or(
                "ROOFER_LINE_EPSILON",
                defaults.line_detector.distance_tolerance,
            ),
            angle_tolerance: env_or(
                "ROOFER_ANGLE_TOLERANCE",
                defaults.line_detector.angle_tolerance,
            ),
            seed: env_or("ROOFER_SEED", defaults.plane_detector.seed),
            worker_threads: env_or("ROOFER_THREADS", num_cpus::get()),
            verbose: std::env::var("ROOFER_VERBOSE")
                .map(|v| !matches!(v.trim(), "" | "0" | "false"))
                .unwrap_or(false),
        }
    }

    /// Stage configuration keeping only building points.
    pub fn reconstruction(&self) -> ReconstructionConfig {
        let mut config = ReconstructionConfig {
            classification: Some(classification::BUILDING),
            ..Default::default()
        };
        config.plane_detector = config
            .plane_detector
            .with_distance_tolerance(self.plane_epsilon)
            .with_min_inliers(self.plane_min_points)
            .with_seed(self.seed);
        config.alpha_shaper = config.alpha_shaper.with_alpha(self.alpha);
        config.line_detector = config
            .line_detector
            .with_distance_tolerance(self.line_epsilon)
            .with_angle_tolerance(self.angle_tolerance);
        config
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "info,roofer_detection=debug"
        } else {
            "warn"
        }
    }
}
