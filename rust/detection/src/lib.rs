// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Roof reconstruction from classified point clouds
//!
//! This crate provides the three detection stages:
//! 1. Plane detection: RANSAC segmentation of roof points into planes
//! 2. Alpha shapes: boundary rings of every plane's points
//! 3. Line detection: regularization of the rings into straight edges
//!
//! # Usage
//!
//! ```rust,ignore
//! use roofer_detection::{reconstruct, ReconstructionConfig};
//! use roofer_core::classification;
//!
//! let config = ReconstructionConfig {
//!     classification: Some(classification::BUILDING),
//!     ..Default::default()
//! };
//! let result = reconstruct(&cloud, &config)?;
//! for ring in &result.lines.rings {
//!     println!("plane {}: {} edges", ring.plane_id, ring.edges.len());
//! }
//! for diagnostic in result.diagnostics() {
//!     eprintln!("{}: {}", diagnostic.stage.as_str(), diagnostic.message);
//! }
//! ```
//!
//! The stages can also be run on their own; each one takes the previous
//! stage's output and never mutates it.

pub mod alpha_shaper;
pub mod config;
pub mod line_detector;
pub mod normals;
pub mod pipeline;
pub mod plane_detector;
pub mod predicates;

// Re-export commonly used types and functions
pub use alpha_shaper::{AlphaShaper, AlphaShapes};
pub use config::{
    AlphaShaperConfig, DominantDirections, LineDetectorConfig, PlaneDetectorConfig,
    ReconstructionConfig,
};
pub use line_detector::{turning_angles, LineDetection, LineDetector};
pub use pipeline::{reconstruct, Reconstruction};
pub use plane_detector::{PlaneDetection, PlaneDetector, RoofType};
