// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Roofer Core
//!
//! Shared data model for roof reconstruction from classified point clouds.
//!
//! The detection stages exchange the types defined here: the input
//! [`PointCloud`], the fitted [`Plane`] and [`RoofPlane`] registry, boundary
//! [`Ring`]s with their [`RingLabel`]s, and the regularized
//! [`EdgeSegment`]s. Recoverable per-unit failures travel as
//! [`Diagnostic`]s next to the successful results.

pub mod diagnostics;
pub mod error;
pub mod fit;
pub mod frame;
pub mod spatial;
pub mod types;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point2, Point3, Vector2, Vector3};

pub use diagnostics::{Diagnostic, DiagnosticKind, Stage};
pub use error::{Error, Result};
pub use fit::{fit_plane, principal_direction_2d, rms_distance};
pub use frame::PlaneFrame;
pub use spatial::GridIndex;
pub use types::{
    classification, EdgeSegment, Plane, PlaneId, PointCloud, RingEdges, RingKind, RingLabel,
    RoofPlane, Ring, NO_PLANE,
};
