// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Skipped-unit records collected alongside stage results.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::PlaneId;

/// Pipeline stage that reported a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    PlaneDetection,
    AlphaShape,
    LineDetection,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PlaneDetection => "plane-detection",
            Stage::AlphaShape => "alpha-shape",
            Stage::LineDetection => "line-detection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    DegenerateGeometry,
    NumericalInstability,
}

/// A plane or ring that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub kind: DiagnosticKind,
    pub plane_id: PlaneId,
    /// Index of the ring within the alpha shaper output, for ring-level units.
    pub ring_index: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    /// Diagnostic for a recoverable error, `None` for fatal ones.
    pub fn from_error(
        stage: Stage,
        plane_id: PlaneId,
        ring_index: Option<usize>,
        error: &Error,
    ) -> Option<Self> {
        let (kind, message) = match error {
            Error::DegenerateGeometry(msg) => (DiagnosticKind::DegenerateGeometry, msg.clone()),
            Error::NumericalInstability(msg) => (DiagnosticKind::NumericalInstability, msg.clone()),
            Error::InvalidInput(_) => return None,
        };
        Some(Self {
            stage,
            kind,
            plane_id,
            ring_index,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error() {
        let err = Error::DegenerateGeometry("plane has 2 points".into());
        let diag = Diagnostic::from_error(Stage::AlphaShape, 3, None, &err).unwrap();
        assert_eq!(diag.kind, DiagnosticKind::DegenerateGeometry);
        assert_eq!(diag.plane_id, 3);
        assert_eq!(diag.message, "plane has 2 points");

        let fatal = Error::InvalidInput("empty".into());
        assert!(Diagnostic::from_error(Stage::AlphaShape, 3, None, &fatal).is_none());
    }
}
