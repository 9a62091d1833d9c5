// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for roof reconstruction.

/// Result type alias for reconstruction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reconstructing roof geometry.
///
/// Only [`Error::InvalidInput`] aborts a run. The other variants describe a
/// single plane or ring that could not produce output; the stages record them
/// as diagnostics and carry on with the remaining units.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Empty or malformed input, or an unusable configuration.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A plane or ring has too few points/vertices to produce geometry.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Fitting or triangulation produced non-finite values.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),
}

impl Error {
    /// Whether the failure only concerns a single unit of work.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_split() {
        assert!(!Error::InvalidInput("empty".into()).is_recoverable());
        assert!(Error::DegenerateGeometry("2 points".into()).is_recoverable());
        assert!(Error::NumericalInstability("nan".into()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = Error::InvalidInput("point cloud is empty".into());
        assert_eq!(err.to_string(), "invalid input: point cloud is empty");
    }
}
