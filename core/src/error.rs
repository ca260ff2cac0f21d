//! Error types for the localization filter.
//!
//! Numeric edge cases (a near-zero yaw rate, an observation with no landmark in range) are
//! handled by branching inside the filter and never surface here. The variants below are
//! contract violations: bad configuration, operations called out of cadence, or map
//! references that do not resolve.

use crate::map::LandmarkId;

/// Errors raised by the particle filter and its collaborators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    /// An observation was matched to a landmark id the map does not contain.
    #[error("invalid landmark reference: no landmark with id {id}")]
    InvalidLandmarkReference {
        /// The unresolved landmark id.
        id: LandmarkId,
    },

    /// Resampling was requested without a complete weight pass since the last resample.
    #[error("unweighted particle set: expected {expected} weights, found {found}")]
    UnweightedParticleSet {
        /// Number of particles in the set.
        expected: usize,
        /// Number of weights in the accumulator.
        found: usize,
    },

    /// An operation other than `initialize` was called on a fresh filter.
    #[error("particle filter has not been initialized")]
    NotInitialized,

    /// `initialize` was called on a filter that already holds particles.
    #[error("particle filter is already initialized")]
    AlreadyInitialized,

    /// A configuration value is out of its valid domain.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Diagnostic association lists must be index aligned.
    #[error(
        "misaligned associations: {associations} ids, {sense_x} x-coordinates, {sense_y} y-coordinates"
    )]
    MisalignedAssociations {
        associations: usize,
        sense_x: usize,
        sense_y: usize,
    },

    /// Two landmarks in one map share an id.
    #[error("duplicate landmark id {id}")]
    DuplicateLandmark { id: LandmarkId },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Fail with [`FilterError::InvalidConfiguration`] unless every entry of `std` is finite and
/// non-negative.
pub(crate) fn check_non_negative_std(name: &str, std: &[f64]) -> Result<()> {
    match std.iter().find(|s| !s.is_finite() || **s < 0.0) {
        Some(bad) => Err(FilterError::InvalidConfiguration(format!(
            "{name} standard deviations must be finite and non-negative, got {bad}"
        ))),
        None => Ok(()),
    }
}

/// Fail with [`FilterError::InvalidConfiguration`] unless every entry of `std` is finite and
/// strictly positive.
pub(crate) fn check_positive_std(name: &str, std: &[f64]) -> Result<()> {
    match std.iter().find(|s| !s.is_finite() || **s <= 0.0) {
        Some(bad) => Err(FilterError::InvalidConfiguration(format!(
            "{name} standard deviations must be finite and positive, got {bad}"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = FilterError::InvalidLandmarkReference { id: 7 };
        assert_eq!(
            err.to_string(),
            "invalid landmark reference: no landmark with id 7"
        );
        let err = FilterError::UnweightedParticleSet {
            expected: 10,
            found: 0,
        };
        assert!(err.to_string().contains("expected 10 weights"));
    }

    #[test]
    fn test_std_checks() {
        assert!(check_non_negative_std("position", &[0.0, 0.3, 0.01]).is_ok());
        assert!(check_non_negative_std("position", &[0.3, -0.1, 0.01]).is_err());
        assert!(check_non_negative_std("position", &[f64::NAN]).is_err());
        assert!(check_positive_std("landmark", &[0.3, 0.3]).is_ok());
        assert!(matches!(
            check_positive_std("landmark", &[0.3, 0.0]),
            Err(FilterError::InvalidConfiguration(_))
        ));
    }
}
