//! Stimulus space and matrix shape conventions.
//!
//! # Matrix conventions
//!
//! Every matrix in the pipeline is a `DMatrix<f64>` with one fixed
//! orientation:
//!
//! ```text
//! tuning matrix        units    × stimuli     (U × S)
//! channel basis        channels × stimuli     (C × S)
//! mixing weights       units    × measurements (U × M)
//! design matrix        trials   × channels    (T × C)
//! observed responses   trials   × measurements (T × M)
//! estimated weights    channels × measurements (C × M)
//! channel estimates    trials   × channels    (T × C)
//! noise covariance     measurements × measurements (M × M)
//! stimulus likelihood  trials   × stimuli     (T × S)
//! ```
//!
//! Boundaries check these shapes and fail with
//! [`IemError::DimensionMismatch`]; nothing is broadcast.

use std::f64::consts::TAU;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{IemError, IemResult};

/// Discretised, periodic stimulus space.
///
/// Labels run `0..size`. Tuning is periodic with period `size`, which is
/// stretched onto one full 2π cycle; for orientation (`size = 180`) this is
/// the usual factor-of-two rescaling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct StimulusSpace {
    size: usize,
}

impl StimulusSpace {
    /// Orientation space in whole degrees (0..179)
    pub const ORIENTATION_DEGREES: usize = 180;

    /// Create a stimulus space with `size` labels.
    ///
    /// # Errors
    /// `InvalidConfiguration` when `size` is zero or odd.
    pub fn new(size: usize) -> IemResult<Self> {
        if size == 0 {
            return Err(IemError::invalid("stimulus_space", "size must be positive"));
        }
        if size % 2 != 0 {
            return Err(IemError::invalid(
                "stimulus_space",
                format!("size {size} must be even for the periodic mapping"),
            ));
        }
        Ok(Self { size })
    }

    /// The 180-label orientation space
    #[must_use]
    pub fn orientation() -> Self {
        Self { size: Self::ORIENTATION_DEGREES }
    }

    /// Number of labels
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Period of the tuning functions, in stimulus units
    #[must_use]
    pub fn period(&self) -> f64 {
        self.size as f64
    }

    /// Iterate over all labels
    pub fn labels(&self) -> impl Iterator<Item = usize> {
        0..self.size
    }

    /// Check that a label belongs to this space
    ///
    /// # Errors
    /// `StimulusOutOfRange` when `label >= size`.
    pub fn check(&self, label: usize) -> IemResult<()> {
        if label < self.size {
            Ok(())
        } else {
            Err(IemError::StimulusOutOfRange { label, size: self.size })
        }
    }

    /// Angle in radians on the full circle for a stimulus-unit distance
    #[must_use]
    pub fn to_radians(&self, distance: f64) -> f64 {
        distance * TAU / self.period()
    }

    /// Stimulus-unit value for an angle on the full circle
    #[must_use]
    pub fn from_radians(&self, angle: f64) -> f64 {
        angle * self.period() / TAU
    }

    /// Signed circular distance `a - b`, wrapped into `(-S/2, S/2]`
    #[must_use]
    pub fn circular_distance(&self, a: f64, b: f64) -> f64 {
        let period = self.period();
        let half = period / 2.0;
        let d = (a - b).rem_euclid(period);
        if d > half {
            d - period
        } else {
            d
        }
    }
}

impl TryFrom<usize> for StimulusSpace {
    type Error = IemError;

    fn try_from(size: usize) -> IemResult<Self> {
        Self::new(size)
    }
}

impl From<StimulusSpace> for usize {
    fn from(space: StimulusSpace) -> usize {
        space.size
    }
}

impl Default for StimulusSpace {
    fn default() -> Self {
        Self::orientation()
    }
}

/// Fail fast unless `matrix` has exactly the `expected` shape
pub(crate) fn ensure_shape(
    operation: &'static str,
    matrix: &DMatrix<f64>,
    expected: (usize, usize),
) -> IemResult<()> {
    if matrix.shape() == expected {
        Ok(())
    } else {
        Err(IemError::mismatch(operation, expected, matrix.shape()))
    }
}

/// Fail fast unless `matrix` has `expected` rows
pub(crate) fn ensure_rows(
    operation: &'static str,
    matrix: &DMatrix<f64>,
    expected: usize,
) -> IemResult<()> {
    ensure_shape(operation, matrix, (expected, matrix.ncols()))
}

/// Fail fast unless `matrix` has `expected` columns
pub(crate) fn ensure_cols(
    operation: &'static str,
    matrix: &DMatrix<f64>,
    expected: usize,
) -> IemResult<()> {
    ensure_shape(operation, matrix, (matrix.nrows(), expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_validation() {
        assert!(StimulusSpace::new(180).is_ok());
        assert!(matches!(
            StimulusSpace::new(0),
            Err(IemError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            StimulusSpace::new(179),
            Err(IemError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_label_check() {
        let space = StimulusSpace::orientation();
        assert!(space.check(179).is_ok());
        assert_eq!(
            space.check(180),
            Err(IemError::StimulusOutOfRange { label: 180, size: 180 })
        );
    }

    #[test]
    fn test_circular_distance_wraps() {
        let space = StimulusSpace::orientation();
        assert_eq!(space.circular_distance(170.0, 10.0), -20.0);
        assert_eq!(space.circular_distance(10.0, 170.0), 20.0);
        assert_eq!(space.circular_distance(90.0, 0.0), 90.0);
        assert_eq!(space.circular_distance(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_factor_two_rescale() {
        let space = StimulusSpace::orientation();
        // 90 degrees of orientation is half the circle
        assert!((space.to_radians(90.0) - std::f64::consts::PI).abs() < 1e-12);
        assert!((space.from_radians(std::f64::consts::PI) - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_serde_rejects_odd_size() {
        let space: StimulusSpace = serde_json::from_str("180").unwrap();
        assert_eq!(space.size(), 180);
        assert!(serde_json::from_str::<StimulusSpace>("181").is_err());
    }

    #[test]
    fn test_shape_checks() {
        let m = DMatrix::<f64>::zeros(3, 4);
        assert!(ensure_shape("op", &m, (3, 4)).is_ok());
        assert!(ensure_rows("op", &m, 2).is_err());
        assert!(ensure_cols("op", &m, 4).is_ok());
    }
}
