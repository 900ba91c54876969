//! Residual noise model for the Bayesian decoder.
//!
//! The baseline is isotropic: one pooled residual variance on the diagonal.
//! Real voxel noise is correlated, so a full covariance is accepted as well;
//! any symmetric positive-definite matrix works through the same Cholesky
//! path.

use std::f64::consts::TAU;

use nalgebra::{Cholesky, DMatrix};

use crate::error::{IemError, IemResult};
use crate::types::ensure_shape;

/// Zero-mean multivariate Gaussian over measurement channels (`M × M`)
#[derive(Clone, Debug)]
pub struct NoiseModel {
    covariance: DMatrix<f64>,
    cholesky_lower: DMatrix<f64>,
    log_determinant: f64,
}

impl NoiseModel {
    /// `variance · I` over `measurements` channels
    ///
    /// # Errors
    /// `InvalidConfiguration` for a non-positive variance or zero channels.
    pub fn isotropic(variance: f64, measurements: usize) -> IemResult<Self> {
        if measurements == 0 {
            return Err(IemError::invalid("measurements", "must be positive"));
        }
        if !(variance.is_finite() && variance > 0.0) {
            return Err(IemError::invalid(
                "noise_variance",
                format!("{variance} must be finite and positive"),
            ));
        }
        Self::from_covariance(DMatrix::from_diagonal_element(measurements, measurements, variance))
    }

    /// Isotropic model from held-out residuals: the population variance of
    /// every element of `observed − predicted`, pooled.
    ///
    /// # Errors
    /// `DimensionMismatch` for unequal shapes; `InvalidConfiguration` when the
    /// residuals are empty or have zero variance.
    pub fn from_residuals(observed: &DMatrix<f64>, predicted: &DMatrix<f64>) -> IemResult<Self> {
        let variance = Self::residual_variance(observed, predicted)?;
        Self::isotropic(variance, observed.ncols())
    }

    /// Pooled population variance of `observed − predicted`
    ///
    /// # Errors
    /// `DimensionMismatch` for unequal shapes.
    pub fn residual_variance(observed: &DMatrix<f64>, predicted: &DMatrix<f64>) -> IemResult<f64> {
        ensure_shape("noise residuals", predicted, observed.shape())?;
        let residual = observed - predicted;
        let variance = residual.variance();
        tracing::debug!(variance, "estimated pooled residual variance");
        Ok(variance)
    }

    /// General covariance.
    ///
    /// # Errors
    /// `DimensionMismatch` for a non-square matrix, `InvalidConfiguration`
    /// for an asymmetric or empty one, `NumericalInstability` when it is not
    /// positive definite.
    pub fn from_covariance(covariance: DMatrix<f64>) -> IemResult<Self> {
        let n = covariance.nrows();
        ensure_shape("noise covariance", &covariance, (n, n))?;
        if n == 0 {
            return Err(IemError::invalid("covariance", "matrix is empty"));
        }
        let scale = covariance.amax().max(f64::MIN_POSITIVE);
        if (&covariance - covariance.transpose()).amax() > 1e-12 * scale {
            return Err(IemError::invalid("covariance", "matrix is not symmetric"));
        }

        let cholesky = Cholesky::new(covariance.clone()).ok_or_else(|| {
            IemError::NumericalInstability {
                operation: "noise covariance",
                reason: "matrix is not positive definite".to_string(),
            }
        })?;
        let cholesky_lower = cholesky.l();
        let log_determinant = 2.0 * cholesky_lower.diagonal().iter().map(|d| d.ln()).sum::<f64>();

        Ok(Self { covariance, cholesky_lower, log_determinant })
    }

    /// Covariance, `M × M`
    #[must_use]
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// Number of measurement channels
    #[must_use]
    pub fn measurements(&self) -> usize {
        self.covariance.nrows()
    }

    /// Mean of the diagonal (the scalar variance for isotropic models)
    #[must_use]
    pub fn mean_variance(&self) -> f64 {
        self.covariance.diagonal().mean()
    }

    /// `ln det Σ`
    #[must_use]
    pub fn log_determinant(&self) -> f64 {
        self.log_determinant
    }

    /// `L⁻¹ · columns` where `Σ = L Lᵀ`.
    ///
    /// Squared norms of whitened differences are Mahalanobis distances.
    ///
    /// # Errors
    /// `DimensionMismatch` unless `columns` has `M` rows.
    pub fn whiten(&self, columns: &DMatrix<f64>) -> IemResult<DMatrix<f64>> {
        ensure_shape("whiten", columns, (self.measurements(), columns.ncols()))?;
        self.cholesky_lower
            .solve_lower_triangular(columns)
            .ok_or_else(|| IemError::NumericalInstability {
                operation: "whiten",
                reason: "Cholesky factor has a zero pivot".to_string(),
            })
    }

    /// Log normalising constant `−½ (M ln 2π + ln det Σ)`
    #[must_use]
    pub fn log_normaliser(&self) -> f64 {
        -0.5 * (self.measurements() as f64 * TAU.ln() + self.log_determinant)
    }

    /// Log density of `x` under `N(mean, Σ)`
    ///
    /// # Errors
    /// `DimensionMismatch` unless both slices have `M` entries.
    pub fn log_density(&self, x: &[f64], mean: &[f64]) -> IemResult<f64> {
        let m = self.measurements();
        if x.len() != m || mean.len() != m {
            return Err(IemError::mismatch("log_density", (m, 1), (x.len().max(mean.len()), 1)));
        }
        let diff = DMatrix::from_iterator(m, 1, x.iter().zip(mean).map(|(a, b)| a - b));
        let z = self.whiten(&diff)?;
        Ok(self.log_normaliser() - 0.5 * z.norm_squared())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_isotropic_univariate_density() {
        let noise = NoiseModel::isotropic(4.0, 1).unwrap();
        // N(0, 4) at x = 2: exp(-0.5) / sqrt(2π·4)
        let expected = (-0.5f64).exp() / (TAU * 4.0).sqrt();
        assert_relative_eq!(
            noise.log_density(&[2.0], &[0.0]).unwrap().exp(),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_general_covariance_matches_closed_form() {
        let cov = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let noise = NoiseModel::from_covariance(cov.clone()).unwrap();
        let det: f64 = 2.0 * 1.0 - 0.25;
        assert_relative_eq!(noise.log_determinant(), det.ln(), epsilon = 1e-12);

        let x = [1.0, -1.0];
        let inv = cov.try_inverse().unwrap();
        let v = DMatrix::from_row_slice(2, 1, &x);
        let quad = (v.transpose() * inv * &v)[(0, 0)];
        let expected = -0.5 * (2.0 * TAU.ln() + det.ln() + quad);
        assert_relative_eq!(noise.log_density(&x, &[0.0, 0.0]).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_from_residuals_pools_variance() {
        let observed = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let predicted = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 3.0, 3.0]);
        // residual elements 0, 1, 0, 1 → variance 0.25
        let noise = NoiseModel::from_residuals(&observed, &predicted).unwrap();
        assert_relative_eq!(noise.mean_variance(), 0.25, epsilon = 1e-12);
        assert_eq!(noise.measurements(), 2);
        assert_eq!(noise.covariance()[(0, 1)], 0.0);
    }

    #[test]
    fn test_rejects_invalid_covariances() {
        assert!(NoiseModel::isotropic(0.0, 3).is_err());
        assert!(NoiseModel::isotropic(1.0, 0).is_err());
        assert!(matches!(
            NoiseModel::from_covariance(DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0])),
            Err(IemError::NumericalInstability { .. })
        ));
        assert!(matches!(
            NoiseModel::from_covariance(DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0])),
            Err(IemError::InvalidConfiguration { .. })
        ));
        assert!(NoiseModel::from_covariance(DMatrix::zeros(2, 3)).is_err());

        let same = DMatrix::from_element(2, 2, 1.0);
        assert!(NoiseModel::from_residuals(&same, &same).is_err());
    }
}
