//! Encoding Model Fitter
//!
//! Estimates `W` (`C × M`) minimising `‖X·W − Y‖²` for a design matrix `X`
//! (`T × C`) and observed responses `Y` (`T × M`): `W = pinv(X) · Y`.
//!
//! A near-singular design still produces a fit. The pseudo-inverse is
//! defined for any rank, so the fit is returned with
//! [`SvdDiagnostics::low_confidence`] set and a warning is logged.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{IemError, IemResult};
use crate::linalg::{pseudo_inverse, SvdDiagnostics};
use crate::simulation::StimulusSequence;
use crate::tuning::ChannelBasis;
use crate::types::{ensure_cols, ensure_rows};

/// Fitter configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Singular values at or below this fraction of the largest are zeroed
    pub relative_tolerance: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self { relative_tolerance: 1e-10 }
    }
}

/// Fitted forward model: channel responses → measurement responses
#[derive(Clone, Debug)]
pub struct EncodingModel {
    weights: DMatrix<f64>,
    diagnostics: SvdDiagnostics,
}

impl EncodingModel {
    /// Least-squares fit of `responses` on `design`.
    ///
    /// # Errors
    /// - `DimensionMismatch` when the trial counts differ
    /// - `InvalidConfiguration` when there are fewer trials than channels
    /// - `NumericalInstability` for non-finite input
    pub fn fit(design: &DMatrix<f64>, responses: &DMatrix<f64>, config: &FitConfig) -> IemResult<Self> {
        ensure_rows("fit responses", responses, design.nrows())?;
        let (trials, channels) = design.shape();
        if channels == 0 || responses.ncols() == 0 {
            return Err(IemError::invalid("design", "no channels or no measurements"));
        }
        if trials < channels {
            return Err(IemError::invalid(
                "design",
                format!("{trials} trials cannot determine {channels} channel weights"),
            ));
        }

        let pinv = pseudo_inverse(design, config.relative_tolerance)?;
        let weights = &pinv.matrix * responses;

        if pinv.diagnostics.low_confidence {
            tracing::warn!(
                rank = pinv.diagnostics.rank,
                channels,
                condition_number = pinv.diagnostics.condition_number,
                "design matrix is rank deficient; encoding weights are low confidence"
            );
        } else {
            tracing::debug!(
                trials,
                channels,
                condition_number = pinv.diagnostics.condition_number,
                "fitted encoding model"
            );
        }

        Ok(Self { weights, diagnostics: pinv.diagnostics })
    }

    /// Fit against a channel basis sampled at each trial's stimulus
    ///
    /// # Errors
    /// As [`EncodingModel::fit`], plus `StimulusOutOfRange`.
    pub fn fit_basis(
        basis: &ChannelBasis,
        stimuli: &StimulusSequence,
        responses: &DMatrix<f64>,
        config: &FitConfig,
    ) -> IemResult<Self> {
        let design = basis.design_matrix(stimuli.labels())?;
        Self::fit(&design, responses, config)
    }

    /// Estimated weights, `C × M`
    #[must_use]
    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }

    /// Number of channels
    #[must_use]
    pub fn channels(&self) -> usize {
        self.weights.nrows()
    }

    /// Number of measurement channels
    #[must_use]
    pub fn measurements(&self) -> usize {
        self.weights.ncols()
    }

    /// Conditioning of the design matrix used for the fit
    #[must_use]
    pub fn diagnostics(&self) -> &SvdDiagnostics {
        &self.diagnostics
    }

    /// True when the design was rank deficient at the configured tolerance
    #[must_use]
    pub fn is_low_confidence(&self) -> bool {
        self.diagnostics.low_confidence
    }

    /// Predicted responses `X · W` for a design matrix (`T × C` → `T × M`)
    ///
    /// # Errors
    /// `DimensionMismatch` when the design has the wrong channel count.
    pub fn predict(&self, design: &DMatrix<f64>) -> IemResult<DMatrix<f64>> {
        ensure_cols("predict", design, self.channels())?;
        Ok(design * &self.weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_recovers_exact_weights() {
        let design = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0]);
        let truth = DMatrix::from_row_slice(2, 3, &[0.5, 1.0, -1.0, 2.0, 0.0, 3.0]);
        let responses = &design * &truth;

        let model = EncodingModel::fit(&design, &responses, &FitConfig::default()).unwrap();
        assert_relative_eq!(model.weights(), &truth, epsilon = 1e-10);
        assert!(!model.is_low_confidence());
        assert_eq!(model.diagnostics().rank, 2);

        let predicted = model.predict(&design).unwrap();
        assert_relative_eq!(predicted, responses, epsilon = 1e-10);
    }

    #[test]
    fn test_least_squares_residual_orthogonal() {
        let design = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let responses = DMatrix::from_row_slice(4, 1, &[1.0, 3.0, 2.0, 5.0]);
        let model = EncodingModel::fit(&design, &responses, &FitConfig::default()).unwrap();
        let residual = &responses - model.predict(&design).unwrap();
        let normal = design.transpose() * residual;
        assert_relative_eq!(normal, DMatrix::zeros(2, 1), epsilon = 1e-10);
    }

    #[test]
    fn test_rank_deficient_design_flagged() {
        let design = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        let responses = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let model = EncodingModel::fit(&design, &responses, &FitConfig::default()).unwrap();
        assert!(model.is_low_confidence());
        assert_eq!(model.diagnostics().rank, 1);
        assert!(model.diagnostics().condition_number > 1e10);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let design = DMatrix::<f64>::zeros(2, 3);
        let responses = DMatrix::<f64>::zeros(2, 5);
        assert!(matches!(
            EncodingModel::fit(&design, &responses, &FitConfig::default()),
            Err(IemError::InvalidConfiguration { .. })
        ));

        let design = DMatrix::<f64>::identity(3, 3);
        let responses = DMatrix::<f64>::zeros(4, 5);
        assert!(matches!(
            EncodingModel::fit(&design, &responses, &FitConfig::default()),
            Err(IemError::DimensionMismatch { .. })
        ));

        let model =
            EncodingModel::fit(&design, &DMatrix::zeros(3, 5), &FitConfig::default()).unwrap();
        assert!(model.predict(&DMatrix::zeros(3, 2)).is_err());
    }
}
