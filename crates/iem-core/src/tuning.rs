//! Tuning-Function Generator
//!
//! Builds population tuning curves over a periodic stimulus space.
//!
//! # Curve Families
//!
//! - **Von Mises**: `exp(k·(cos θ − 1))`, circular Gaussian with
//!   concentration `k`; used for the simulated "true" neurons
//! - **Rectified cosine**: `max(cos θ, 0)^n`; the idealised channel basis
//!   an experimenter picks for the encoding model
//!
//! `θ` is the stimulus distance stretched onto one full cycle (see
//! [`StimulusSpace::to_radians`]). Both families peak at 1 at zero distance.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{IemError, IemResult};
use crate::types::StimulusSpace;

/// Periodic, unimodal tuning curve family
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum TuningCurve {
    /// Circular Gaussian with concentration `k`
    VonMises {
        /// Concentration (≥ 0; larger is narrower)
        concentration: f64,
    },
    /// Half-wave rectified cosine raised to a power
    RectifiedCosine {
        /// Exponent (> 0; larger is narrower)
        exponent: f64,
    },
}

impl TuningCurve {
    /// Von Mises curve
    #[must_use]
    pub fn von_mises(concentration: f64) -> Self {
        Self::VonMises { concentration }
    }

    /// Rectified cosine curve
    #[must_use]
    pub fn rectified_cosine(exponent: f64) -> Self {
        Self::RectifiedCosine { exponent }
    }

    /// Check the curve parameters
    ///
    /// # Errors
    /// `InvalidConfiguration` for a negative or non-finite concentration,
    /// or a non-positive or non-finite exponent.
    pub fn validate(&self) -> IemResult<()> {
        match *self {
            Self::VonMises { concentration } => {
                if !concentration.is_finite() || concentration < 0.0 {
                    return Err(IemError::invalid(
                        "concentration",
                        format!("{concentration} must be finite and non-negative"),
                    ));
                }
            }
            Self::RectifiedCosine { exponent } => {
                if !exponent.is_finite() || exponent <= 0.0 {
                    return Err(IemError::invalid(
                        "exponent",
                        format!("{exponent} must be finite and positive"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Evaluate at an angular distance (radians on the full circle)
    #[must_use]
    pub fn evaluate_angle(&self, theta: f64) -> f64 {
        match *self {
            Self::VonMises { concentration } => (concentration * (theta.cos() - 1.0)).exp(),
            // Clip before the power so fractional exponents never see a negative base
            Self::RectifiedCosine { exponent } => theta.cos().max(0.0).powf(exponent),
        }
    }

    /// Response of a unit preferring `preferred` to `stimulus`
    #[must_use]
    pub fn response(&self, stimulus: f64, preferred: f64, space: &StimulusSpace) -> f64 {
        self.evaluate_angle(space.to_radians(stimulus - preferred))
    }
}

/// Preferred labels spaced evenly around the stimulus space.
///
/// Label `i` is `round(i · S / count)`; 8 channels over 180 degrees gives
/// 0, 23, 45, 68, 90, 113, 135, 158.
///
/// # Errors
/// `InvalidConfiguration` when `count` is zero.
pub fn evenly_spaced_preferences(count: usize, space: &StimulusSpace) -> IemResult<Vec<f64>> {
    if count == 0 {
        return Err(IemError::invalid("count", "at least one preferred value is required"));
    }
    let step = space.period() / count as f64;
    Ok((0..count)
        .map(|i| (i as f64 * step).round().rem_euclid(space.period()))
        .collect())
}

/// Build a `rows × S` matrix of peak-normalised tuning curves
fn build_rows(
    space: &StimulusSpace,
    curve: TuningCurve,
    preferred: &[f64],
    parameter: &'static str,
) -> IemResult<DMatrix<f64>> {
    curve.validate()?;
    if preferred.is_empty() {
        return Err(IemError::invalid(parameter, "at least one row is required"));
    }
    if let Some(bad) = preferred
        .iter()
        .find(|p| !p.is_finite() || **p < 0.0 || **p >= space.period())
    {
        return Err(IemError::invalid(
            parameter,
            format!("preferred value {bad} outside [0, {})", space.size()),
        ));
    }

    let mut rows = DMatrix::from_fn(preferred.len(), space.size(), |i, s| {
        curve.response(s as f64, preferred[i], space)
    });

    for (i, mut row) in rows.row_iter_mut().enumerate() {
        let peak = row.max();
        if !(peak.is_finite() && peak > 0.0) {
            return Err(IemError::NumericalInstability {
                operation: "tuning rows",
                reason: format!(
                    "curve preferring {} has no positive response on any label (peak {peak})",
                    preferred[i]
                ),
            });
        }
        row /= peak;
    }

    Ok(rows)
}

/// Anything that supplies one peak-normalised curve per row over the
/// stimulus space. The response simulator projects these rows.
pub trait PopulationTuning {
    /// Curves, `rows × S`
    fn curves(&self) -> &DMatrix<f64>;

    /// Stimulus space the curves are defined on
    fn stimulus_space(&self) -> StimulusSpace;
}

/// Simulated "true" tuning functions of a unit population (`U × S`)
#[derive(Clone, Debug, PartialEq)]
pub struct TuningMatrix {
    space: StimulusSpace,
    curve: TuningCurve,
    preferred: Vec<f64>,
    matrix: DMatrix<f64>,
}

impl TuningMatrix {
    /// Build one row per preferred value.
    ///
    /// # Errors
    /// `InvalidConfiguration` for bad curve parameters, an empty population,
    /// or preferred values outside the stimulus space. `NumericalInstability`
    /// when a curve is so narrow that it underflows to zero on every label.
    pub fn build(space: StimulusSpace, curve: TuningCurve, preferred: &[f64]) -> IemResult<Self> {
        let matrix = build_rows(&space, curve, preferred, "units")?;
        Ok(Self { space, curve, preferred: preferred.to_vec(), matrix })
    }

    /// `units` units with evenly spaced preferences
    ///
    /// # Errors
    /// As [`TuningMatrix::build`].
    pub fn evenly_spaced(space: StimulusSpace, curve: TuningCurve, units: usize) -> IemResult<Self> {
        let preferred = evenly_spaced_preferences(units, &space)?;
        Self::build(space, curve, &preferred)
    }

    /// Tuning values, `U × S`
    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Number of units
    #[must_use]
    pub fn units(&self) -> usize {
        self.matrix.nrows()
    }

    /// Preferred value per unit
    #[must_use]
    pub fn preferred(&self) -> &[f64] {
        &self.preferred
    }

    /// Curve family
    #[must_use]
    pub fn curve(&self) -> TuningCurve {
        self.curve
    }

    /// Stimulus space
    #[must_use]
    pub fn space(&self) -> StimulusSpace {
        self.space
    }
}

/// Experimenter-chosen channel basis (`C × S`)
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelBasis {
    space: StimulusSpace,
    preferred: Vec<f64>,
    matrix: DMatrix<f64>,
}

impl ChannelBasis {
    /// Build one channel per preferred value.
    ///
    /// # Errors
    /// As [`TuningMatrix::build`].
    pub fn build(space: StimulusSpace, curve: TuningCurve, preferred: &[f64]) -> IemResult<Self> {
        let matrix = build_rows(&space, curve, preferred, "channels")?;
        Ok(Self { space, preferred: preferred.to_vec(), matrix })
    }

    /// `channels` rectified-cosine channels raised to `exponent`, evenly spaced
    ///
    /// # Errors
    /// As [`TuningMatrix::build`].
    pub fn rectified_cosine(space: StimulusSpace, channels: usize, exponent: f64) -> IemResult<Self> {
        let preferred = evenly_spaced_preferences(channels, &space)?;
        Self::build(space, TuningCurve::rectified_cosine(exponent), &preferred)
    }

    /// Basis values, `C × S`
    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Number of channels
    #[must_use]
    pub fn channels(&self) -> usize {
        self.matrix.nrows()
    }

    /// Preferred value per channel
    #[must_use]
    pub fn preferred(&self) -> &[f64] {
        &self.preferred
    }

    /// Stimulus space
    #[must_use]
    pub fn space(&self) -> StimulusSpace {
        self.space
    }

    /// Channel responses to one stimulus (column `label`)
    ///
    /// # Errors
    /// `StimulusOutOfRange` for labels outside the space.
    pub fn column(&self, label: usize) -> IemResult<Vec<f64>> {
        self.space.check(label)?;
        Ok(self.matrix.column(label).iter().copied().collect())
    }

    /// Design matrix for a stimulus sequence: row `t` is the basis column
    /// of trial `t`'s stimulus (`T × C`).
    ///
    /// # Errors
    /// `StimulusOutOfRange` for labels outside the space.
    pub fn design_matrix(&self, stimuli: &[usize]) -> IemResult<DMatrix<f64>> {
        for &label in stimuli {
            self.space.check(label)?;
        }
        Ok(DMatrix::from_fn(stimuli.len(), self.channels(), |t, c| self.matrix[(c, stimuli[t])]))
    }

    /// Reparameterise the basis as `T · B`.
    ///
    /// Rows of the result are no longer peak-normalised; the preferred
    /// values are kept as labels for the original channels. The transform
    /// must be invertible for the fitted model to stay equivalent.
    ///
    /// # Errors
    /// `DimensionMismatch` unless `transform` is `C × C`.
    pub fn transformed(&self, transform: &DMatrix<f64>) -> IemResult<Self> {
        let c = self.channels();
        if transform.shape() != (c, c) {
            return Err(IemError::mismatch("basis transform", (c, c), transform.shape()));
        }
        Ok(Self {
            space: self.space,
            preferred: self.preferred.clone(),
            matrix: transform * &self.matrix,
        })
    }
}

impl PopulationTuning for TuningMatrix {
    fn curves(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    fn stimulus_space(&self) -> StimulusSpace {
        self.space
    }
}

impl PopulationTuning for ChannelBasis {
    fn curves(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    fn stimulus_space(&self) -> StimulusSpace {
        self.space
    }
}

/// Circulant `n × n` matrix whose row `i` is `kernel` rotated right by `i`.
///
/// Used to mix each channel with its neighbours, e.g.
/// `cyclic_reweighting(8, &[1.0, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5])`.
///
/// # Errors
/// `InvalidConfiguration` when `n` is zero or `kernel.len() != n`.
pub fn cyclic_reweighting(n: usize, kernel: &[f64]) -> IemResult<DMatrix<f64>> {
    if n == 0 || kernel.len() != n {
        return Err(IemError::invalid(
            "kernel",
            format!("expected {n} weights, got {}", kernel.len()),
        ));
    }
    Ok(DMatrix::from_fn(n, n, |i, j| kernel[(j + n - i) % n]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn space() -> StimulusSpace {
        StimulusSpace::orientation()
    }

    #[test]
    fn test_rows_normalised_and_non_negative() {
        let curves = [
            TuningCurve::von_mises(4.0),
            TuningCurve::von_mises(0.0),
            TuningCurve::rectified_cosine(7.0),
            TuningCurve::rectified_cosine(2.5),
        ];
        for curve in curves {
            let tuning = TuningMatrix::evenly_spaced(space(), curve, 12).unwrap();
            for row in tuning.matrix().row_iter() {
                assert_relative_eq!(row.max(), 1.0, epsilon = 1e-12);
                assert!(row.iter().all(|&v| v >= 0.0));
            }
        }
    }

    #[test]
    fn test_periodicity() {
        let s = space();
        let period = s.period();
        for curve in [TuningCurve::von_mises(2.0), TuningCurve::rectified_cosine(5.0)] {
            for (stim, pref) in [(10.0, 45.0), (170.0, 3.0), (90.0, 90.0)] {
                assert_relative_eq!(
                    curve.response(stim, pref, &s),
                    curve.response(stim + period, pref + period, &s),
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn test_peak_at_preferred() {
        let tuning = TuningMatrix::build(space(), TuningCurve::von_mises(3.0), &[30.0]).unwrap();
        let row: Vec<f64> = tuning.matrix().row(0).iter().copied().collect();
        let peak = row
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(30));
        // Opposite orientation is the minimum
        assert!(row[120] < row[60]);
    }

    #[test]
    fn test_evenly_spaced_preferences_rounded() {
        let prefs = evenly_spaced_preferences(8, &space()).unwrap();
        assert_eq!(prefs, vec![0.0, 23.0, 45.0, 68.0, 90.0, 113.0, 135.0, 158.0]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TuningCurve::von_mises(-1.0).validate().is_err());
        assert!(TuningCurve::rectified_cosine(0.0).validate().is_err());
        assert!(TuningCurve::rectified_cosine(f64::NAN).validate().is_err());
        assert!(TuningMatrix::build(space(), TuningCurve::von_mises(1.0), &[]).is_err());
        assert!(TuningMatrix::build(space(), TuningCurve::von_mises(1.0), &[180.0]).is_err());
        assert!(evenly_spaced_preferences(0, &space()).is_err());
    }

    #[test]
    fn test_underflowing_curve_rejected() {
        // Peak falls between labels and the curve vanishes on both neighbours
        assert!(matches!(
            TuningMatrix::build(space(), TuningCurve::von_mises(1e8), &[22.5]),
            Err(IemError::NumericalInstability { .. })
        ));
        assert!(matches!(
            ChannelBasis::build(space(), TuningCurve::rectified_cosine(1e12), &[22.5]),
            Err(IemError::NumericalInstability { .. })
        ));
        // On a whole label the peak is sampled exactly and survives
        let sharp = TuningMatrix::build(space(), TuningCurve::von_mises(1e8), &[22.0]).unwrap();
        assert_relative_eq!(sharp.matrix().row(0).max(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(sharp.matrix()[(0, 22)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_design_matrix_selects_columns() {
        let basis = ChannelBasis::rectified_cosine(space(), 8, 7.0).unwrap();
        let design = basis.design_matrix(&[0, 45, 45, 179]).unwrap();
        assert_eq!(design.shape(), (4, 8));
        assert_relative_eq!(design[(0, 0)], 1.0);
        assert_relative_eq!(design[(1, 2)], 1.0);
        assert_eq!(design.row(1), design.row(2));
        assert!(matches!(
            basis.design_matrix(&[180]),
            Err(IemError::StimulusOutOfRange { .. })
        ));
    }

    #[test]
    fn test_cyclic_reweighting() {
        let t = cyclic_reweighting(4, &[1.0, 0.5, 0.0, 0.25]).unwrap();
        assert_eq!(t.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.5, 0.0, 0.25]);
        assert_eq!(t.row(1).iter().copied().collect::<Vec<_>>(), vec![0.25, 1.0, 0.5, 0.0]);
        assert!(cyclic_reweighting(4, &[1.0]).is_err());
    }

    #[test]
    fn test_transformed_basis_shape_checked() {
        let basis = ChannelBasis::rectified_cosine(space(), 8, 7.0).unwrap();
        assert!(basis.transformed(&DMatrix::identity(7, 7)).is_err());
        let same = basis.transformed(&DMatrix::identity(8, 8)).unwrap();
        assert_relative_eq!(same.matrix(), basis.matrix(), epsilon = 1e-15);
    }
}
