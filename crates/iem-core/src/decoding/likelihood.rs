//! Bayesian stimulus likelihood.
//!
//! For each trial `y` and candidate stimulus `s`:
//!
//! ```text
//! p(y | s) = N(y; μ_s, Σ),   μ_s = B[:, s]ᵀ · W
//! ```
//!
//! The density lives in measurement space, so replacing the basis `B` by
//! `T·B` for any invertible `T` (and refitting) leaves it unchanged: the
//! refit weights absorb `T⁻ᵀ` and every `μ_s` is the same.
//!
//! Candidates are whitened once (`L⁻¹ μ_s`) and so is each trial; the
//! Mahalanobis distance is then a plain squared norm. Each (trial,
//! candidate) cell is independent.

use nalgebra::DMatrix;

use super::noise::NoiseModel;
use crate::encoding::EncodingModel;
use crate::error::{IemError, IemResult};
use crate::simulation::StimulusSequence;
use crate::tuning::ChannelBasis;
use crate::types::{ensure_cols, StimulusSpace};

/// Log-likelihood of every candidate stimulus for every trial (`T × S`)
#[derive(Clone, Debug)]
pub struct StimulusLikelihood {
    space: StimulusSpace,
    log_likelihood: DMatrix<f64>,
}

impl StimulusLikelihood {
    /// Evaluate the likelihood of all candidates for each row of `responses`.
    ///
    /// # Errors
    /// `DimensionMismatch` when the basis, model, noise model and responses
    /// disagree on channel or measurement counts.
    pub fn compute(
        model: &EncodingModel,
        basis: &ChannelBasis,
        noise: &NoiseModel,
        responses: &DMatrix<f64>,
    ) -> IemResult<Self> {
        if basis.channels() != model.channels() {
            return Err(IemError::mismatch(
                "likelihood basis",
                (model.channels(), basis.space().size()),
                basis.matrix().shape(),
            ));
        }
        let m = model.measurements();
        if noise.measurements() != m {
            return Err(IemError::mismatch(
                "likelihood noise",
                (m, m),
                noise.covariance().shape(),
            ));
        }
        ensure_cols("likelihood responses", responses, m)?;

        // μ_s as columns: (B[:, s]ᵀ W)ᵀ = Wᵀ B, M × S
        let means = model.weights().transpose() * basis.matrix();
        let whitened_means = noise.whiten(&means)?;
        let whitened_trials = noise.whiten(&responses.transpose())?;
        let log_normaliser = noise.log_normaliser();

        let log_likelihood = DMatrix::from_fn(responses.nrows(), means.ncols(), |t, s| {
            let distance: f64 = whitened_trials
                .column(t)
                .iter()
                .zip(whitened_means.column(s).iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            log_normaliser - 0.5 * distance
        });

        tracing::debug!(
            trials = responses.nrows(),
            candidates = means.ncols(),
            "computed stimulus likelihood"
        );

        Ok(Self { space: basis.space(), log_likelihood })
    }

    /// Densities for a single trial's response vector, one per candidate
    ///
    /// # Errors
    /// As [`StimulusLikelihood::compute`].
    pub fn for_trial(
        model: &EncodingModel,
        basis: &ChannelBasis,
        noise: &NoiseModel,
        response: &[f64],
    ) -> IemResult<Vec<f64>> {
        let row = DMatrix::from_row_slice(1, response.len(), response);
        let likelihood = Self::compute(model, basis, noise, &row)?;
        Ok(likelihood.log_likelihood.row(0).iter().map(|l| l.exp()).collect())
    }

    /// Log densities, `T × S`
    #[must_use]
    pub fn log_likelihood(&self) -> &DMatrix<f64> {
        &self.log_likelihood
    }

    /// Densities, `T × S`. Far candidates underflow to zero for large `M`;
    /// prefer [`StimulusLikelihood::log_likelihood`] or
    /// [`StimulusLikelihood::posterior`] for comparisons.
    #[must_use]
    pub fn likelihood(&self) -> DMatrix<f64> {
        self.log_likelihood.map(f64::exp)
    }

    /// Number of trials
    #[must_use]
    pub fn trials(&self) -> usize {
        self.log_likelihood.nrows()
    }

    /// Stimulus space of the candidates
    #[must_use]
    pub fn space(&self) -> StimulusSpace {
        self.space
    }

    fn check_trial(&self, trial: usize) -> IemResult<()> {
        if trial < self.trials() {
            Ok(())
        } else {
            Err(IemError::invalid(
                "trial",
                format!("index {trial} out of {} trials", self.trials()),
            ))
        }
    }

    /// Posterior over candidates under a flat prior (sums to 1)
    ///
    /// # Errors
    /// `InvalidConfiguration` for an out-of-range trial.
    pub fn posterior(&self, trial: usize) -> IemResult<Vec<f64>> {
        self.check_trial(trial)?;
        let row = self.log_likelihood.row(trial);
        let peak = row.max();
        let unnormalised: Vec<f64> = row.iter().map(|l| (l - peak).exp()).collect();
        let total: f64 = unnormalised.iter().sum();
        Ok(unnormalised.into_iter().map(|p| p / total).collect())
    }

    /// Most likely candidate for a trial
    ///
    /// # Errors
    /// `InvalidConfiguration` for an out-of-range trial.
    pub fn map_estimate(&self, trial: usize) -> IemResult<usize> {
        self.check_trial(trial)?;
        Ok(self
            .log_likelihood
            .row(trial)
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map_or(0, |(s, _)| s))
    }

    /// Circular standard deviation of a trial's posterior, in stimulus units
    ///
    /// # Errors
    /// `InvalidConfiguration` for an out-of-range trial.
    pub fn circular_spread(&self, trial: usize) -> IemResult<f64> {
        Ok(circular_spread(&self.posterior(trial)?, &self.space))
    }

    /// Posterior averaged over a set of trials
    ///
    /// # Errors
    /// `InvalidConfiguration` for an empty set or out-of-range trials.
    pub fn average_posterior<I>(&self, trials: I) -> IemResult<Vec<f64>>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut average = vec![0.0; self.space.size()];
        let mut count = 0usize;
        for trial in trials {
            for (acc, p) in average.iter_mut().zip(self.posterior(trial)?) {
                *acc += p;
            }
            count += 1;
        }
        if count == 0 {
            return Err(IemError::invalid("trials", "no trials to average"));
        }
        for v in &mut average {
            *v /= count as f64;
        }
        Ok(average)
    }

    /// Posterior averaged across every repeat of `label` in `stimuli`
    ///
    /// # Errors
    /// `DimensionMismatch` when `stimuli` does not match the trial count;
    /// `InvalidConfiguration` when `label` never occurs.
    pub fn average_for_stimulus(&self, stimuli: &StimulusSequence, label: usize) -> IemResult<Vec<f64>> {
        self.check_sequence(stimuli)?;
        self.average_posterior(stimuli.trials_for(label))
    }

    /// Signed circular error of the MAP estimate for each trial
    ///
    /// # Errors
    /// `DimensionMismatch` when `stimuli` does not match the trial count.
    pub fn decoding_errors(&self, stimuli: &StimulusSequence) -> IemResult<Vec<f64>> {
        self.check_sequence(stimuli)?;
        stimuli
            .labels()
            .iter()
            .enumerate()
            .map(|(t, &label)| {
                let estimate = self.map_estimate(t)?;
                Ok(self.space.circular_distance(estimate as f64, label as f64))
            })
            .collect()
    }

    fn check_sequence(&self, stimuli: &StimulusSequence) -> IemResult<()> {
        if stimuli.len() != self.trials() || stimuli.space() != self.space {
            return Err(IemError::mismatch(
                "likelihood stimuli",
                (self.trials(), self.space.size()),
                (stimuli.len(), stimuli.space().size()),
            ));
        }
        Ok(())
    }
}

/// Circular standard deviation, in stimulus units, of a distribution over
/// the stimulus space: `sqrt(−2 ln R)` where `R` is the mean resultant
/// length on the stretched circle.
pub fn circular_spread(distribution: &[f64], space: &StimulusSpace) -> f64 {
    let total: f64 = distribution.iter().sum();
    if total <= 0.0 {
        return f64::INFINITY;
    }
    let (c, s) = distribution.iter().enumerate().fold((0.0, 0.0), |(c, s), (label, p)| {
        let angle = space.to_radians(label as f64);
        (c + p * angle.cos(), s + p * angle.sin())
    });
    let resultant = (c.hypot(s) / total).clamp(f64::MIN_POSITIVE, 1.0);
    space.from_radians((-2.0 * resultant.ln()).sqrt())
}
