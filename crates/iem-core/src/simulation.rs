//! Response Simulator
//!
//! Synthesises measurement-channel (voxel) responses from a tuned
//! population.
//!
//! # Pipeline
//!
//! ```text
//! stimulus ──► tuning column ──► × mixing weights ──► ÷ global mean ──► + N(0, σ)
//!  (label)        (U)               (U × M)             (≈ 1)            (T × M)
//! ```
//!
//! The random source is always injected, so equal seeds give bit-identical
//! datasets.

use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::{IemError, IemResult};
use crate::tuning::PopulationTuning;
use crate::types::StimulusSpace;

/// Non-negative projection from units to measurement channels (`U × M`).
///
/// Drawn once per simulated subject.
#[derive(Clone, Debug, PartialEq)]
pub struct MixingWeights {
    matrix: DMatrix<f64>,
}

impl MixingWeights {
    /// Uniform `[0, 1)` weights
    ///
    /// # Errors
    /// `InvalidConfiguration` when either count is zero.
    pub fn random<R: Rng + ?Sized>(units: usize, measurements: usize, rng: &mut R) -> IemResult<Self> {
        if units == 0 || measurements == 0 {
            return Err(IemError::invalid(
                "mixing_weights",
                format!("shape {units} × {measurements} must be non-empty"),
            ));
        }
        let uniform = Uniform::new(0.0, 1.0);
        let matrix = DMatrix::from_fn(units, measurements, |_, _| uniform.sample(rng));
        Ok(Self { matrix })
    }

    /// Wrap an existing matrix
    ///
    /// # Errors
    /// `InvalidConfiguration` for an empty matrix or negative/non-finite entries.
    pub fn from_matrix(matrix: DMatrix<f64>) -> IemResult<Self> {
        if matrix.is_empty() {
            return Err(IemError::invalid("mixing_weights", "matrix is empty"));
        }
        if matrix.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(IemError::invalid(
                "mixing_weights",
                "weights must be finite and non-negative",
            ));
        }
        Ok(Self { matrix })
    }

    /// Weights, `U × M`
    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Number of source units
    #[must_use]
    pub fn units(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of measurement channels
    #[must_use]
    pub fn measurements(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Ordered trial stimuli, each a label in the stimulus space
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StimulusSequence {
    space: StimulusSpace,
    labels: Vec<usize>,
}

impl StimulusSequence {
    /// Validate and wrap a list of labels
    ///
    /// # Errors
    /// `StimulusOutOfRange` for any label outside the space.
    pub fn from_labels(space: StimulusSpace, labels: Vec<usize>) -> IemResult<Self> {
        for &label in &labels {
            space.check(label)?;
        }
        Ok(Self { space, labels })
    }

    /// Every label of the space, each repeated `trials_per_stimulus` times
    /// in a row (0, 0, …, 1, 1, …)
    ///
    /// # Errors
    /// `InvalidConfiguration` when `trials_per_stimulus` is zero.
    pub fn repeated(space: StimulusSpace, trials_per_stimulus: usize) -> IemResult<Self> {
        if trials_per_stimulus == 0 {
            return Err(IemError::invalid("trials_per_stimulus", "must be positive"));
        }
        let labels = space
            .labels()
            .flat_map(|label| std::iter::repeat(label).take(trials_per_stimulus))
            .collect();
        Ok(Self { space, labels })
    }

    /// Same trials in a random order
    #[must_use]
    pub fn shuffled<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        self.labels.shuffle(rng);
        self
    }

    /// Trial labels
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of trials
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when there are no trials
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Stimulus space
    #[must_use]
    pub fn space(&self) -> StimulusSpace {
        self.space
    }

    /// Indices of the trials showing `label`
    pub fn trials_for(&self, label: usize) -> impl Iterator<Item = usize> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(move |(_, l)| **l == label)
            .map(|(t, _)| t)
    }
}

/// Output of [`simulate_responses`]
#[derive(Clone, Debug)]
pub struct SimulatedResponses {
    /// Noisy responses, `T × M`
    pub observed: DMatrix<f64>,
    /// Responses before noise, after mean normalisation, `T × M`
    pub noiseless: DMatrix<f64>,
    /// Global mean the raw projection was divided by
    pub scale: f64,
}

/// Simulate measurement-channel responses to a stimulus sequence.
///
/// # Errors
/// - `InvalidConfiguration` for an empty sequence or a negative/non-finite
///   `noise_sd`
/// - `DimensionMismatch` when the tuning rows and the mixing units disagree,
///   or the sequence and the tuning use different stimulus spaces
/// - `NumericalInstability` when the noiseless responses average to zero
pub fn simulate_responses<P, R>(
    tuning: &P,
    stimuli: &StimulusSequence,
    mixing: &MixingWeights,
    noise_sd: f64,
    rng: &mut R,
) -> IemResult<SimulatedResponses>
where
    P: PopulationTuning + ?Sized,
    R: Rng + ?Sized,
{
    if !noise_sd.is_finite() || noise_sd < 0.0 {
        return Err(IemError::invalid(
            "noise_sd",
            format!("{noise_sd} must be finite and non-negative"),
        ));
    }
    if stimuli.is_empty() {
        return Err(IemError::invalid("stimuli", "sequence is empty"));
    }

    let curves = tuning.curves();
    let space = tuning.stimulus_space();
    if stimuli.space() != space {
        return Err(IemError::mismatch(
            "simulate stimuli",
            (stimuli.len(), space.size()),
            (stimuli.len(), stimuli.space().size()),
        ));
    }
    if curves.nrows() != mixing.units() {
        return Err(IemError::mismatch(
            "simulate mixing",
            (curves.nrows(), mixing.measurements()),
            mixing.matrix().shape(),
        ));
    }

    let labels = stimuli.labels();
    let population = DMatrix::from_fn(labels.len(), curves.nrows(), |t, u| curves[(u, labels[t])]);
    let raw = population * mixing.matrix();

    let scale = raw.mean();
    if !(scale.is_finite() && scale > 0.0) {
        return Err(IemError::NumericalInstability {
            operation: "normalise responses",
            reason: format!("global mean {scale} is not positive"),
        });
    }
    let noiseless = raw / scale;

    let normal = Normal::new(0.0, noise_sd).map_err(|e| IemError::invalid("noise_sd", e.to_string()))?;
    let mut observed = noiseless.clone();
    // Row-major draw order so a seed maps to one dataset regardless of storage layout
    for t in 0..observed.nrows() {
        for m in 0..observed.ncols() {
            observed[(t, m)] += normal.sample(rng);
        }
    }

    tracing::debug!(
        trials = labels.len(),
        measurements = mixing.measurements(),
        noise_sd,
        scale,
        "simulated responses"
    );

    Ok(SimulatedResponses { observed, noiseless, scale })
}
