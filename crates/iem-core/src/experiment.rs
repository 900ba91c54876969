//! Experiment Runner
//!
//! End-to-end encoding/inversion run on simulated data.
//!
//! # Pipeline
//!
//! ```text
//! generator tuning ──► mixing weights ──► train responses ──► fit W ──► train fit
//!                                    └──► test responses  ──► test fit
//!                                                         ├──► pinv(W) ──► channel profile
//!                                                         └──► noise model ──► likelihood
//! ```
//!
//! Train and test sets share the subject (mixing weights) and draw
//! independent noise from one seeded generator.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::decoding::{
    estimate_channel_responses, recentered_profile, ChannelEstimates, NoiseModel,
    StimulusLikelihood,
};
use crate::encoding::{EncodingModel, FitConfig, GoodnessOfFit};
use crate::error::{IemError, IemResult};
use crate::linalg::SvdDiagnostics;
use crate::simulation::{simulate_responses, MixingWeights, SimulatedResponses, StimulusSequence};
use crate::tuning::{cyclic_reweighting, ChannelBasis, PopulationTuning, TuningCurve, TuningMatrix};
use crate::types::StimulusSpace;

/// What produces the "true" responses
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorKind {
    /// The unweighted channel basis is the true population
    ChannelBasis,
    /// Von Mises neurons with evenly spaced preferences
    VonMisesPopulation {
        /// Number of neurons
        units: usize,
        /// Von Mises concentration
        concentration: f64,
    },
}

/// Experiment configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Stimulus space size (even)
    pub stimulus_space: usize,
    /// Channels in the encoding basis
    pub channels: usize,
    /// Rectified-cosine exponent of the basis
    pub exponent: f64,
    /// Repeats of each stimulus, per data set
    pub trials_per_stimulus: usize,
    /// Measurement channels (voxels)
    pub measurements: usize,
    /// Additive noise standard deviation
    pub noise_sd: f64,
    /// Random seed
    pub seed: u64,
    /// True response generator
    pub generator: GeneratorKind,
    /// Optional circulant kernel applied to the basis before fitting
    pub basis_reweighting: Option<Vec<f64>>,
    /// Fitter settings
    pub fit: FitConfig,
    /// Lower bound for the fitted noise variance
    pub min_noise_variance: f64,
    /// Stimulus whose averaged posterior is summarised
    pub probe_stimulus: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            stimulus_space: StimulusSpace::ORIENTATION_DEGREES,
            channels: 8,
            exponent: 7.0,
            trials_per_stimulus: 20,
            measurements: 50,
            noise_sd: 0.05,
            seed: 42,
            generator: GeneratorKind::ChannelBasis,
            basis_reweighting: None,
            fit: FitConfig::default(),
            min_noise_variance: 1e-12,
            probe_stimulus: 90,
        }
    }
}

/// Serializable summary of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    /// In-sample fit
    pub train_fit: GoodnessOfFit,
    /// Held-out fit
    pub test_fit: GoodnessOfFit,
    /// Conditioning of the training design matrix
    pub design: SvdDiagnostics,
    /// Isotropic noise variance fitted on held-out residuals
    pub noise_variance: f64,
    /// Mean absolute circular error of MAP estimates on the test set
    pub mean_absolute_decoding_error: f64,
    /// Mean circular spread of the single-trial posteriors
    pub mean_posterior_spread: f64,
    /// Probe stimulus label
    pub probe_stimulus: usize,
    /// Circular spread of the posterior averaged over probe repeats
    pub probe_posterior_spread: f64,
    /// Test-set channel estimates, recentred and averaged
    pub channel_profile: Vec<f64>,
}

/// Every intermediate product of a run, for callers that plot them
#[derive(Clone, Debug)]
pub struct ExperimentOutcome {
    /// Basis used for fitting (after any reweighting)
    pub basis: ChannelBasis,
    /// Training stimuli
    pub train_stimuli: StimulusSequence,
    /// Test stimuli
    pub test_stimuli: StimulusSequence,
    /// Training responses
    pub train: SimulatedResponses,
    /// Test responses
    pub test: SimulatedResponses,
    /// Fitted encoding model
    pub model: EncodingModel,
    /// Test-set channel estimates
    pub channel_estimates: ChannelEstimates,
    /// Noise model fitted on test residuals
    pub noise: NoiseModel,
    /// Test-set likelihood
    pub likelihood: StimulusLikelihood,
    /// Summary
    pub report: ExperimentReport,
}

/// Run the full pipeline for `config`.
///
/// # Errors
/// Any stage error; `StimulusOutOfRange` for a bad probe stimulus.
pub fn run_experiment(config: &ExperimentConfig) -> IemResult<ExperimentOutcome> {
    let space = StimulusSpace::new(config.stimulus_space)?;
    space.check(config.probe_stimulus)?;
    if !(config.min_noise_variance.is_finite() && config.min_noise_variance > 0.0) {
        return Err(IemError::invalid("min_noise_variance", "must be finite and positive"));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let true_basis = ChannelBasis::rectified_cosine(space, config.channels, config.exponent)?;

    let generator: Box<dyn PopulationTuning> = match &config.generator {
        GeneratorKind::ChannelBasis => Box::new(true_basis.clone()),
        GeneratorKind::VonMisesPopulation { units, concentration } => Box::new(
            TuningMatrix::evenly_spaced(space, TuningCurve::von_mises(*concentration), *units)?,
        ),
    };
    let units = generator.curves().nrows();

    let basis = match &config.basis_reweighting {
        Some(kernel) => true_basis.transformed(&cyclic_reweighting(config.channels, kernel)?)?,
        None => true_basis,
    };

    let mixing = MixingWeights::random(units, config.measurements, &mut rng)?;
    let train_stimuli = StimulusSequence::repeated(space, config.trials_per_stimulus)?;
    let test_stimuli = train_stimuli.clone();
    let train =
        simulate_responses(generator.as_ref(), &train_stimuli, &mixing, config.noise_sd, &mut rng)?;
    let test =
        simulate_responses(generator.as_ref(), &test_stimuli, &mixing, config.noise_sd, &mut rng)?;

    let train_design = basis.design_matrix(train_stimuli.labels())?;
    let test_design = basis.design_matrix(test_stimuli.labels())?;
    let model = EncodingModel::fit(&train_design, &train.observed, &config.fit)?;

    let train_fit = GoodnessOfFit::evaluate(&train.observed, &model.predict(&train_design)?)?;
    let test_prediction = model.predict(&test_design)?;
    let test_fit = GoodnessOfFit::evaluate(&test.observed, &test_prediction)?;

    let channel_estimates = estimate_channel_responses(&model, &test.observed, &config.fit)?;
    let channel_profile = recentered_profile(&channel_estimates.estimates, &test_stimuli, &basis)?;

    let residual_variance = NoiseModel::residual_variance(&test.observed, &test_prediction)?;
    let noise_variance = if residual_variance < config.min_noise_variance {
        tracing::warn!(
            residual_variance,
            floor = config.min_noise_variance,
            "residual variance below floor; clamping noise model"
        );
        config.min_noise_variance
    } else {
        residual_variance
    };
    let noise = NoiseModel::isotropic(noise_variance, config.measurements)?;
    let likelihood = StimulusLikelihood::compute(&model, &basis, &noise, &test.observed)?;

    let errors = likelihood.decoding_errors(&test_stimuli)?;
    let abs_errors: Vec<f64> = errors.iter().map(|e| e.abs()).collect();
    let spreads = (0..likelihood.trials())
        .map(|t| likelihood.circular_spread(t))
        .collect::<IemResult<Vec<f64>>>()?;
    let probe = likelihood.average_for_stimulus(&test_stimuli, config.probe_stimulus)?;

    let report = ExperimentReport {
        train_fit,
        test_fit,
        design: model.diagnostics().clone(),
        noise_variance,
        mean_absolute_decoding_error: DVector::from_vec(abs_errors).mean(),
        mean_posterior_spread: DVector::from_vec(spreads).mean(),
        probe_stimulus: config.probe_stimulus,
        probe_posterior_spread: crate::decoding::circular_spread(&probe, &space),
        channel_profile,
    };

    tracing::info!(
        train_r2 = report.train_fit.variance_explained,
        test_r2 = report.test_fit.variance_explained,
        decoding_error = report.mean_absolute_decoding_error,
        "experiment complete"
    );

    Ok(ExperimentOutcome {
        basis,
        train_stimuli,
        test_stimuli,
        train,
        test,
        model,
        channel_estimates,
        noise,
        likelihood,
        report,
    })
}
