//! IEM Core - forward encoding models and their inversion
//!
//! Simulates orientation-tuned populations, fits a linear channel encoding
//! model to their (voxel) responses and inverts it, either to channel
//! responses or to a Bayesian likelihood over the stimulus space.
//!
//! # Modules
//!
//! - [`tuning`]: Von Mises and rectified-cosine tuning curves, channel bases
//! - [`simulation`]: seeded response simulation through random mixing weights
//! - [`encoding`]: least-squares fitting and pooled variance explained
//! - [`decoding`]: channel-space inversion and stimulus likelihoods
//! - [`experiment`]: end-to-end runs with serializable reports
//!
//! Matrix orientation conventions are listed in [`types`].
//!
//! # Example
//!
//! ```rust
//! use iem_core::{run_experiment, ExperimentConfig};
//!
//! let config = ExperimentConfig { trials_per_stimulus: 2, ..Default::default() };
//! let outcome = run_experiment(&config).unwrap();
//! assert!(outcome.report.train_fit.variance_explained > 0.8);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod decoding;
pub mod encoding;
pub mod error;
pub mod experiment;
pub mod linalg;
pub mod simulation;
pub mod tuning;
pub mod types;

// Re-export key types
pub use decoding::{ChannelEstimates, NoiseModel, StimulusLikelihood};
pub use encoding::{EncodingModel, FitConfig, GoodnessOfFit};
pub use error::{IemError, IemResult};
pub use experiment::{run_experiment, ExperimentConfig, ExperimentOutcome, ExperimentReport, GeneratorKind};
pub use simulation::{simulate_responses, MixingWeights, SimulatedResponses, StimulusSequence};
pub use tuning::{ChannelBasis, PopulationTuning, TuningCurve, TuningMatrix};
pub use types::StimulusSpace;
