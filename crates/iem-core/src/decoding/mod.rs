//! Inverted encoding model
//!
//! Two ways back from measurements to the stimulus:
//!
//! - [`channel`]: point estimate of channel responses, `Y · pinv(W)`.
//!   Only identified up to the linear transform implicit in the choice of
//!   basis: reweighting the basis changes the recovered profile shape.
//! - [`likelihood`]: Gaussian stimulus likelihood evaluated in measurement
//!   space under a [`noise::NoiseModel`]. Invariant to invertible
//!   reparameterisations of the basis.

pub mod channel;
pub mod likelihood;
pub mod noise;

pub use channel::{estimate_channel_responses, recentered_profile, ChannelEstimates};
pub use likelihood::{circular_spread, StimulusLikelihood};
pub use noise::NoiseModel;
