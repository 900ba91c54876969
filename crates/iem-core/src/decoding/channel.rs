//! Point-estimate inversion into channel space.

use nalgebra::DMatrix;

use crate::encoding::{EncodingModel, FitConfig};
use crate::error::{IemError, IemResult};
use crate::linalg::{pseudo_inverse, SvdDiagnostics};
use crate::simulation::StimulusSequence;
use crate::tuning::ChannelBasis;
use crate::types::{ensure_cols, ensure_shape};

/// Channel responses recovered from measurements
#[derive(Clone, Debug)]
pub struct ChannelEstimates {
    /// Estimated channel responses, `T × C`
    pub estimates: DMatrix<f64>,
    /// Conditioning of the weight matrix that was inverted
    pub diagnostics: SvdDiagnostics,
}

/// Invert the encoding model: `Y · pinv(W)`.
///
/// Changing the basis by an invertible transform changes these estimates
/// (and so the shape of any profile built from them) without changing how
/// well the model fits. Use [`super::StimulusLikelihood`] for a
/// basis-independent readout.
///
/// # Errors
/// `DimensionMismatch` when `responses` does not have one column per
/// measurement channel of the model.
pub fn estimate_channel_responses(
    model: &EncodingModel,
    responses: &DMatrix<f64>,
    config: &FitConfig,
) -> IemResult<ChannelEstimates> {
    ensure_cols("estimate channels", responses, model.measurements())?;
    let pinv = pseudo_inverse(model.weights(), config.relative_tolerance)?;
    if pinv.diagnostics.low_confidence {
        tracing::warn!(
            rank = pinv.diagnostics.rank,
            channels = model.channels(),
            "weight matrix is rank deficient; channel estimates are low confidence"
        );
    }
    Ok(ChannelEstimates {
        estimates: responses * &pinv.matrix,
        diagnostics: pinv.diagnostics,
    })
}

/// Average channel profile aligned on each trial's stimulus.
///
/// Every trial's channel vector is rotated so the channel whose preferred
/// value is closest to the trial's stimulus sits at index `C / 2`; the
/// rotated vectors are then averaged.
///
/// # Errors
/// `DimensionMismatch` when `estimates` is not `T × C` for this sequence and
/// basis, `InvalidConfiguration` for an empty sequence.
pub fn recentered_profile(
    estimates: &DMatrix<f64>,
    stimuli: &StimulusSequence,
    basis: &ChannelBasis,
) -> IemResult<Vec<f64>> {
    let channels = basis.channels();
    ensure_shape("recenter", estimates, (stimuli.len(), channels))?;
    if stimuli.is_empty() {
        return Err(IemError::invalid("stimuli", "sequence is empty"));
    }

    let space = basis.space();
    let center = channels / 2;
    let mut profile = vec![0.0; channels];

    for (t, &label) in stimuli.labels().iter().enumerate() {
        let nearest = basis
            .preferred()
            .iter()
            .map(|&p| space.circular_distance(label as f64, p).abs())
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map_or(0, |(c, _)| c);
        let shift = (center + channels - nearest) % channels;
        for c in 0..channels {
            profile[(c + shift) % channels] += estimates[(t, c)];
        }
    }

    let n = stimuli.len() as f64;
    for v in &mut profile {
        *v /= n;
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StimulusSpace;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_recovers_channels_without_noise() {
        let basis = ChannelBasis::rectified_cosine(StimulusSpace::orientation(), 4, 3.0).unwrap();
        let stimuli = StimulusSequence::repeated(basis.space(), 1).unwrap();
        let design = basis.design_matrix(stimuli.labels()).unwrap();
        let mixing = DMatrix::from_fn(4, 6, |c, m| 1.0 + ((c * 7 + m * 3) % 5) as f64);
        let responses = &design * &mixing;

        let model = EncodingModel::fit(&design, &responses, &FitConfig::default()).unwrap();
        let estimated =
            estimate_channel_responses(&model, &responses, &FitConfig::default()).unwrap();
        assert_relative_eq!(estimated.estimates, design, epsilon = 1e-8);
        assert!(!estimated.diagnostics.low_confidence);
    }

    #[test]
    fn test_recentered_profile_peaks_at_center() {
        let basis = ChannelBasis::rectified_cosine(StimulusSpace::orientation(), 8, 7.0).unwrap();
        let stimuli = StimulusSequence::from_labels(basis.space(), vec![0, 45, 90, 158]).unwrap();
        let design = basis.design_matrix(stimuli.labels()).unwrap();

        let profile = recentered_profile(&design, &stimuli, &basis).unwrap();
        assert_eq!(profile.len(), 8);
        assert_relative_eq!(profile[4], 1.0, epsilon = 1e-12);
        assert!(profile.iter().all(|&v| v <= profile[4]));
        // Symmetric neighbours
        assert_relative_eq!(profile[3], profile[5], epsilon = 0.05);
    }

    #[test]
    fn test_shape_errors() {
        let basis = ChannelBasis::rectified_cosine(StimulusSpace::orientation(), 8, 7.0).unwrap();
        let stimuli = StimulusSequence::from_labels(basis.space(), vec![0, 1]).unwrap();
        assert!(matches!(
            recentered_profile(&DMatrix::zeros(3, 8), &stimuli, &basis),
            Err(IemError::DimensionMismatch { .. })
        ));
    }
}
