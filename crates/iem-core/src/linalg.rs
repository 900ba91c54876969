//! Dense linear-algebra helpers shared by the fitter and the decoders.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{IemError, IemResult};

/// Singular-value summary of a matrix that was pseudo-inverted
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SvdDiagnostics {
    /// Singular values, largest first
    pub singular_values: Vec<f64>,
    /// Ratio of the largest to the smallest singular value
    pub condition_number: f64,
    /// Number of singular values above the cutoff
    pub rank: usize,
    /// Cutoff below which singular values were treated as zero
    pub cutoff: f64,
    /// Set when any singular value fell below the cutoff
    pub low_confidence: bool,
}

/// Moore–Penrose pseudo-inverse together with its diagnostics
#[derive(Clone, Debug)]
pub struct PseudoInverse {
    /// The pseudo-inverse (`ncols × nrows` of the input)
    pub matrix: DMatrix<f64>,
    /// Conditioning of the input
    pub diagnostics: SvdDiagnostics,
}

/// SVD pseudo-inverse.
///
/// Singular values at or below `relative_tolerance · σ_max` are zeroed.
/// A rank-deficient input still yields a pseudo-inverse; it is reported
/// through [`SvdDiagnostics::low_confidence`].
///
/// # Errors
/// `InvalidConfiguration` for an empty matrix or a negative tolerance,
/// `NumericalInstability` when the input contains non-finite values.
pub fn pseudo_inverse(matrix: &DMatrix<f64>, relative_tolerance: f64) -> IemResult<PseudoInverse> {
    if matrix.is_empty() {
        return Err(IemError::invalid("pseudo_inverse", "matrix is empty"));
    }
    if !(relative_tolerance >= 0.0) {
        return Err(IemError::invalid(
            "relative_tolerance",
            format!("{relative_tolerance} must be non-negative"),
        ));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(IemError::NumericalInstability {
            operation: "pseudo_inverse",
            reason: "matrix contains non-finite values".to_string(),
        });
    }

    let svd = matrix.clone().svd(true, true);

    let mut singular_values: Vec<f64> = svd.singular_values.iter().copied().collect();
    singular_values.sort_by(|a, b| b.total_cmp(a));

    let sigma_max = singular_values.first().copied().unwrap_or(0.0);
    let sigma_min = singular_values.last().copied().unwrap_or(0.0);
    let cutoff = relative_tolerance * sigma_max;
    let rank = singular_values.iter().filter(|&&s| s > cutoff).count();
    let condition_number = if sigma_min > 0.0 { sigma_max / sigma_min } else { f64::INFINITY };

    let inverse = svd.pseudo_inverse(cutoff).map_err(|reason| IemError::NumericalInstability {
        operation: "pseudo_inverse",
        reason: reason.to_string(),
    })?;

    Ok(PseudoInverse {
        matrix: inverse,
        diagnostics: SvdDiagnostics {
            low_confidence: rank < singular_values.len(),
            singular_values,
            condition_number,
            rank,
            cutoff,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pinv_of_invertible_is_inverse() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let pinv = pseudo_inverse(&m, 1e-10).unwrap();
        let product = &m * &pinv.matrix;
        assert_relative_eq!(product, DMatrix::identity(2, 2), epsilon = 1e-12);
        assert_eq!(pinv.diagnostics.rank, 2);
        assert!(!pinv.diagnostics.low_confidence);
    }

    #[test]
    fn test_pinv_of_tall_matrix_is_left_inverse() {
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let pinv = pseudo_inverse(&m, 1e-10).unwrap();
        assert_eq!(pinv.matrix.shape(), (2, 3));
        assert_relative_eq!(&pinv.matrix * &m, DMatrix::identity(2, 2), epsilon = 1e-12);
    }

    #[test]
    fn test_rank_deficient_is_flagged() {
        // Second column duplicates the first
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let pinv = pseudo_inverse(&m, 1e-10).unwrap();
        assert_eq!(pinv.diagnostics.rank, 1);
        assert!(pinv.diagnostics.low_confidence);
        // Still satisfies the Penrose identity A A⁺ A = A
        assert_relative_eq!(&m * &pinv.matrix * &m, m, epsilon = 1e-10);
    }

    #[test]
    fn test_rejects_non_finite() {
        let m = DMatrix::from_row_slice(1, 2, &[1.0, f64::NAN]);
        assert!(matches!(
            pseudo_inverse(&m, 1e-10),
            Err(IemError::NumericalInstability { .. })
        ));
    }
}
