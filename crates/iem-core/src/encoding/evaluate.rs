//! Model Evaluator
//!
//! Variance explained is `1 − Var(residual) / Var(observed)` where `Var` is
//! the population variance of ALL matrix elements pooled into one sample.
//! Pooling rows and columns together (rather than per measurement channel)
//! is deliberate: it reproduces the reference values and its scale
//! sensitivity. [`variance_explained_per_column`] gives the per-channel view
//! for callers that want it.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{IemError, IemResult};
use crate::types::ensure_shape;

fn check_pair(observed: &DMatrix<f64>, predicted: &DMatrix<f64>) -> IemResult<()> {
    ensure_shape("evaluate", predicted, observed.shape())?;
    if observed.is_empty() {
        return Err(IemError::invalid("observed", "matrix is empty"));
    }
    Ok(())
}

/// `1 − residual / total` for two population variances
fn variance_ratio(total: f64, residual: f64) -> IemResult<f64> {
    if total <= 0.0 {
        return Err(IemError::NumericalInstability {
            operation: "variance_explained",
            reason: "observed responses have zero variance".to_string(),
        });
    }
    Ok(1.0 - residual / total)
}

/// Pooled variance explained.
///
/// # Errors
/// `DimensionMismatch` for unequal shapes, `InvalidConfiguration` for empty
/// input, `NumericalInstability` when the observed values are constant.
pub fn variance_explained(observed: &DMatrix<f64>, predicted: &DMatrix<f64>) -> IemResult<f64> {
    check_pair(observed, predicted)?;
    let residual = observed - predicted;
    variance_ratio(observed.variance(), residual.variance())
}

/// Mean squared residual over all elements.
///
/// # Errors
/// `DimensionMismatch` for unequal shapes, `InvalidConfiguration` for empty input.
pub fn mean_squared_error(observed: &DMatrix<f64>, predicted: &DMatrix<f64>) -> IemResult<f64> {
    check_pair(observed, predicted)?;
    Ok((observed - predicted).map(|r| r * r).mean())
}

/// Variance explained computed separately for each measurement channel.
///
/// # Errors
/// As [`variance_explained`]; any constant column fails.
pub fn variance_explained_per_column(
    observed: &DMatrix<f64>,
    predicted: &DMatrix<f64>,
) -> IemResult<Vec<f64>> {
    check_pair(observed, predicted)?;
    let residual = observed - predicted;
    observed
        .column_iter()
        .zip(residual.column_iter())
        .map(|(obs, res)| variance_ratio(obs.variance(), res.variance()))
        .collect()
}

/// Both goodness-of-fit numbers for one comparison
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoodnessOfFit {
    /// Pooled variance explained
    pub variance_explained: f64,
    /// Mean squared error
    pub mean_squared_error: f64,
}

impl GoodnessOfFit {
    /// Evaluate `predicted` against `observed`
    ///
    /// # Errors
    /// As [`variance_explained`].
    pub fn evaluate(observed: &DMatrix<f64>, predicted: &DMatrix<f64>) -> IemResult<Self> {
        Ok(Self {
            variance_explained: variance_explained(observed, predicted)?,
            mean_squared_error: mean_squared_error(observed, predicted)?,
        })
    }
}
