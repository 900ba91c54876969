//! Error types for encoding-model construction, fitting and inversion.
//!
//! Everything here is closed-form linear algebra, so failures are local and
//! surfaced immediately. Nothing is retried.

use thiserror::Error;

/// Errors produced by the encoding/inversion pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IemError {
    /// A shape or tuning parameter is malformed
    #[error("Invalid configuration for {parameter}: {reason}")]
    InvalidConfiguration {
        /// Parameter name
        parameter: &'static str,
        /// Reason
        reason: String,
    },

    /// Two matrices that must agree in shape do not
    #[error("Dimension mismatch in {operation}: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        /// Operation that rejected the input
        operation: &'static str,
        /// Expected (rows, cols)
        expected: (usize, usize),
        /// Received (rows, cols)
        got: (usize, usize),
    },

    /// A decomposition has no usable answer for this input
    #[error("Numerical instability in {operation}: {reason}")]
    NumericalInstability {
        /// Operation that failed
        operation: &'static str,
        /// Reason
        reason: String,
    },

    /// A stimulus label falls outside the stimulus space
    #[error("Stimulus label {label} outside stimulus space of size {size}")]
    StimulusOutOfRange {
        /// Offending label
        label: usize,
        /// Stimulus space size
        size: usize,
    },
}

impl IemError {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration { parameter, reason: reason.into() }
    }

    pub(crate) fn mismatch(
        operation: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    ) -> Self {
        Self::DimensionMismatch { operation, expected, got }
    }
}

/// Result type for pipeline operations
pub type IemResult<T> = Result<T, IemError>;
