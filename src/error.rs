//! Error types for the orientation filter.
//!
//! Shape errors are programming mistakes: the arithmetic operators on
//! [`Matrix`](crate::Matrix) panic with them. Only the `try_*` methods hand
//! them back as values.

use thiserror::Error;

/// Failures raised by [`Matrix`](crate::Matrix) operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    /// Operands do not have conformant shapes.
    #[error("shape mismatch in {op}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        /// Operation being attempted.
        op: &'static str,
        /// Shape of the left operand as (rows, cols).
        lhs: (usize, usize),
        /// Shape of the right operand as (rows, cols).
        rhs: (usize, usize),
    },

    /// Element access outside the matrix.
    #[error("index ({row}, {col}) out of bounds for {rows}x{cols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// Nested rows of differing length.
    #[error("row {row} has {found} elements, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// The matrix is not (numerically) invertible.
    #[error("matrix is singular")]
    Singular,

    /// A zero-norm vector cannot be normalized.
    #[error("cannot normalize a zero-norm vector")]
    DegenerateNormalization,
}

/// Failures of the filter engine and the estimation loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// The innovation covariance could not be inverted; the filter has diverged
    /// or its noise/reference configuration is degenerate.
    #[error("innovation covariance is singular")]
    Singular,

    /// The quaternion state collapsed to zero norm.
    #[error("quaternion state has zero norm")]
    DegenerateNormalization,

    /// A sensor reading that cannot be used this cycle (zero magnetic field).
    #[error("measurement has zero norm")]
    DegenerateMeasurement,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Matrix(MatrixError),
}

impl From<MatrixError> for FilterError {
    fn from(err: MatrixError) -> Self {
        match err {
            MatrixError::Singular => FilterError::Singular,
            MatrixError::DegenerateNormalization => FilterError::DegenerateNormalization,
            other => FilterError::Matrix(other),
        }
    }
}

impl FilterError {
    /// Whether the loop may skip this cycle and keep running.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FilterError::Singular | FilterError::DegenerateMeasurement
        )
    }
}

/// Failures while handing a record to the transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no peer connected")]
    Disconnected,

    #[error("failed to encode orientation record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("send failed: {0}")]
    Send(String),
}
