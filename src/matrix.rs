//! Dense real matrix used throughout the filter.
//!
//! [`Matrix`] is a value type over a heap-allocated `nalgebra::DMatrix<f64>`.
//! Shapes are checked here, before nalgebra sees the operands, so that a
//! non-conformant operation is reported as a [`MatrixError`] rather than as an
//! allocator panic deep in the backend.

use std::ops::{Add, Index, Mul, Sub};

use approx::{AbsDiffEq, RelativeEq};
use nalgebra::DMatrix;

use crate::error::MatrixError;

/// Dense, row-major logical `rows × cols` matrix of `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix(DMatrix<f64>);

impl Matrix {
    /// Builds a matrix from nested rows.
    ///
    /// # Arguments
    /// * `rows` - Row sequence; every row must have the same length
    ///
    /// # Returns
    /// A `rows.len() × rows[0].len()` matrix, or [`MatrixError::RaggedRows`]
    ///
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, MatrixError> {
        let expected = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * expected);
        for (row, r) in rows.iter().enumerate() {
            let r = r.as_ref();
            if r.len() != expected {
                return Err(MatrixError::RaggedRows {
                    row,
                    expected,
                    found: r.len(),
                });
            }
            data.extend_from_slice(r);
        }
        Ok(Matrix(DMatrix::from_row_slice(rows.len(), expected, &data)))
    }

    /// Builds a matrix from a fixed-size array of rows. Cannot fail.
    pub fn from_array<const R: usize, const C: usize>(rows: [[f64; C]; R]) -> Self {
        Matrix(DMatrix::from_fn(R, C, |i, j| rows[i][j]))
    }

    /// Builds an `N×1` column from a flat sequence.
    pub fn column(values: &[f64]) -> Self {
        Matrix(DMatrix::from_column_slice(values.len(), 1, values))
    }

    /// `n×n` identity.
    pub fn identity(n: usize) -> Self {
        Matrix(DMatrix::identity(n, n))
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix(DMatrix::zeros(rows, cols))
    }

    pub fn rows(&self) -> usize {
        self.0.nrows()
    }

    pub fn cols(&self) -> usize {
        self.0.ncols()
    }

    /// Shape as `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        self.0.shape()
    }

    /// Zero-based element access.
    pub fn get(&self, row: usize, col: usize) -> Result<f64, MatrixError> {
        let (rows, cols) = self.shape();
        if row >= rows || col >= cols {
            return Err(MatrixError::IndexOutOfBounds {
                row,
                col,
                rows,
                cols,
            });
        }
        Ok(self.0[(row, col)])
    }

    /// Element-wise sum; shapes must be identical.
    pub fn try_add(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        self.check_same_shape("add", rhs)?;
        Ok(Matrix(&self.0 + &rhs.0))
    }

    /// Element-wise difference; shapes must be identical.
    pub fn try_sub(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        self.check_same_shape("sub", rhs)?;
        Ok(Matrix(&self.0 - &rhs.0))
    }

    /// Matrix product; `self.cols()` must equal `rhs.rows()`.
    pub fn try_mul(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        if self.cols() != rhs.rows() {
            return Err(MatrixError::ShapeMismatch {
                op: "mul",
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }
        Ok(Matrix(&self.0 * &rhs.0))
    }

    pub fn scaled(&self, factor: f64) -> Matrix {
        Matrix(&self.0 * factor)
    }

    pub fn transposed(&self) -> Matrix {
        Matrix(self.0.transpose())
    }

    /// Inverse of a square matrix.
    ///
    /// LU decomposition with partial pivoting. A pivot whose magnitude falls
    /// below `n · ε · max|aᵢⱼ|` is treated as zero.
    ///
    /// # Returns
    /// The inverse, [`MatrixError::Singular`] for a (numerically) non-invertible
    /// input, or [`MatrixError::ShapeMismatch`] for a non-square one
    ///
    pub fn inversed(&self) -> Result<Matrix, MatrixError> {
        let (rows, cols) = self.shape();
        if rows != cols {
            return Err(MatrixError::ShapeMismatch {
                op: "inverse",
                lhs: (rows, cols),
                rhs: (cols, rows),
            });
        }
        if rows == 0 {
            return Ok(self.clone());
        }

        let scale = self.0.amax();
        if !scale.is_finite() || scale == 0.0 {
            return Err(MatrixError::Singular);
        }
        let tolerance = rows as f64 * f64::EPSILON * scale;

        let lu = self.0.clone().lu();
        if lu.u().diagonal().iter().any(|p| p.abs() <= tolerance) {
            return Err(MatrixError::Singular);
        }
        lu.try_inverse().map(Matrix).ok_or(MatrixError::Singular)
    }

    /// Stacks `other` below `self`; column counts must match.
    pub fn vstack(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        if self.cols() != other.cols() {
            return Err(MatrixError::ShapeMismatch {
                op: "vstack",
                lhs: self.shape(),
                rhs: other.shape(),
            });
        }
        let top = self.rows();
        Ok(Matrix(DMatrix::from_fn(
            top + other.rows(),
            self.cols(),
            |i, j| {
                if i < top {
                    self.0[(i, j)]
                } else {
                    other.0[(i - top, j)]
                }
            },
        )))
    }

    /// Frobenius norm; the Euclidean norm for a column vector.
    pub fn norm(&self) -> f64 {
        self.0.norm()
    }

    /// Copy scaled to unit norm.
    ///
    /// The elements are divided by `max|aᵢ|` before the norm is taken, so large
    /// finite inputs do not overflow. Non-finite elements, or a norm at or below
    /// `ε`, give [`MatrixError::DegenerateNormalization`].
    pub fn normalized(&self) -> Result<Matrix, MatrixError> {
        if !self.is_finite() {
            return Err(MatrixError::DegenerateNormalization);
        }
        let scale = self.0.amax();
        if scale == 0.0 {
            return Err(MatrixError::DegenerateNormalization);
        }
        let unit_scaled = Matrix(self.0.map(|v| v / scale));
        let rel_norm = unit_scaled.norm();
        if scale * rel_norm <= f64::EPSILON {
            return Err(MatrixError::DegenerateNormalization);
        }
        Ok(unit_scaled.scaled(1.0 / rel_norm))
    }

    /// Whether every element is finite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Row-major copy of the elements as nested arrays.
    ///
    /// # Panics
    /// If the shape is not `R×C`.
    pub fn to_array<const R: usize, const C: usize>(&self) -> [[f64; C]; R] {
        assert_eq!(self.shape(), (R, C), "ShapeMismatch: to_array");
        let mut out = [[0.0; C]; R];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = self.0[(i, j)];
            }
        }
        out
    }

    fn check_same_shape(&self, op: &'static str, rhs: &Matrix) -> Result<(), MatrixError> {
        if self.shape() != rhs.shape() {
            return Err(MatrixError::ShapeMismatch {
                op,
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }
        Ok(())
    }
}

impl From<DMatrix<f64>> for Matrix {
    fn from(m: DMatrix<f64>) -> Self {
        Matrix(m)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        let (rows, cols) = self.shape();
        if row >= rows || col >= cols {
            panic!(
                "{}",
                MatrixError::IndexOutOfBounds {
                    row,
                    col,
                    rows,
                    cols
                }
            );
        }
        &self.0[(row, col)]
    }
}

// Operators panic on non-conformant shapes; use the `try_*` forms to recover.
macro_rules! checked_binop {
    ($trait:ident, $method:ident, $checked:ident) => {
        impl $trait<&Matrix> for &Matrix {
            type Output = Matrix;

            fn $method(self, rhs: &Matrix) -> Matrix {
                match self.$checked(rhs) {
                    Ok(m) => m,
                    Err(e) => panic!("{e}"),
                }
            }
        }

        impl $trait<Matrix> for Matrix {
            type Output = Matrix;

            fn $method(self, rhs: Matrix) -> Matrix {
                (&self).$method(&rhs)
            }
        }

        impl $trait<&Matrix> for Matrix {
            type Output = Matrix;

            fn $method(self, rhs: &Matrix) -> Matrix {
                (&self).$method(rhs)
            }
        }

        impl $trait<Matrix> for &Matrix {
            type Output = Matrix;

            fn $method(self, rhs: Matrix) -> Matrix {
                self.$method(&rhs)
            }
        }
    };
}

checked_binop!(Add, add, try_add);
checked_binop!(Sub, sub, try_sub);
checked_binop!(Mul, mul, try_mul);

impl Mul<f64> for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: f64) -> Matrix {
        self.scaled(rhs)
    }
}

impl Mul<f64> for Matrix {
    type Output = Matrix;

    fn mul(self, rhs: f64) -> Matrix {
        self.scaled(rhs)
    }
}

impl Mul<&Matrix> for f64 {
    type Output = Matrix;

    fn mul(self, rhs: &Matrix) -> Matrix {
        rhs.scaled(self)
    }
}

impl Mul<Matrix> for f64 {
    type Output = Matrix;

    fn mul(self, rhs: Matrix) -> Matrix {
        rhs.scaled(self)
    }
}

impl AbsDiffEq for Matrix {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.shape() == other.shape() && self.0.abs_diff_eq(&other.0, epsilon)
    }
}

impl RelativeEq for Matrix {
    fn default_max_relative() -> f64 {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: f64, max_relative: f64) -> bool {
        self.shape() == other.shape() && self.0.relative_eq(&other.0, epsilon, max_relative)
    }
}
