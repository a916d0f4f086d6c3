//! Design-matrix primitives for the scoring engine.
//!
//! The factorization-machine interaction identity only ever needs two
//! products from a feature matrix: the plain matrix-vector product `X·v`
//! and the squared form `Σ_j X[i,j]²·v[j]²` that corrects for self-pairs.
//! Both live behind [`DesignMatrix`] so the engine is written once and
//! accepts dense (`ndarray::Array2`) and CSR-sparse ([`CsrMatrix`]) inputs
//! interchangeably.

use ndarray::linalg::general_mat_vec_mul;
use ndarray::{Array2, ArrayView1, ArrayViewMut1, Zip};
use thiserror::Error;

use crate::types::Real;

/// Structural failures when assembling a [`CsrMatrix`] from raw parts.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MatrixError {
    #[error("indptr must have n_rows + 1 = {expected} entries, got {actual}")]
    IndptrLength { expected: usize, actual: usize },

    #[error("indptr must start at 0 and be non-decreasing; entry {row} is {value} after {previous}")]
    IndptrNotMonotone {
        row: usize,
        value: usize,
        previous: usize,
    },

    #[error("indices ({indices}) and values ({values}) must have equal length")]
    StorageLengthMismatch { indices: usize, values: usize },

    #[error("final indptr entry {expected} does not match stored entry count {actual}")]
    StorageLength { expected: usize, actual: usize },

    #[error("column index {index} out of range for {n_cols} columns")]
    ColumnOutOfRange { index: usize, n_cols: usize },
}

/// A read-only, case-major feature matrix as consumed by the scoring engine.
pub trait DesignMatrix<R: Real> {
    fn n_rows(&self) -> usize;

    fn n_cols(&self) -> usize;

    /// Overwrites `out` with `X·v`.
    ///
    /// `v` must have length [`n_cols`](Self::n_cols) and `out` length
    /// [`n_rows`](Self::n_rows).
    fn matvec_into(&self, v: ArrayView1<R>, out: ArrayViewMut1<R>);

    /// Overwrites `out` with `Σ_j X[i,j]²·v[j]²`, the self-pair correction
    /// term of the interaction identity. Same shape contract as
    /// [`matvec_into`](Self::matvec_into).
    fn squared_matvec_into(&self, v: ArrayView1<R>, out: ArrayViewMut1<R>);
}

impl<R: Real> DesignMatrix<R> for Array2<R> {
    fn n_rows(&self) -> usize {
        self.nrows()
    }

    fn n_cols(&self) -> usize {
        self.ncols()
    }

    fn matvec_into(&self, v: ArrayView1<R>, mut out: ArrayViewMut1<R>) {
        general_mat_vec_mul(R::one(), self, &v, R::zero(), &mut out);
    }

    fn squared_matvec_into(&self, v: ArrayView1<R>, out: ArrayViewMut1<R>) {
        Zip::from(out).and(self.rows()).for_each(|acc, row| {
            *acc = row
                .iter()
                .zip(v.iter())
                .map(|(&x, &vj)| x * x * vj * vj)
                .sum();
        });
    }
}

/// Compressed sparse row matrix over the crate's [`Real`] scalar.
///
/// The storage layout is the conventional `indptr`/`indices`/`values`
/// triple; construction validates the structure once so the product loops
/// can stay branch-free.
#[derive(Debug, Clone)]
pub struct CsrMatrix<R> {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<R>,
}

impl<R: Real> CsrMatrix<R> {
    /// Builds a CSR matrix from raw parts, validating the structure.
    pub fn new(
        n_rows: usize,
        n_cols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        values: Vec<R>,
    ) -> Result<Self, MatrixError> {
        if indptr.len() != n_rows + 1 {
            return Err(MatrixError::IndptrLength {
                expected: n_rows + 1,
                actual: indptr.len(),
            });
        }
        if indptr[0] != 0 {
            return Err(MatrixError::IndptrNotMonotone {
                row: 0,
                value: indptr[0],
                previous: 0,
            });
        }
        for row in 1..indptr.len() {
            if indptr[row] < indptr[row - 1] {
                return Err(MatrixError::IndptrNotMonotone {
                    row,
                    value: indptr[row],
                    previous: indptr[row - 1],
                });
            }
        }
        if indices.len() != values.len() {
            return Err(MatrixError::StorageLengthMismatch {
                indices: indices.len(),
                values: values.len(),
            });
        }
        if indices.len() != indptr[n_rows] {
            return Err(MatrixError::StorageLength {
                expected: indptr[n_rows],
                actual: indices.len(),
            });
        }
        if let Some(&index) = indices.iter().find(|&&j| j >= n_cols) {
            return Err(MatrixError::ColumnOutOfRange { index, n_cols });
        }
        Ok(Self {
            n_rows,
            n_cols,
            indptr,
            indices,
            values,
        })
    }

    /// Converts a dense matrix, dropping explicit zeros from the storage.
    pub fn from_dense(dense: &Array2<R>) -> Self {
        let mut indptr = Vec::with_capacity(dense.nrows() + 1);
        indptr.push(0);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for row in dense.rows() {
            for (j, &x) in row.iter().enumerate() {
                if x != R::zero() {
                    indices.push(j);
                    values.push(x);
                }
            }
            indptr.push(indices.len());
        }
        Self {
            n_rows: dense.nrows(),
            n_cols: dense.ncols(),
            indptr,
            indices,
            values,
        }
    }

    /// Number of explicitly stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

impl<R: Real> DesignMatrix<R> for CsrMatrix<R> {
    fn n_rows(&self) -> usize {
        self.n_rows
    }

    fn n_cols(&self) -> usize {
        self.n_cols
    }

    fn matvec_into(&self, v: ArrayView1<R>, mut out: ArrayViewMut1<R>) {
        for i in 0..self.n_rows {
            let (lo, hi) = (self.indptr[i], self.indptr[i + 1]);
            let mut acc = R::zero();
            for (&j, &x) in self.indices[lo..hi].iter().zip(&self.values[lo..hi]) {
                acc += x * v[j];
            }
            out[i] = acc;
        }
    }

    fn squared_matvec_into(&self, v: ArrayView1<R>, mut out: ArrayViewMut1<R>) {
        for i in 0..self.n_rows {
            let (lo, hi) = (self.indptr[i], self.indptr[i + 1]);
            let mut acc = R::zero();
            for (&j, &x) in self.indices[lo..hi].iter().zip(&self.values[lo..hi]) {
                acc += x * x * v[j] * v[j];
            }
            out[i] = acc;
        }
    }
}
