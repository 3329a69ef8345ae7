//! Dense linear algebra helpers for the filter, smoother and M-step.
//!
//! Model matrices are stored as `ndarray` arrays. Factorisations
//! (Cholesky, symmetric eigendecomposition) go through `nalgebra`; the
//! conversions are cheap at the state and observation sizes of a yield
//! curve model (n = 3, m ≈ 10).

use nalgebra::{Cholesky, DMatrix, DVector, Dyn, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Cholesky factorisation of a symmetric positive definite matrix.
pub(crate) struct Spd {
    chol: Cholesky<f64, Dyn>,
}

impl Spd {
    /// Factorises `a`, or returns `None` if it is not positive definite.
    pub(crate) fn factor(a: &Array2<f64>) -> Option<Self> {
        if a.iter().any(|x| !x.is_finite()) {
            return None;
        }
        to_dmatrix(a.view()).cholesky().map(|chol| Self { chol })
    }

    /// Solves `A·X = B` for `X`.
    pub(crate) fn solve(&self, b: &Array2<f64>) -> Array2<f64> {
        from_dmatrix(&self.chol.solve(&to_dmatrix(b.view())))
    }

    /// Solves `A·x = b` for `x`.
    pub(crate) fn solve_vec(&self, b: &Array1<f64>) -> Array1<f64> {
        let rhs = DVector::from_iterator(b.len(), b.iter().copied());
        let x = self.chol.solve(&rhs);
        Array1::from_iter(x.iter().copied())
    }

    /// Natural log of the determinant, `2·Σ ln Lᵢᵢ`.
    pub(crate) fn ln_det(&self) -> f64 {
        let l = self.chol.l_dirty();
        2.0 * (0..l.nrows()).map(|i| l[(i, i)].ln()).sum::<f64>()
    }
}

pub(crate) fn to_dmatrix(a: ArrayView2<'_, f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

pub(crate) fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Returns `(A + Aᵀ) / 2`.
pub(crate) fn symmetrize(a: &Array2<f64>) -> Array2<f64> {
    (a + &a.t()) * 0.5
}

/// Largest absolute entry of `A − Aᵀ`.
pub(crate) fn asymmetry(a: &Array2<f64>) -> f64 {
    let (rows, cols) = a.dim();
    let mut worst = 0.0_f64;
    for i in 0..rows {
        for j in (i + 1)..cols {
            worst = worst.max((a[[i, j]] - a[[j, i]]).abs());
        }
    }
    worst
}

/// Largest absolute entry, floored at 1 so it can scale absolute tolerances.
pub(crate) fn scale(a: &Array2<f64>) -> f64 {
    a.iter().fold(1.0_f64, |acc, x| acc.max(x.abs()))
}

/// Smallest eigenvalue of the symmetric part of `a`.
pub(crate) fn min_eigenvalue(a: &Array2<f64>) -> f64 {
    let eig = SymmetricEigen::new(to_dmatrix(symmetrize(a).view()));
    eig.eigenvalues.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Nearest positive semi-definite matrix in Frobenius norm: the symmetric
/// part with its negative eigenvalues set to zero.
pub(crate) fn clamp_psd(a: &Array2<f64>) -> Array2<f64> {
    let eig = SymmetricEigen::new(to_dmatrix(symmetrize(a).view()));
    let clipped = eig.eigenvalues.map(|l| l.max(0.0));
    let v = &eig.eigenvectors;
    let rebuilt = v * DMatrix::from_diagonal(&clipped) * v.transpose();
    symmetrize(&from_dmatrix(&rebuilt))
}

/// Returns `L` with `L·Lᵀ = A` for a positive semi-definite `A`.
///
/// Uses the eigendecomposition rather than Cholesky so that singular
/// (including all-zero) covariances are accepted.
pub(crate) fn psd_sqrt(a: &Array2<f64>) -> Array2<f64> {
    let eig = SymmetricEigen::new(to_dmatrix(symmetrize(a).view()));
    let roots = eig.eigenvalues.map(|l| l.max(0.0).sqrt());
    from_dmatrix(&(&eig.eigenvectors * DMatrix::from_diagonal(&roots)))
}

/// Sub-matrix with the given rows and columns.
pub(crate) fn select(a: &Array2<f64>, rows: &[usize], cols: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), cols.len()), |(i, j)| a[[rows[i], cols[j]]])
}

/// Rows of `a` with the given indices, all columns kept.
pub(crate) fn select_rows(a: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), a.ncols()), |(i, j)| a[[rows[i], j]])
}

/// Entries of `v` with the given indices.
pub(crate) fn select_vec(v: ArrayView1<'_, f64>, idx: &[usize]) -> Array1<f64> {
    idx.iter().map(|&i| v[i]).collect()
}

/// Outer product `u·vᵀ`.
pub(crate) fn outer(u: &Array1<f64>, v: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((u.len(), v.len()), |(i, j)| u[i] * v[j])
}

/// Returns `true` if `a` is square, symmetric and positive semi-definite
/// within `tol` (scaled by the magnitude of `a`).
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use yieldkf_ssm::is_positive_semidefinite;
///
/// assert!(is_positive_semidefinite(&array![[2.0, 1.0], [1.0, 2.0]], 1e-12));
/// assert!(!is_positive_semidefinite(&array![[1.0, 2.0], [2.0, 1.0]], 1e-12));
/// ```
pub fn is_positive_semidefinite(a: &Array2<f64>, tol: f64) -> bool {
    if !a.is_square() || a.iter().any(|x| !x.is_finite()) {
        return false;
    }
    let s = scale(a);
    asymmetry(a) <= tol * s && min_eigenvalue(a) >= -tol * s
}
