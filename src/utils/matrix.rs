//! Dense linear algebra for the small matrices this crate handles.
//!
//! Parameter counts never exceed six, so a pivoted Gauss-Jordan inverse and a
//! cyclic Jacobi eigenvalue sweep are both simpler and faster here than
//! pulling in a decomposition backend.

use ndarray::Array2;

use crate::error::{FitError, Result};

/// Invert a square matrix by Gauss-Jordan elimination with partial pivoting.
///
/// Returns [`FitError::Numerical`] when a pivot collapses to working
/// precision, which the caller maps to its domain-specific singularity error.
pub fn invert(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(FitError::DimensionMismatch(format!(
            "cannot invert a {}x{} matrix",
            a.nrows(),
            a.ncols()
        )));
    }

    // Augmented [A | I], reduced in place.
    let mut work = a.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        // Partial pivot: largest magnitude entry in this column.
        let mut pivot_row = col;
        let mut pivot_mag = work[[col, col]].abs();
        for row in (col + 1)..n {
            let mag = work[[row, col]].abs();
            if mag > pivot_mag {
                pivot_row = row;
                pivot_mag = mag;
            }
        }
        if pivot_mag < 1e-300 || !pivot_mag.is_finite() {
            return Err(FitError::Numerical(
                "matrix is singular to working precision".to_string(),
            ));
        }
        if pivot_row != col {
            for k in 0..n {
                work.swap([col, k], [pivot_row, k]);
                inv.swap([col, k], [pivot_row, k]);
            }
        }

        let pivot = work[[col, col]];
        for k in 0..n {
            work[[col, k]] /= pivot;
            inv[[col, k]] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = work[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                work[[row, k]] -= factor * work[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }

    Ok(inv)
}

/// Eigenvalues of a symmetric matrix by cyclic Jacobi rotations.
///
/// Convergence is quadratic and a handful of sweeps suffices for the 2x2 to
/// 6x6 Hessians seen here.
pub fn symmetric_eigenvalues(a: &Array2<f64>) -> Vec<f64> {
    let n = a.nrows();
    let mut m = a.clone();

    for _sweep in 0..50 {
        let mut off_diag = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                off_diag += m[[i, j]].abs();
            }
        }
        if off_diag == 0.0 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if m[[p, q]].abs() < 1e-300 {
                    continue;
                }
                let theta = (m[[q, q]] - m[[p, p]]) / (2.0 * m[[p, q]]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                // Apply the rotation on both sides.
                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
            }
        }
    }

    (0..n).map(|i| m[[i, i]]).collect()
}

/// Condition number estimate from the eigenvalue spread of a symmetric
/// matrix. Returns infinity when the smallest eigenvalue magnitude vanishes.
pub fn symmetric_condition_number(a: &Array2<f64>) -> f64 {
    let eigs = symmetric_eigenvalues(a);
    let max = eigs.iter().fold(0.0f64, |acc, &e| acc.max(e.abs()));
    let min = eigs.iter().fold(f64::INFINITY, |acc, &e| acc.min(e.abs()));
    if min == 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}
