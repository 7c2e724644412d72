//! Finite difference methods for numerical differentiation.
//!
//! Forward differences for the residual Jacobian (one extra evaluation per
//! parameter, good enough inside the damped iteration) and central
//! differences for the Hessian of the scalar objective, where accuracy
//! matters because the curvature feeds the covariance estimate directly.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::problem::Problem;

/// Default relative step for first derivatives.
const JACOBIAN_EPSILON: f64 = 1e-8;

/// Default relative step for second derivatives. Larger than the first-order
/// step: the truncation/rounding tradeoff for central second differences sits
/// near the cube root of machine epsilon.
const HESSIAN_EPSILON: f64 = 1e-5;

/// Step size adapted to the parameter scale.
#[inline]
fn scaled_step(value: f64, eps: f64) -> f64 {
    if value.abs() > eps {
        value.abs() * eps
    } else {
        eps
    }
}

/// Compute the Jacobian matrix `J[i,j] = d residual[i] / d param[j]` using
/// forward finite differences.
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(JACOBIAN_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let residuals = problem.eval(params)?;
    if residuals.len() != n_residuals {
        return Err(FitError::DimensionMismatch(format!(
            "expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }

    let mut jac = Array2::zeros((n_residuals, n_params));
    for j in 0..n_params {
        let eps_j = scaled_step(params[j], eps);
        let mut perturbed = params.clone();
        perturbed[j] += eps_j;

        let residuals_perturbed = problem.eval(&perturbed)?;
        for i in 0..n_residuals {
            jac[[i, j]] = (residuals_perturbed[i] - residuals[i]) / eps_j;
        }
    }

    Ok(jac)
}

/// Compute the Hessian `H[i,j] = d^2 f / d param[i] d param[j]` of a scalar
/// function using central finite differences. The result is symmetrized.
pub fn hessian<F>(f: F, params: &Array1<f64>, epsilon: Option<f64>) -> Result<Array2<f64>>
where
    F: Fn(&Array1<f64>) -> Result<f64>,
{
    let eps = epsilon.unwrap_or(HESSIAN_EPSILON);
    let n = params.len();
    let f0 = f(params)?;

    let steps: Vec<f64> = params.iter().map(|&p| scaled_step(p, eps)).collect();
    let mut hess = Array2::zeros((n, n));

    for i in 0..n {
        // Diagonal: (f(+i) - 2 f0 + f(-i)) / e_i^2
        let mut fwd = params.clone();
        fwd[i] += steps[i];
        let mut bwd = params.clone();
        bwd[i] -= steps[i];
        hess[[i, i]] = (f(&fwd)? - 2.0 * f0 + f(&bwd)?) / (steps[i] * steps[i]);

        // Off-diagonal: four-point central formula.
        for j in (i + 1)..n {
            let mut pp = params.clone();
            pp[i] += steps[i];
            pp[j] += steps[j];
            let mut pm = params.clone();
            pm[i] += steps[i];
            pm[j] -= steps[j];
            let mut mp = params.clone();
            mp[i] -= steps[i];
            mp[j] += steps[j];
            let mut mm = params.clone();
            mm[i] -= steps[i];
            mm[j] -= steps[j];

            let value =
                (f(&pp)? - f(&pm)? - f(&mp)? + f(&mm)?) / (4.0 * steps[i] * steps[j]);
            hess[[i, j]] = value;
            hess[[j, i]] = value;
        }
    }

    Ok(hess)
}
