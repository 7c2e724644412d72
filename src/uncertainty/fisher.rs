//! Fisher-information (Hessian) uncertainty estimation.
//!
//! The numeric Hessian of the weighted objective at the optimum, inverted and
//! scaled by the residual variance, gives asymptotic standard errors per
//! parameter. A singular Hessian means the model is overparameterized for the
//! data and the estimate fails hard; an ill-conditioned but invertible
//! Hessian succeeds with an explicit "do not trust" warning attached.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::problem::Problem;
use crate::residual::BindingProblem;
use crate::uncertainty::UncertaintyEstimate;
use crate::utils::{finite_difference, matrix};

/// Eigenvalue-ratio threshold beyond which error estimates are flagged as
/// unreliable.
const CONDITION_LIMIT: f64 = 1e8;

/// Estimate asymptotic standard errors at the best-fit parameters.
pub fn estimate(problem: &BindingProblem<'_>, best: &Array1<f64>) -> Result<UncertaintyEstimate> {
    let n_data = problem.residual_count();
    let n_params = problem.parameter_count();
    if n_data <= n_params {
        return Err(FitError::InvalidInput(format!(
            "Fisher-information errors need more data points ({}) than parameters ({})",
            n_data, n_params
        )));
    }
    let dof = (n_data - n_params) as f64;

    let ssr = problem.eval_cost(best)?;
    let hessian = finite_difference::hessian(|p| problem.eval_cost(p), best, None)?;
    let (errors, warnings) = standard_errors(&hessian, ssr / dof)?;

    Ok(UncertaintyEstimate {
        parameter_errors: errors,
        band: None,
        warnings,
    })
}

/// Invert the objective Hessian into per-parameter standard errors.
///
/// `scale` is the residual variance `ssr / dof` applied to the covariance
/// diagonal. Fails hard when the Hessian cannot be inverted or the inversion
/// yields a negative variance; an ill-conditioned but invertible Hessian
/// succeeds with a warning attached.
fn standard_errors(hessian: &Array2<f64>, scale: f64) -> Result<(Vec<f64>, Vec<String>)> {
    let covariance = matrix::invert(hessian).map_err(|_| {
        FitError::SingularHessian(
            "the Hessian could not be inverted; the problem is likely ill-posed, \
             try a less flexible model with fewer free parameters"
                .to_string(),
        )
    })?;

    let n = hessian.nrows();
    let mut errors = Vec::with_capacity(n);
    for i in 0..n {
        let variance = covariance[[i, i]] * scale;
        if variance < 0.0 {
            return Err(FitError::SingularHessian(
                "covariance inversion produced negative variances; the model is likely \
                 overparameterized for this data"
                    .to_string(),
            ));
        }
        errors.push(variance.sqrt());
    }

    let mut warnings = Vec::new();
    let condition = matrix::symmetric_condition_number(hessian);
    if condition > CONDITION_LIMIT {
        let warning = format!(
            "the Hessian is ill-conditioned (eigenvalue ratio {:.2e}); error estimates \
             may not be reliable and the problem is likely ill-posed; do not trust this result",
            condition
        );
        log::warn!("{}", warning);
        warnings.push(warning);
    }

    Ok((errors, warnings))
}

/// Akaike Information Criterion with small-sample correction:
/// `AIC = ssr + 2k + 2k(k+1) / (n - k - 1)`.
///
/// Returns infinity when the correction denominator is non-positive, i.e.
/// when the dataset barely covers the parameter count.
pub fn corrected_aic(ssr: f64, n_data: usize, n_params: usize) -> f64 {
    let k = n_params as f64;
    let denom = n_data as f64 - k - 1.0;
    if denom <= 0.0 {
        return f64::INFINITY;
    }
    ssr + 2.0 * k + 2.0 * k * (k + 1.0) / denom
}
