//! Bounded local minimizer.
//!
//! A Levenberg-Marquardt iteration over the weighted residual vector, with
//! every parameter clamped to a positive lower bound after each step. The
//! equilibrium solvers and the weighting schemes are undefined for
//! non-positive parameters, so the feasible region is the open positive
//! orthant approached from a small epsilon. Each run carries an iteration
//! budget so one ill-conditioned start cannot stall a multi-start search or a
//! bootstrap replicate.

use ndarray::{Array1, Array2};

use crate::cancel::CancelToken;
use crate::error::{FitError, Result};
use crate::problem::Problem;
use crate::utils::finite_difference;

/// Lower bound applied to every parameter. Dissociation constants and site
/// concentrations are strictly positive quantities.
pub const PARAM_LOWER_BOUND: f64 = 1e-9;

/// Configuration for the local Levenberg-Marquardt minimizer.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Maximum number of accepted iterations. Default: 100
    pub max_iterations: usize,

    /// Tolerance for relative change in cost. Default: 1e-10
    pub ftol: f64,

    /// Tolerance for change in parameter values. Default: 1e-10
    pub xtol: f64,

    /// Tolerance for the gradient norm. Default: 1e-10
    pub gtol: f64,

    /// Initial damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which damping grows/shrinks. Default: 10.0
    pub lambda_factor: f64,

    /// Damping clamp range. Defaults: 1e-12 and 1e12
    pub min_lambda: f64,
    pub max_lambda: f64,

    /// Lower bound for every parameter. Default: [`PARAM_LOWER_BOUND`]
    pub lower_bound: f64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_lambda: 1e-3,
            lambda_factor: 10.0,
            min_lambda: 1e-12,
            max_lambda: 1e12,
            lower_bound: PARAM_LOWER_BOUND,
        }
    }
}

/// Result of one local minimization run.
#[derive(Debug, Clone)]
pub struct LocalFitResult {
    /// Parameter values at termination.
    pub params: Array1<f64>,

    /// Sum of squared (weighted) residuals at termination.
    pub cost: f64,

    /// Number of accepted iterations.
    pub iterations: usize,

    /// Whether a convergence criterion was met.
    pub success: bool,

    /// Human-readable termination reason.
    pub message: String,
}

/// The bounded Levenberg-Marquardt minimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LocalConfig,
}

impl LevenbergMarquardt {
    /// Create a minimizer with the given configuration.
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }

    /// Minimize the sum of squared residuals starting from `initial`.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to minimize
    /// * `initial` - Starting parameter values (clamped to the lower bound)
    /// * `cancel` - Optional cancellation token checked once per iteration
    pub fn minimize<P: Problem>(
        &self,
        problem: &P,
        initial: Array1<f64>,
        cancel: Option<&CancelToken>,
    ) -> Result<LocalFitResult> {
        let n_params = problem.parameter_count();
        if initial.len() != n_params {
            return Err(FitError::DimensionMismatch(format!(
                "expected {} parameters, got {}",
                n_params,
                initial.len()
            )));
        }

        let mut params = self.clamp(initial);
        let mut lambda = self.config.initial_lambda;

        let mut residuals = problem.eval(&params)?;
        let mut cost: f64 = residuals.iter().map(|r| r.powi(2)).sum();
        let mut iterations = 0;

        loop {
            if let Some(token) = cancel {
                token.check()?;
            }

            let jac = finite_difference::jacobian(problem, &params, None)?;
            let gradient = jac.t().dot(&residuals);
            let gradient_norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            if gradient_norm < self.config.gtol {
                return Ok(LocalFitResult {
                    params,
                    cost,
                    iterations,
                    success: true,
                    message: format!(
                        "gradient convergence: ||g|| = {:.2e} < {:.2e}",
                        gradient_norm, self.config.gtol
                    ),
                });
            }

            let jtj = jac.t().dot(&jac);

            // Inner damping loop: retry with stronger damping until a step
            // both solves and reduces the cost.
            loop {
                let step = match solve_damped(&jtj, &gradient, lambda) {
                    Some(s) => s,
                    None => {
                        lambda = (lambda * self.config.lambda_factor).min(self.config.max_lambda);
                        if lambda >= self.config.max_lambda {
                            return Ok(LocalFitResult {
                                params,
                                cost,
                                iterations,
                                success: false,
                                message: "normal equations unsolvable at maximum damping"
                                    .to_string(),
                            });
                        }
                        continue;
                    }
                };

                let new_params = self.clamp(&params + &step);

                // A trial step can wander where the equilibrium solver has no
                // root; treat that like a cost increase and damp harder.
                let new_residuals = match problem.eval(&new_params) {
                    Ok(r) => r,
                    Err(FitError::Cancelled) => return Err(FitError::Cancelled),
                    Err(_) => {
                        lambda = (lambda * self.config.lambda_factor).min(self.config.max_lambda);
                        if lambda >= self.config.max_lambda {
                            return Ok(LocalFitResult {
                                params,
                                cost,
                                iterations,
                                success: false,
                                message: "failed to find an evaluable step at maximum damping"
                                    .to_string(),
                            });
                        }
                        continue;
                    }
                };
                let new_cost: f64 = new_residuals.iter().map(|r| r.powi(2)).sum();

                if new_cost < cost {
                    let param_change = new_params
                        .iter()
                        .zip(params.iter())
                        .map(|(a, b)| (a - b).abs())
                        .fold(0.0f64, f64::max);
                    let cost_change = (cost - new_cost) / cost.max(1e-30);

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda / self.config.lambda_factor).max(self.config.min_lambda);
                    iterations += 1;

                    if param_change < self.config.xtol {
                        return Ok(LocalFitResult {
                            params,
                            cost,
                            iterations,
                            success: true,
                            message: format!(
                                "parameter convergence: max|dx| = {:.2e} < {:.2e}",
                                param_change, self.config.xtol
                            ),
                        });
                    }
                    if cost_change < self.config.ftol {
                        return Ok(LocalFitResult {
                            params,
                            cost,
                            iterations,
                            success: true,
                            message: format!(
                                "cost convergence: |df|/f = {:.2e} < {:.2e}",
                                cost_change, self.config.ftol
                            ),
                        });
                    }
                    if iterations >= self.config.max_iterations {
                        return Ok(LocalFitResult {
                            params,
                            cost,
                            iterations,
                            success: false,
                            message: format!(
                                "iteration budget ({}) exhausted",
                                self.config.max_iterations
                            ),
                        });
                    }
                    break; // accepted; recompute the Jacobian
                }

                // Step rejected.
                lambda = (lambda * self.config.lambda_factor).min(self.config.max_lambda);
                if lambda >= self.config.max_lambda {
                    return Ok(LocalFitResult {
                        params,
                        cost,
                        iterations,
                        success: false,
                        message: "failed to decrease cost at maximum damping".to_string(),
                    });
                }
            }
        }
    }

    fn clamp(&self, mut params: Array1<f64>) -> Array1<f64> {
        for p in params.iter_mut() {
            if !p.is_finite() || *p < self.config.lower_bound {
                *p = self.config.lower_bound;
            }
        }
        params
    }
}

/// Solve `(JtJ + lambda I) step = -g` by Cholesky decomposition.
///
/// Returns `None` when the damped normal matrix is not positive definite,
/// which the caller handles by increasing the damping.
fn solve_damped(jtj: &Array2<f64>, gradient: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
    let n = jtj.nrows();
    let mut a = jtj.clone();
    for i in 0..n {
        a[[i, i]] += lambda;
    }

    // In-place Cholesky, lower triangle.
    for k in 0..n {
        for j in 0..k {
            let l = a[[k, j]];
            a[[k, k]] -= l * l;
        }
        if a[[k, k]] <= 0.0 || !a[[k, k]].is_finite() {
            return None;
        }
        let diag = a[[k, k]].sqrt();
        a[[k, k]] = diag;
        for i in (k + 1)..n {
            for j in 0..k {
                let prod = a[[i, j]] * a[[k, j]];
                a[[i, k]] -= prod;
            }
            a[[i, k]] /= diag;
        }
    }

    // Forward substitution: L y = -g
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = -gradient[i];
        for j in 0..i {
            sum -= a[[i, j]] * y[j];
        }
        y[i] = sum / a[[i, i]];
    }

    // Backward substitution: L^T step = y
    let mut step = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= a[[j, i]] * step[j];
        }
        step[i] = sum / a[[i, i]];
    }

    Some(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Exponential decay: y = a * exp(-x / tau), residuals against data.
    struct DecayProblem {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl Problem for DecayProblem {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let (a, tau) = (params[0], params[1]);
            Ok(self
                .x
                .iter()
                .zip(self.y.iter())
                .map(|(&x, &y)| a * (-x / tau).exp() - y)
                .collect())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x.len()
        }
    }

    #[test]
    fn test_fits_exponential_decay() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|&x| 5.0 * (-x / 3.0).exp()).collect();
        let problem = DecayProblem { x, y };

        let lm = LevenbergMarquardt::default();
        let result = lm.minimize(&problem, array![1.0, 1.0], None).unwrap();

        assert!(result.success, "{}", result.message);
        assert_relative_eq!(result.params[0], 5.0, max_relative = 1e-4);
        assert_relative_eq!(result.params[1], 3.0, max_relative = 1e-4);
        assert!(result.cost < 1e-8);
    }

    #[test]
    fn test_parameters_stay_above_lower_bound() {
        // Data pulls tau toward zero; the clamp must keep it positive.
        let problem = DecayProblem {
            x: vec![1.0, 2.0, 3.0],
            y: vec![0.0, 0.0, 0.0],
        };
        let lm = LevenbergMarquardt::default();
        let result = lm.minimize(&problem, array![2.0, 0.5], None).unwrap();
        for &p in result.params.iter() {
            assert!(p >= PARAM_LOWER_BOUND);
        }
    }

    #[test]
    fn test_iteration_budget_is_enforced() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.3).collect();
        let y: Vec<f64> = x.iter().map(|&x| 5.0 * (-x / 3.0).exp() + 0.05).collect();
        let problem = DecayProblem { x, y };

        let config = LocalConfig {
            max_iterations: 2,
            ftol: 0.0,
            xtol: 0.0,
            gtol: 0.0,
            ..Default::default()
        };
        let lm = LevenbergMarquardt::new(config);
        let result = lm.minimize(&problem, array![1.0, 1.0], None).unwrap();
        assert!(!result.success);
        assert!(result.iterations <= 2);
        assert!(result.message.contains("budget"));
    }

    #[test]
    fn test_cancellation_stops_minimization() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|&x| 5.0 * (-x / 3.0).exp()).collect();
        let problem = DecayProblem { x, y };

        let token = CancelToken::new();
        token.cancel();
        let lm = LevenbergMarquardt::default();
        let err = lm
            .minimize(&problem, array![1.0, 1.0], Some(&token))
            .unwrap_err();
        assert!(matches!(err, FitError::Cancelled));
    }
}
