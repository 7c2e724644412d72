//! Least-squares problem trait.
//!
//! [`Problem`] is the seam between the binding-specific residual evaluation
//! and the generic optimization machinery: the local minimizer, the numeric
//! differentiation utilities, and the uncertainty estimators all work against
//! this trait.

use ndarray::Array1;

use crate::error::Result;

/// A nonlinear least squares problem.
pub trait Problem {
    /// Evaluate the residual vector at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the residuals
    ///
    /// # Returns
    ///
    /// * A vector of residuals, or an error if the evaluation fails
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the objective (sum of squared residuals) at the given
    /// parameters.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}
