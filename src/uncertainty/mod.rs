//! Parameter and prediction uncertainty.
//!
//! Two interchangeable strategies quantify confidence in a fitted parameter
//! vector: bootstrap resampling (refit many times on resampled data) and an
//! asymptotic Fisher-information approach (numeric Hessian of the objective
//! inverted to a covariance matrix). Both produce the same
//! [`UncertaintyEstimate`] shape so the orchestrator can treat them
//! uniformly.

pub mod bootstrap;
pub mod fisher;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::residual::BindingProblem;

pub use bootstrap::BootstrapConfig;

/// Strategy used to quantify parameter uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UncertaintyMethod {
    /// Asymptotic standard errors from the inverted Hessian.
    #[default]
    FisherInformation,
    /// Resample-and-refit bootstrap with a pointwise prediction interval.
    Bootstrap,
}

/// Pointwise 95% prediction interval over the evaluation grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionBand {
    /// 2.5th percentile of the replicate predictions per grid point.
    pub lower: Vec<f64>,
    /// 97.5th percentile of the replicate predictions per grid point.
    pub upper: Vec<f64>,
}

/// Common output of both uncertainty strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncertaintyEstimate {
    /// Per-parameter uncertainty in flat parameter order: standard deviation
    /// across bootstrap replicates, or asymptotic standard error.
    pub parameter_errors: Vec<f64>,

    /// Prediction interval over the evaluation grid. Only the bootstrap
    /// produces one.
    pub band: Option<PredictionBand>,

    /// Non-fatal caveats attached to an otherwise successful estimate.
    pub warnings: Vec<String>,
}

/// Run the selected uncertainty strategy at the fitted optimum.
///
/// # Arguments
///
/// * `method` - Which strategy to run
/// * `problem` - The fitted problem (model, weighting, original dataset)
/// * `best` - The global best-fit parameters, canonically ordered
/// * `x_eval` - Evaluation grid for the prediction interval
/// * `bootstrap_config` - Settings for the bootstrap strategy
/// * `cancel` - Optional cancellation token
pub fn estimate(
    method: UncertaintyMethod,
    problem: &BindingProblem<'_>,
    best: &Array1<f64>,
    x_eval: &[f64],
    bootstrap_config: &BootstrapConfig,
    cancel: Option<&CancelToken>,
) -> Result<UncertaintyEstimate> {
    match method {
        UncertaintyMethod::FisherInformation => fisher::estimate(problem, best),
        UncertaintyMethod::Bootstrap => {
            bootstrap::estimate(problem, best, x_eval, bootstrap_config, cancel)
        }
    }
}
