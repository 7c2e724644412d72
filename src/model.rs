//! The binding model orchestrator.
//!
//! [`BindingModel`] holds the model configuration (site count, weighting
//! scheme, uncertainty method), sequences the fit pipeline (multi-start
//! optimization, then uncertainty estimation, then the dense prediction
//! curve), and owns the resulting [`FitResult`]. It follows the state machine
//! `Unfitted -> Fitting -> {Fitted, FitFailed}`; a refit passes through
//! `Fitting` again and replaces the result wholesale, and a cancelled fit
//! publishes nothing.

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::data::{log_spaced_range, BindingData, LOG_GRID_STEP};
use crate::equilibrium::{solve_free, BindingSites};
use crate::error::{FitError, Result};
use crate::optimize::{MultiStartConfig, MultiStartOptimizer};
use crate::residual::{BindingProblem, Weighting};
use crate::uncertainty::{self, BootstrapConfig, UncertaintyMethod};

/// One binding site's fitted values (or their uncertainties).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteValues {
    /// Dissociation constant.
    pub kd: f64,
    /// Total binding-site concentration.
    pub p: f64,
}

/// A fixed-size, named parameter vector: one (kd, p) pair per site, in
/// canonical order (ascending kd).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    sites: Vec<SiteValues>,
}

impl ParameterSet {
    /// Build from a flat vector `[kd1, p1, kd2, p2, ...]`.
    pub fn from_flat(values: &[f64]) -> Self {
        let sites = values
            .chunks_exact(2)
            .map(|pair| SiteValues {
                kd: pair[0],
                p: pair[1],
            })
            .collect();
        Self { sites }
    }

    /// The per-site values.
    pub fn sites(&self) -> &[SiteValues] {
        &self.sites
    }

    /// Flat vector `[kd1, p1, kd2, p2, ...]`.
    pub fn to_flat(&self) -> Vec<f64> {
        self.sites.iter().flat_map(|s| [s.kd, s.p]).collect()
    }

    /// Named values in flat order, for rendering: `kd1, p1, kd2, p2, ...`.
    pub fn named(&self) -> Vec<(String, f64)> {
        self.sites
            .iter()
            .enumerate()
            .flat_map(|(i, s)| {
                [
                    (format!("kd{}", i + 1), s.kd),
                    (format!("p{}", i + 1), s.p),
                ]
            })
            .collect()
    }
}

/// Dense prediction curve over a log-spaced grid, with an optional
/// pointwise confidence band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionCurve {
    /// Evaluation grid (log-spaced over the data range).
    pub x: Vec<f64>,
    /// Best-fit free concentration at each grid point.
    pub y: Vec<f64>,
    /// Lower 95% band, when the uncertainty method produces one.
    pub lower: Option<Vec<f64>>,
    /// Upper 95% band, when the uncertainty method produces one.
    pub upper: Option<Vec<f64>>,
}

/// The outcome of one successful fit. Immutable once published; a refit
/// replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Best-fit parameters in canonical site order.
    pub parameters: ParameterSet,

    /// Per-parameter uncertainty, shaped like the parameters: bootstrap
    /// standard deviation or asymptotic standard error.
    pub parameter_errors: ParameterSet,

    /// Weighted sum-of-squared-residuals at the optimum.
    pub objective: f64,

    /// Akaike Information Criterion with small-sample correction.
    pub aic: f64,

    /// Dense curve for plotting and export.
    pub curve: PredictionCurve,

    /// Non-fatal caveats (ill-conditioning, dropped bootstrap replicates).
    pub warnings: Vec<String>,
}

impl FitResult {
    /// Serialize for opaque persistence by the caller.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a previously persisted result.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Fit lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FitState {
    /// No fit has been run.
    #[default]
    Unfitted,
    /// A fit is in progress.
    Fitting,
    /// The last fit succeeded and a result is available.
    Fitted,
    /// The last fit failed; the payload is the reason.
    FitFailed(String),
}

/// Orchestrator owning configuration, state, and the current fit result.
#[derive(Debug, Clone, Default)]
pub struct BindingModel {
    sites: BindingSites,
    weighting: Weighting,
    uncertainty: UncertaintyMethod,
    multistart: MultiStartConfig,
    bootstrap: BootstrapConfig,
    state: FitState,
    result: Option<FitResult>,
}

impl BindingModel {
    /// Create a model with the default configuration: one binding site, no
    /// weighting, Fisher-information errors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the model type, weighting scheme, and uncertainty method.
    /// Rejected while a fit is in progress.
    pub fn configure(
        &mut self,
        sites: BindingSites,
        weighting: Weighting,
        uncertainty: UncertaintyMethod,
    ) -> Result<()> {
        self.ensure_not_fitting("reconfigure the model")?;
        self.sites = sites;
        self.weighting = weighting;
        self.uncertainty = uncertainty;
        Ok(())
    }

    /// Override the multi-start search settings (start count, ranges, seed).
    pub fn set_multistart_config(&mut self, config: MultiStartConfig) -> Result<()> {
        self.ensure_not_fitting("reconfigure the optimizer")?;
        self.multistart = config;
        Ok(())
    }

    /// Override the bootstrap settings (resample count, seed).
    pub fn set_bootstrap_config(&mut self, config: BootstrapConfig) -> Result<()> {
        self.ensure_not_fitting("reconfigure the bootstrap")?;
        self.bootstrap = config;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &FitState {
        &self.state
    }

    /// The current fit result, if the model is fitted.
    pub fn result(&self) -> Option<&FitResult> {
        self.result.as_ref()
    }

    /// Fit the model to a dataset.
    pub fn fit(&mut self, data: &BindingData) -> Result<&FitResult> {
        self.fit_with_cancel(data, &CancelToken::new())
    }

    /// Fit the model to a dataset with cooperative cancellation.
    ///
    /// On success the model transitions to `Fitted` and the new result
    /// replaces any previous one. On failure it transitions to `FitFailed`
    /// with the reason stored, and any previous result is discarded. On
    /// cancellation nothing is published and the prior state is restored.
    pub fn fit_with_cancel(
        &mut self,
        data: &BindingData,
        cancel: &CancelToken,
    ) -> Result<&FitResult> {
        self.ensure_not_fitting("start a fit")?;
        let prior_state = std::mem::replace(&mut self.state, FitState::Fitting);

        match self.run_fit(data, cancel) {
            Ok(result) => {
                self.state = FitState::Fitted;
                Ok(&*self.result.insert(result))
            }
            Err(FitError::Cancelled) => {
                self.state = prior_state;
                Err(FitError::Cancelled)
            }
            Err(err) => {
                self.result = None;
                self.state = FitState::FitFailed(err.to_string());
                Err(err)
            }
        }
    }

    /// Predict free concentrations for new total concentrations, as needed
    /// by downstream pharmacokinetic calculations. Valid only in `Fitted`.
    pub fn predict(&self, totals: &[f64]) -> Result<Vec<f64>> {
        let result = match (&self.state, &self.result) {
            (FitState::Fitted, Some(result)) => result,
            _ => {
                return Err(FitError::InvalidState(
                    "no fitted model; fit or load a model before running predictions".to_string(),
                ))
            }
        };
        for (i, &t) in totals.iter().enumerate() {
            if !t.is_finite() || t < 0.0 {
                return Err(FitError::InvalidInput(format!(
                    "total concentration at row {} must be a non-negative number (got {})",
                    i, t
                )));
            }
        }
        solve_free(self.sites, &result.parameters.to_flat(), totals)
    }

    fn ensure_not_fitting(&self, action: &str) -> Result<()> {
        if self.state == FitState::Fitting {
            return Err(FitError::InvalidState(format!(
                "cannot {} while a fit is in progress",
                action
            )));
        }
        Ok(())
    }

    fn run_fit(&self, data: &BindingData, cancel: &CancelToken) -> Result<FitResult> {
        // Fail fast on the declared-but-unimplemented model instead of deep
        // inside the first objective evaluation.
        if self.sites == BindingSites::Three {
            return Err(FitError::UnsupportedModel(
                "three-binding-site models are not implemented; use a one- or two-site model"
                    .to_string(),
            ));
        }

        let problem = BindingProblem::new(self.sites, self.weighting, data);
        let optimizer = MultiStartOptimizer::new(self.multistart.clone());
        let global = optimizer.fit(&problem, Some(cancel))?;
        cancel.check()?;

        let (x_min, x_max) = data.x_range();
        let grid = log_spaced_range(x_min, x_max, LOG_GRID_STEP);

        let estimate = uncertainty::estimate(
            self.uncertainty,
            &problem,
            &global.params,
            &grid,
            &self.bootstrap,
            Some(cancel),
        )?;
        cancel.check()?;

        let aic =
            crate::uncertainty::fisher::corrected_aic(global.cost, data.len(), global.params.len());

        let y = solve_free(self.sites, &global.params.to_vec(), &grid)?;
        let (lower, upper) = match estimate.band {
            Some(band) => (Some(band.lower), Some(band.upper)),
            None => (None, None),
        };

        Ok(FitResult {
            parameters: ParameterSet::from_flat(&global.params.to_vec()),
            parameter_errors: ParameterSet::from_flat(&estimate.parameter_errors),
            objective: global.cost,
            aic,
            curve: PredictionCurve {
                x: grid,
                y,
                lower,
                upper,
            },
            warnings: estimate.warnings,
        })
    }
}

/// Convenience: fit a given configuration to data in one call.
///
/// # Arguments
///
/// * `sites` - One- or two-site model
/// * `weighting` - Residual weighting scheme
/// * `uncertainty` - Error estimation strategy
/// * `data` - The dataset to fit
pub fn fit_binding_model(
    sites: BindingSites,
    weighting: Weighting,
    uncertainty: UncertaintyMethod,
    data: &BindingData,
) -> Result<FitResult> {
    let mut model = BindingModel::new();
    model.configure(sites, weighting, uncertainty)?;
    model.fit(data)?;
    // The result was just stored by a successful fit.
    model
        .result
        .ok_or_else(|| FitError::InvalidState("fit completed without a result".to_string()))
}
