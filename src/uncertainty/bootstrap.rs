//! Bootstrap uncertainty estimation.
//!
//! Resample the dataset with replacement to its original size, refit each
//! resample with a single local run seeded from the global best parameters
//! (the resampled surface is close enough to the original basin that a full
//! multi-start is wasted effort), and read parameter uncertainty and a
//! pointwise prediction interval off the replicate distribution. Replicates
//! are independent, so they run in parallel; the aggregation sorts
//! explicitly, making the result independent of completion order.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::error::{FitError, Result};
use crate::equilibrium::solve_free;
use crate::optimize::local::{LevenbergMarquardt, LocalConfig};
use crate::optimize::multistart::canonical_site_order;
use crate::residual::BindingProblem;
use crate::uncertainty::{PredictionBand, UncertaintyEstimate};

/// Configuration for bootstrap resampling.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Number of resamples. Default: 1000
    pub n_resamples: usize,

    /// Base seed; replicate `i` uses `seed + i`.
    pub seed: u64,

    /// Minimum number of surviving replicates for a usable estimate.
    /// Default: 10
    pub min_replicates: usize,

    /// Local minimizer settings for the refits.
    pub local: LocalConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_resamples: 1000,
            seed: 0,
            min_replicates: 10,
            local: LocalConfig::default(),
        }
    }
}

/// One surviving replicate: canonically ordered parameters plus the
/// prediction curve they imply over the evaluation grid.
struct Replicate {
    params: Array1<f64>,
    predictions: Vec<f64>,
}

/// Run the bootstrap at the fitted optimum.
///
/// # Arguments
///
/// * `problem` - The fitted problem (model, weighting, original dataset)
/// * `best` - Global best-fit parameters used as the refit starting point
/// * `x_eval` - Evaluation grid for the prediction interval
/// * `config` - Resample count, seed, and local minimizer settings
/// * `cancel` - Optional cancellation token checked per replicate
pub fn estimate(
    problem: &BindingProblem<'_>,
    best: &Array1<f64>,
    x_eval: &[f64],
    config: &BootstrapConfig,
    cancel: Option<&CancelToken>,
) -> Result<UncertaintyEstimate> {
    let sites = problem.sites();
    let weighting = problem.weighting();
    let data = problem.data();
    let lm = LevenbergMarquardt::new(config.local.clone());

    let replicates: Result<Vec<Option<Replicate>>> = (0..config.n_resamples)
        .into_par_iter()
        .map(|i| {
            if let Some(token) = cancel {
                token.check()?;
            }
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
            let resampled = data.resample(&mut rng);
            let replicate_problem = BindingProblem::new(sites, weighting, &resampled);

            // A refit that finishes without converging is still a valid draw
            // from the bootstrap distribution; only hard errors drop the
            // replicate.
            let run = match lm.minimize(&replicate_problem, best.clone(), cancel) {
                Ok(run) => run,
                Err(FitError::Cancelled) => return Err(FitError::Cancelled),
                Err(_) => return Ok(None),
            };

            let mut params = run.params;
            canonical_site_order(&mut params);
            let predictions = match solve_free(sites, &params.to_vec(), x_eval) {
                Ok(p) => p,
                Err(FitError::Cancelled) => return Err(FitError::Cancelled),
                Err(_) => return Ok(None),
            };
            Ok(Some(Replicate {
                params,
                predictions,
            }))
        })
        .collect();

    let replicates: Vec<Replicate> = replicates?.into_iter().flatten().collect();
    let n_kept = replicates.len();
    if n_kept < config.min_replicates {
        return Err(FitError::OptimizationFailure(format!(
            "only {} of {} bootstrap refits completed; the fit is too unstable for \
             bootstrap error estimation",
            n_kept, config.n_resamples
        )));
    }

    let mut warnings = Vec::new();
    let n_dropped = config.n_resamples - n_kept;
    if n_dropped > 0 {
        let warning = format!(
            "{} of {} bootstrap replicates failed to refit and were dropped",
            n_dropped, config.n_resamples
        );
        log::warn!("{}", warning);
        warnings.push(warning);
    }

    // Per-parameter standard deviation across replicates.
    let n_params = best.len();
    let mut errors = Vec::with_capacity(n_params);
    for j in 0..n_params {
        let mean = replicates.iter().map(|r| r.params[j]).sum::<f64>() / n_kept as f64;
        let variance = replicates
            .iter()
            .map(|r| (r.params[j] - mean).powi(2))
            .sum::<f64>()
            / n_kept as f64;
        errors.push(variance.sqrt());
    }

    // Pointwise 95% interval: sort replicate predictions per grid point and
    // index the 2.5th/97.5th percentiles (rows 25 and 975 of 1000).
    let lower_idx = (n_kept as f64 * 0.025) as usize;
    let upper_idx = ((n_kept as f64 * 0.975) as usize).min(n_kept - 1);
    let mut lower = Vec::with_capacity(x_eval.len());
    let mut upper = Vec::with_capacity(x_eval.len());
    let mut column = Vec::with_capacity(n_kept);
    for j in 0..x_eval.len() {
        column.clear();
        column.extend(replicates.iter().map(|r| r.predictions[j]));
        column.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        lower.push(column[lower_idx]);
        upper.push(column[upper_idx]);
    }

    Ok(UncertaintyEstimate {
        parameter_errors: errors,
        band: Some(PredictionBand { lower, upper }),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BindingData;
    use crate::equilibrium::{one_site_free, BindingSites};
    use crate::residual::Weighting;
    use ndarray::array;

    #[test]
    fn test_bootstrap_band_brackets_midline() {
        // Clean one-site data with mild noise; the band must bracket the
        // best-fit curve and parameter errors must be finite and positive.
        let kd = 4.0;
        let ptot = 30.0;
        let totals: Vec<f64> = (1..=15).map(|i| i as f64 * 2.0).collect();
        let noise = [
            0.011, -0.008, 0.014, -0.012, 0.006, -0.004, 0.009, -0.013, 0.007, -0.005, 0.012,
            -0.009, 0.004, -0.011, 0.008,
        ];
        let free: Vec<f64> = totals
            .iter()
            .zip(noise.iter())
            .map(|(&x, &e)| (one_site_free(kd, ptot, x) * (1.0 + e)).max(0.0))
            .collect();
        let data = BindingData::new(totals, free).unwrap();
        let problem = BindingProblem::new(BindingSites::One, Weighting::None, &data);

        let best = array![kd, ptot];
        let grid: Vec<f64> = (1..=20).map(|i| i as f64 * 1.5).collect();
        let config = BootstrapConfig {
            n_resamples: 80,
            seed: 21,
            ..Default::default()
        };

        let estimate = estimate(&problem, &best, &grid, &config, None).unwrap();
        assert_eq!(estimate.parameter_errors.len(), 2);
        for &e in &estimate.parameter_errors {
            assert!(e.is_finite() && e >= 0.0);
        }

        let band = estimate.band.expect("bootstrap must produce a band");
        assert_eq!(band.lower.len(), grid.len());
        for ((&x, &lo), &hi) in grid.iter().zip(band.lower.iter()).zip(band.upper.iter()) {
            let mid = one_site_free(kd, ptot, x);
            assert!(lo <= hi);
            assert!(
                lo <= mid * 1.05 && hi >= mid * 0.95,
                "band [{}, {}] far from midline {} at x={}",
                lo,
                hi,
                mid,
                x
            );
        }
    }

    #[test]
    fn test_bootstrap_cancellation() {
        let data = BindingData::new(vec![1.0, 2.0, 4.0], vec![0.2, 0.5, 1.2]).unwrap();
        let problem = BindingProblem::new(BindingSites::One, Weighting::None, &data);
        let token = CancelToken::new();
        token.cancel();
        let err = estimate(
            &problem,
            &array![1.0, 5.0],
            &[1.0, 2.0],
            &BootstrapConfig::default(),
            Some(&token),
        )
        .unwrap_err();
        assert!(matches!(err, FitError::Cancelled));
    }
}
