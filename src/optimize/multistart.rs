//! Multi-start global search.
//!
//! The residual surface for multi-site binding is multimodal: site labels are
//! interchangeable and local minima exist away from the global optimum, so a
//! single local run is unreliable. The search draws candidate starting points
//! log-uniformly from broad physically plausible ranges, runs the bounded
//! local minimizer from each in parallel, and keeps the lowest-cost converged
//! run. Reported parameters are put into canonical site order (ascending kd,
//! each p carried with its kd) so repeated fits and per-index statistics are
//! comparable.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::error::{FitError, Result};
use crate::optimize::local::{LevenbergMarquardt, LocalConfig};
use crate::residual::BindingProblem;

/// Configuration for the multi-start search.
#[derive(Debug, Clone)]
pub struct MultiStartConfig {
    /// Number of random starts. Default: 25
    pub n_starts: usize,

    /// Log-uniform sampling range for every dissociation constant.
    /// Default: (0.1, 500.0)
    pub kd_range: (f64, f64),

    /// Log-uniform sampling range for every site concentration.
    /// Default: (0.5, 1000.0)
    pub p_range: (f64, f64),

    /// Base seed; start `i` uses `seed + i` so runs are reproducible and
    /// starts are independent across threads.
    pub seed: u64,

    /// Local minimizer settings shared by all starts.
    pub local: LocalConfig,
}

impl Default for MultiStartConfig {
    fn default() -> Self {
        Self {
            n_starts: 25,
            kd_range: (0.1, 500.0),
            p_range: (0.5, 1000.0),
            seed: 0,
            local: LocalConfig::default(),
        }
    }
}

/// Best result found by the multi-start search.
#[derive(Debug, Clone)]
pub struct GlobalFit {
    /// Best parameters, in canonical site order.
    pub params: Array1<f64>,

    /// Objective value at the best parameters.
    pub cost: f64,

    /// How many starts converged.
    pub n_converged: usize,

    /// How many starts were attempted.
    pub n_starts: usize,
}

/// What a single start produced.
enum StartOutcome {
    /// The local run converged with this cost and parameter vector.
    Converged { cost: f64, params: Array1<f64> },
    /// The local run finished without meeting a convergence criterion.
    Stalled,
    /// The local run failed with a hard error.
    Failed(String),
}

/// Multi-start driver over the bounded local minimizer.
#[derive(Debug, Clone, Default)]
pub struct MultiStartOptimizer {
    config: MultiStartConfig,
}

impl MultiStartOptimizer {
    /// Create an optimizer with the given configuration.
    pub fn new(config: MultiStartConfig) -> Self {
        Self { config }
    }

    /// Run the search for the given problem.
    ///
    /// Starts that fail to converge, or whose trial parameters land where the
    /// equilibrium solver has no solution, are discarded. If no start
    /// converges the search fails with a descriptive
    /// [`FitError::OptimizationFailure`]; when hard errors occurred, the last
    /// one is carried into the message so a systematic failure (every start
    /// erroring identically) stays diagnosable.
    pub fn fit(
        &self,
        problem: &BindingProblem<'_>,
        cancel: Option<&CancelToken>,
    ) -> Result<GlobalFit> {
        let lm = LevenbergMarquardt::new(self.config.local.clone());

        let outcomes: Result<Vec<StartOutcome>> = (0..self.config.n_starts)
            .into_par_iter()
            .map(|i| {
                if let Some(token) = cancel {
                    token.check()?;
                }
                let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
                let start = self.sample_start(problem, &mut rng);
                match lm.minimize(problem, start, cancel) {
                    Ok(run) if run.success => Ok(StartOutcome::Converged {
                        cost: run.cost,
                        params: run.params,
                    }),
                    Ok(_) => Ok(StartOutcome::Stalled),
                    Err(FitError::Cancelled) => Err(FitError::Cancelled),
                    Err(err) => Ok(StartOutcome::Failed(err.to_string())),
                }
            })
            .collect();

        let mut best: Option<(f64, Array1<f64>)> = None;
        let mut n_converged = 0;
        let mut last_failure: Option<String> = None;
        for outcome in outcomes? {
            match outcome {
                StartOutcome::Converged { cost, params } => {
                    n_converged += 1;
                    best = Some(match best {
                        Some(current) if current.0 <= cost => current,
                        _ => (cost, params),
                    });
                }
                StartOutcome::Stalled => {}
                StartOutcome::Failed(message) => last_failure = Some(message),
            }
        }

        match best {
            Some((cost, mut params)) => {
                canonical_site_order(&mut params);
                Ok(GlobalFit {
                    params,
                    cost,
                    n_converged,
                    n_starts: self.config.n_starts,
                })
            }
            None => {
                let mut message = format!(
                    "none of {} optimization starts converged; the model may not describe \
                     this dataset, or the data may be too sparse",
                    self.config.n_starts
                );
                if let Some(failure) = last_failure {
                    message.push_str(&format!(" (last start failed with: {})", failure));
                }
                Err(FitError::OptimizationFailure(message))
            }
        }
    }

    /// Draw one starting point: kd and p sampled log-uniformly within their
    /// configured ranges, interleaved `[kd1, p1, kd2, p2, ...]`.
    fn sample_start(&self, problem: &BindingProblem<'_>, rng: &mut impl Rng) -> Array1<f64> {
        let n_sites = problem.sites().site_count();
        let mut start = Vec::with_capacity(2 * n_sites);
        for _ in 0..n_sites {
            start.push(log_uniform(self.config.kd_range, rng));
            start.push(log_uniform(self.config.p_range, rng));
        }
        Array1::from_vec(start)
    }
}

/// Sample log-uniformly from `(min, max)`.
fn log_uniform((min, max): (f64, f64), rng: &mut impl Rng) -> f64 {
    let log_min = min.ln();
    let log_max = max.ln();
    (log_min + (log_max - log_min) * rng.gen::<f64>()).exp()
}

/// Reorder site pairs ascending by kd, carrying each p with its kd.
///
/// Site-pair parameters are interchangeable, so without a canonical order two
/// fits of the same data could report the same optimum with the labels
/// swapped, and per-index error statistics across bootstrap replicates would
/// mix unrelated sites.
pub fn canonical_site_order(params: &mut Array1<f64>) {
    let n_sites = params.len() / 2;
    if n_sites < 2 {
        return;
    }
    let mut pairs: Vec<(f64, f64)> = (0..n_sites)
        .map(|i| (params[2 * i], params[2 * i + 1]))
        .collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    for (i, (kd, p)) in pairs.into_iter().enumerate() {
        params[2 * i] = kd;
        params[2 * i + 1] = p;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_canonical_order_sorts_pairs_together() {
        let mut params = array![50.0, 10.0, 5.0, 20.0];
        canonical_site_order(&mut params);
        assert_eq!(params, array![5.0, 20.0, 50.0, 10.0]);

        // Already sorted stays put.
        let mut params = array![5.0, 20.0, 50.0, 10.0];
        canonical_site_order(&mut params);
        assert_eq!(params, array![5.0, 20.0, 50.0, 10.0]);

        // Single site is untouched.
        let mut params = array![3.0, 7.0];
        canonical_site_order(&mut params);
        assert_eq!(params, array![3.0, 7.0]);
    }

    #[test]
    fn test_systematic_start_failure_reports_the_cause() {
        use crate::data::BindingData;
        use crate::equilibrium::BindingSites;
        use crate::residual::{BindingProblem, Weighting};

        // Every start fails identically here; the failure message must name
        // the underlying error, not just the converged-start count.
        let data = BindingData::new(vec![1.0, 2.0, 4.0], vec![0.2, 0.5, 1.2]).unwrap();
        let problem = BindingProblem::new(BindingSites::Three, Weighting::None, &data);
        let optimizer = MultiStartOptimizer::default();

        let err = optimizer.fit(&problem, None).unwrap_err();
        match err {
            FitError::OptimizationFailure(message) => {
                assert!(message.contains("none of 25"), "{}", message);
                assert!(message.contains("three-binding-site"), "{}", message);
            }
            other => panic!("expected OptimizationFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_log_uniform_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..1000 {
            let v = log_uniform((0.1, 500.0), &mut rng);
            assert!((0.1..=500.0).contains(&v));
        }
    }
}
