//! Mass-action equilibrium solvers.
//!
//! Given total drug concentrations and binding parameters, these routines
//! compute the free (unbound) concentration implied by mass-action
//! equilibrium. The single-site model has a closed-form quadratic solution;
//! the two-site model requires the unique non-negative real root of a cubic
//! per sample point. This is the hottest code in the crate: it runs once per
//! data point per objective evaluation, and millions of times across a
//! bootstrap run, so the cubic is solved in closed form with explicit branch
//! selection rather than through a generic complex-root library.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Relative slack when deciding whether a marginally negative root is the
/// physical zero-crossing.
const ROOT_NEG_TOL: f64 = 1e-9;

/// Number of binding sites in the equilibrium model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BindingSites {
    /// Single-site model: parameters `[kd1, p1]`.
    #[default]
    One,
    /// Two-site model: parameters `[kd1, p1, kd2, p2]`.
    Two,
    /// Three-site model. Declared but unimplemented; every solve fails with
    /// [`FitError::UnsupportedModel`].
    Three,
}

impl BindingSites {
    /// Number of binding sites.
    pub fn site_count(&self) -> usize {
        match self {
            BindingSites::One => 1,
            BindingSites::Two => 2,
            BindingSites::Three => 3,
        }
    }

    /// Number of free parameters: one (kd, p) pair per site.
    pub fn parameter_count(&self) -> usize {
        2 * self.site_count()
    }

    /// Parameter names in flat order: `kd1, p1, kd2, p2, ...`.
    pub fn parameter_names(&self) -> Vec<String> {
        (1..=self.site_count())
            .flat_map(|i| [format!("kd{}", i), format!("p{}", i)])
            .collect()
    }
}

/// Compute the free concentration for a single total concentration.
///
/// `params` is the flat parameter vector `[kd1, p1, ...]` with
/// `sites.parameter_count()` entries, all strictly positive.
pub fn free_concentration(sites: BindingSites, params: &[f64], x: f64) -> Result<f64> {
    check_params(sites, params)?;
    match sites {
        BindingSites::One => Ok(one_site_free(params[0], params[1], x)),
        BindingSites::Two => two_site_free(params[0], params[1], params[2], params[3], x),
        BindingSites::Three => Err(unsupported_three_site()),
    }
}

/// Compute free concentrations for a sequence of total concentrations.
pub fn solve_free(sites: BindingSites, params: &[f64], totals: &[f64]) -> Result<Vec<f64>> {
    check_params(sites, params)?;
    match sites {
        BindingSites::One => {
            let (kd, ptot) = (params[0], params[1]);
            Ok(totals.iter().map(|&x| one_site_free(kd, ptot, x)).collect())
        }
        BindingSites::Two => {
            let (kd1, p1, kd2, p2) = (params[0], params[1], params[2], params[3]);
            totals
                .iter()
                .map(|&x| two_site_free(kd1, p1, kd2, p2, x))
                .collect()
        }
        BindingSites::Three => Err(unsupported_three_site()),
    }
}

fn unsupported_three_site() -> FitError {
    FitError::UnsupportedModel(
        "three-binding-site models are not implemented; use a one- or two-site model".to_string(),
    )
}

fn check_params(sites: BindingSites, params: &[f64]) -> Result<()> {
    let expected = sites.parameter_count();
    if params.len() != expected {
        return Err(FitError::DimensionMismatch(format!(
            "expected {} parameters for a {}-site model, got {}",
            expected,
            sites.site_count(),
            params.len()
        )));
    }
    Ok(())
}

/// Closed-form single-site solution.
///
/// free = -0.5 (kd + ptot - x) + 0.5 sqrt((kd + ptot - x)^2 + 4 kd x)
///
/// Always has a unique non-negative solution for kd, ptot > 0 and x >= 0.
#[inline]
pub fn one_site_free(kd: f64, ptot: f64, x: f64) -> f64 {
    let s = kd + ptot - x;
    -0.5 * s + 0.5 * (s * s + 4.0 * kd * x).sqrt()
}

/// Two-site solution: the unique non-negative real root of the monic cubic
///
/// y^3 + b y^2 + c y + d = 0, with
///   b = p1 + p2 + kd1 + kd2 - x
///   c = p1 kd2 + p2 kd1 + kd1 kd2 - (kd1 + kd2) x
///   d = -kd1 kd2 x
///
/// The mass balance guarantees exactly one non-negative root; if the root
/// filter nevertheless yields several candidates (degenerate or
/// ill-conditioned coefficients), the smallest non-negative root is the
/// physical saturation branch and is taken with a logged warning. Zero
/// candidates is a solver failure.
fn two_site_free(kd1: f64, p1: f64, kd2: f64, p2: f64, x: f64) -> Result<f64> {
    let b = p1 + p2 + kd1 + kd2 - x;
    let c = p1 * kd2 + p2 * kd1 + kd1 * kd2 - (kd1 + kd2) * x;
    let d = -kd1 * kd2 * x;

    let mut roots = [0.0f64; 3];
    let n_roots = cubic_real_roots(b, c, d, &mut roots);

    // Marginally negative roots are the physical zero within rounding.
    let slack = ROOT_NEG_TOL * x.max(1.0);
    let mut best: Option<f64> = None;
    let mut candidates = 0usize;
    for &r in &roots[..n_roots] {
        if r >= -slack {
            candidates += 1;
            let r = r.max(0.0);
            best = Some(match best {
                Some(current) => current.min(r),
                None => r,
            });
        }
    }

    match best {
        Some(root) => {
            if candidates > 1 {
                log::warn!(
                    "two-site equilibrium at total={} produced {} non-negative real roots; \
                     taking the smallest (saturation branch)",
                    x,
                    candidates
                );
            }
            Ok(root)
        }
        None => Err(FitError::Numerical(format!(
            "no non-negative real root for the two-site equilibrium at total={} \
             (kd1={}, p1={}, kd2={}, p2={})",
            x, kd1, p1, kd2, p2
        ))),
    }
}

/// All real roots of the monic cubic y^3 + b y^2 + c y + d.
///
/// Writes the roots into `out` and returns how many there are (1 or 3).
/// Uses the trigonometric branch when the discriminant admits three real
/// roots and a cancellation-safe Cardano branch otherwise, so no complex
/// arithmetic or eigen-decomposition is needed.
pub(crate) fn cubic_real_roots(b: f64, c: f64, d: f64, out: &mut [f64; 3]) -> usize {
    // Depressed form t^3 + p t + q with y = t - b/3.
    let shift = b / 3.0;
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;

    let disc = -4.0 * p * p * p - 27.0 * q * q;

    let n = if p < 0.0 && disc >= 0.0 {
        // Three real roots (possibly repeated): t_k = m cos(theta - 2 pi k / 3).
        let m = 2.0 * (-p / 3.0).sqrt();
        let arg = (3.0 * q / (p * m)).clamp(-1.0, 1.0);
        let theta = arg.acos() / 3.0;
        for (k, slot) in out.iter_mut().enumerate() {
            *slot = m * (theta - 2.0 * PI * k as f64 / 3.0).cos() - shift;
        }
        3
    } else if p == 0.0 && q == 0.0 {
        out[0] = -shift;
        1
    } else {
        // One real root. Pick the larger-magnitude cube root to avoid
        // cancellation between -q/2 and the discriminant term.
        let r = (q * q / 4.0 + p * p * p / 27.0).max(0.0).sqrt();
        let u3 = if q > 0.0 { -q / 2.0 - r } else { -q / 2.0 + r };
        let u = u3.cbrt();
        let t = if u == 0.0 { 0.0 } else { u - p / (3.0 * u) };
        out[0] = t - shift;
        1
    };

    // Two Newton steps sharpen the closed-form roots, which matters for the
    // near-degenerate coefficient sets that show up deep inside a fit.
    for y in out.iter_mut().take(n) {
        for _ in 0..2 {
            let f = ((*y + b) * *y + c) * *y + d;
            let fp = (3.0 * *y + 2.0 * b) * *y + c;
            if fp != 0.0 && f.is_finite() {
                *y -= f / fp;
            }
        }
    }
    n
}
