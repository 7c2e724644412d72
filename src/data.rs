//! Experimental concentration data.
//!
//! A [`BindingData`] holds one protein-binding dataset: paired total and free
//! drug concentrations. The dataset is validated once at construction and is
//! read-only afterwards; every fit works on an immutable borrow of it.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Step in log space for the dense prediction grid.
pub const LOG_GRID_STEP: f64 = 0.1;

/// One validated dataset of (total, free) concentration pairs.
///
/// Invariants enforced at construction:
/// - both columns have the same, non-zero length,
/// - every value is finite,
/// - `total_i > 0` (required for log-spaced grids and 1/C weighting),
/// - `free_i >= 0`.
///
/// `free_i > total_i` is physically impossible but tolerated with a logged
/// warning, since upstream data sources do not enforce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingData {
    total: Vec<f64>,
    free: Vec<f64>,
}

impl BindingData {
    /// Create a dataset from two numeric columns.
    pub fn new(total: Vec<f64>, free: Vec<f64>) -> Result<Self> {
        if total.len() != free.len() {
            return Err(FitError::InvalidInput(format!(
                "total and free columns must have the same length (got {} and {})",
                total.len(),
                free.len()
            )));
        }
        if total.is_empty() {
            return Err(FitError::InvalidInput(
                "dataset is empty; load some data before fitting".to_string(),
            ));
        }
        for (i, (&t, &f)) in total.iter().zip(free.iter()).enumerate() {
            if !t.is_finite() || !f.is_finite() {
                return Err(FitError::InvalidInput(format!(
                    "non-finite concentration at row {} (total={}, free={})",
                    i, t, f
                )));
            }
            if t <= 0.0 {
                return Err(FitError::InvalidInput(format!(
                    "total concentration at row {} must be > 0 (got {})",
                    i, t
                )));
            }
            if f < 0.0 {
                return Err(FitError::InvalidInput(format!(
                    "free concentration at row {} must be >= 0 (got {})",
                    i, f
                )));
            }
            if f > t {
                log::warn!(
                    "free concentration {} exceeds total {} at row {}; \
                     physically impossible, check the dataset",
                    f,
                    t,
                    i
                );
            }
        }
        Ok(Self { total, free })
    }

    /// Create a dataset from (total, free) pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self> {
        let (total, free) = pairs.iter().copied().unzip();
        Self::new(total, free)
    }

    /// Parse a dataset from textual records, as supplied by the external
    /// CSV/GUI layer. A cell that does not parse as a number yields a
    /// [`FitError::DataConversion`] naming the offending row.
    pub fn parse<S: AsRef<str>>(rows: &[(S, S)]) -> Result<Self> {
        let mut total = Vec::with_capacity(rows.len());
        let mut free = Vec::with_capacity(rows.len());
        for (i, (t, f)) in rows.iter().enumerate() {
            let t = t.as_ref().trim();
            let f = f.as_ref().trim();
            total.push(t.parse::<f64>().map_err(|_| {
                FitError::DataConversion(format!("row {}: total value '{}' is not numeric", i, t))
            })?);
            free.push(f.parse::<f64>().map_err(|_| {
                FitError::DataConversion(format!("row {}: free value '{}' is not numeric", i, f))
            })?);
        }
        Self::new(total, free)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.total.len()
    }

    /// Whether the dataset is empty. Always false for a constructed dataset.
    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }

    /// Total concentrations.
    pub fn total(&self) -> &[f64] {
        &self.total
    }

    /// Free concentrations.
    pub fn free(&self) -> &[f64] {
        &self.free
    }

    /// Smallest and largest total concentration, for grid generation.
    pub fn x_range(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &t in &self.total {
            min = min.min(t);
            max = max.max(t);
        }
        (min, max)
    }

    /// Draw a bootstrap resample of the same size, sampling rows with
    /// replacement. The resample shares the validated invariants of the
    /// original, so no re-validation is needed.
    pub fn resample(&self, rng: &mut impl Rng) -> Self {
        let n = self.len();
        let mut total = Vec::with_capacity(n);
        let mut free = Vec::with_capacity(n);
        for _ in 0..n {
            let i = rng.gen_range(0..n);
            total.push(self.total[i]);
            free.push(self.free[i]);
        }
        Self { total, free }
    }
}

/// Generate a log-spaced evaluation grid from `min` to `max` (exclusive),
/// stepping by `step` in log space. Returns a single point when `min == max`.
pub fn log_spaced_range(min: f64, max: f64, step: f64) -> Vec<f64> {
    debug_assert!(min > 0.0 && max >= min && step > 0.0);
    if min == max {
        return vec![min];
    }
    let log_min = min.ln();
    let log_max = max.ln();
    let n = ((log_max - log_min) / step).ceil() as usize;
    (0..n).map(|i| (log_min + i as f64 * step).exp()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rejects_nonpositive_total() {
        let err = BindingData::new(vec![1.0, 0.0], vec![0.5, 0.0]).unwrap_err();
        assert!(matches!(err, FitError::InvalidInput(_)));
        assert!(format!("{}", err).contains("row 1"));

        let err = BindingData::new(vec![1.0, -2.0], vec![0.5, 0.1]).unwrap_err();
        assert!(format!("{}", err).contains("must be > 0"));
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        assert!(BindingData::new(vec![], vec![]).is_err());
        assert!(BindingData::new(vec![1.0, 2.0], vec![0.5]).is_err());
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(BindingData::new(vec![1.0, f64::NAN], vec![0.5, 0.2]).is_err());
        assert!(BindingData::new(vec![1.0, 2.0], vec![0.5, f64::INFINITY]).is_err());
    }

    #[test]
    fn test_parse_reports_offending_row() {
        let rows = vec![("1.0", "0.5"), ("2.0", "abc")];
        let err = BindingData::parse(&rows).unwrap_err();
        match err {
            FitError::DataConversion(msg) => {
                assert!(msg.contains("row 1"));
                assert!(msg.contains("abc"));
            }
            other => panic!("expected DataConversion, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_accepts_padded_numbers() {
        let rows = vec![(" 1.0 ", "0.5"), ("2.5", " 1.25")];
        let data = BindingData::parse(&rows).unwrap();
        assert_eq!(data.len(), 2);
        assert_relative_eq!(data.total()[1], 2.5);
        assert_relative_eq!(data.free()[1], 1.25);
    }

    #[test]
    fn test_resample_preserves_size_and_values() {
        use rand::SeedableRng;
        let data = BindingData::new(vec![1.0, 2.0, 4.0, 8.0], vec![0.1, 0.5, 1.0, 3.0]).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let resampled = data.resample(&mut rng);
        assert_eq!(resampled.len(), data.len());
        for &t in resampled.total() {
            assert!(data.total().contains(&t));
        }
    }

    #[test]
    fn test_log_spaced_range() {
        let grid = log_spaced_range(1.0, 100.0, 0.1);
        // ln(100) - ln(1) = 4.605..., so 47 points at step 0.1.
        assert_eq!(grid.len(), 47);
        assert_relative_eq!(grid[0], 1.0);
        assert!(grid.last().unwrap() < &100.0);
        for w in grid.windows(2) {
            assert_relative_eq!(w[1] / w[0], (0.1f64).exp(), epsilon = 1e-12);
        }
        assert_eq!(log_spaced_range(5.0, 5.0, 0.1), vec![5.0]);
    }
}
