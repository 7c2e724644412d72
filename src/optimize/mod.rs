//! Optimization: bounded local minimization and the multi-start global
//! search that drives it.

pub mod local;
pub mod multistart;

pub use local::{LevenbergMarquardt, LocalConfig, LocalFitResult, PARAM_LOWER_BOUND};
pub use multistart::{canonical_site_order, GlobalFit, MultiStartConfig, MultiStartOptimizer};
