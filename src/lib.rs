//! # protbind
//!
//! `protbind` fits equilibrium protein-binding models to measured
//! total/free drug concentration pairs and estimates the uncertainty of
//! the fitted parameters.
//!
//! The library provides:
//! - Closed-form equilibrium solvers for one- and two-binding-site models
//! - A weighted least-squares objective with selectable 1/C^k weighting
//! - Multi-start global optimization built on a bounded Levenberg-Marquardt
//!   local solver
//! - Bootstrap and Fisher-information uncertainty estimation, including
//!   pointwise prediction bands
//! - A [`model::BindingModel`] orchestrator that sequences the full fit
//!   pipeline and owns the published result
//!
//! ## Basic usage
//!
//! ```no_run
//! use protbind::data::BindingData;
//! use protbind::equilibrium::BindingSites;
//! use protbind::model::BindingModel;
//! use protbind::residual::Weighting;
//! use protbind::uncertainty::UncertaintyMethod;
//!
//! # fn main() -> protbind::Result<()> {
//! let data = BindingData::new(
//!     vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0],
//!     vec![0.05, 0.12, 0.45, 1.4, 5.1, 28.0],
//! )?;
//!
//! let mut model = BindingModel::new();
//! model.configure(
//!     BindingSites::One,
//!     Weighting::InverseC,
//!     UncertaintyMethod::Bootstrap,
//! )?;
//! let result = model.fit(&data)?;
//! println!("kd = {:.3}", result.parameters.sites()[0].kd);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod data;
pub mod equilibrium;
pub mod error;
pub mod model;
pub mod optimize;
pub mod problem;
pub mod residual;
pub mod uncertainty;

mod utils;

// Re-exports for convenience
pub use cancel::CancelToken;
pub use data::BindingData;
pub use equilibrium::BindingSites;
pub use error::{FitError, Result};
pub use model::{BindingModel, FitResult, FitState};
pub use problem::Problem;
pub use residual::Weighting;
pub use uncertainty::UncertaintyMethod;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
