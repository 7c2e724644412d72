//! Internal numerical utilities.

pub mod finite_difference;
pub mod matrix;
