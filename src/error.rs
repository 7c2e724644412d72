use thiserror::Error;

/// Error types for the protbind library.
#[derive(Error, Debug)]
pub enum FitError {
    /// Input could not be converted to numeric form.
    #[error("could not convert data to numeric form: {0}")]
    DataConversion(String),

    /// Invalid input data (wrong sign, non-finite, empty, mismatched columns).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Mismatch between expected and supplied vector dimensions.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// No optimization start converged to a usable solution.
    #[error("optimization failed: {0}")]
    OptimizationFailure(String),

    /// The Hessian of the objective could not be inverted to a covariance.
    #[error("Hessian is singular: {0}")]
    SingularHessian(String),

    /// A binding model that the library does not implement.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// An operation was requested in a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A numerical routine failed (root solving, matrix inversion).
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// The fit was cancelled before completion; no result was published.
    #[error("fit cancelled before completion")]
    Cancelled,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for protbind operations.
pub type Result<T> = std::result::Result<T, FitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FitError::OptimizationFailure("none of 25 starts converged".to_string());
        assert!(format!("{}", err).contains("none of 25 starts converged"));

        let err = FitError::UnsupportedModel("three-binding-site".to_string());
        assert!(format!("{}", err).contains("three-binding-site"));

        let err = FitError::Cancelled;
        assert!(format!("{}", err).contains("cancelled"));
    }
}
