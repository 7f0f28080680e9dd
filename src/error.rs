use thiserror::Error;

/// Error types for the battfit library.
#[derive(Error, Debug)]
pub enum CurveError {
    /// Raw samples or parameter vectors have incompatible lengths.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The fit-method selector is not one of the supported modes.
    #[error("Invalid fit mode: {0}")]
    InvalidMode(String),

    /// Too few curves are stored to blend across the key axis.
    #[error("Insufficient curves for interpolation: need at least {needed}, found {found}")]
    InsufficientCurves { needed: usize, found: usize },

    /// No curve is stored under the requested key, or the collection is empty.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The optimizer could not produce a usable parameter vector.
    #[error("Fit failed to converge: {0}")]
    NonConvergence(String),

    /// Error during function evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for battfit operations.
pub type Result<T> = std::result::Result<T, CurveError>;
