use thiserror::Error;

/// A result type for surrogate fitting, evaluation and persistence
pub type Result<T> = std::result::Result<T, SurrogateError>;

/// An error when using a [`PolynomialRegression`](crate::PolynomialRegression)
/// or a [`GaussianProcess`](crate::GaussianProcess) surrogate
#[derive(Error, Debug)]
pub enum SurrogateError {
    /// When an option is unknown, badly typed or out of its valid range
    #[error("Config error: {0}")]
    ConfigError(String),
    /// When samples, responses or query points are inconsistent with the fitted model
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// When the least-squares system (design or trend matrix) is rank deficient
    #[error("Singular basis: {0}")]
    SingularBasis(String),
    /// When hyperparameters optimization does not reach any finite likelihood
    #[error("Fit divergence: {0}")]
    FitDivergence(String),
    /// When the regularized covariance matrix can not be factorized
    #[error("Non positive definite covariance matrix: {0}")]
    NonPositiveDefinite(String),
    /// When a model is evaluated or saved before being fitted or loaded
    #[error("Surrogate is not fitted, fit or load it first")]
    NotFitted,
    /// When a persisted record can not be decoded into a valid model
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
    /// When a model can not be encoded
    #[error("Save error: {0}")]
    SaveError(String),
    /// When reading or writing a file fails
    #[error("IO error")]
    Io(#[from] std::io::Error),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
}
