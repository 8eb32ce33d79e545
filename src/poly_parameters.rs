use crate::errors::{Result, SurrogateError};
use crate::scaler::ScalerType;
use linfa::ParamGuard;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Linear solvers of the least squares problem
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinearSolver {
    /// Householder QR of the design matrix
    #[default]
    Qr,
    /// Singular value decomposition of the design matrix
    Svd,
    /// Cholesky factorization of the normal equations
    Cholesky,
}

impl fmt::Display for LinearSolver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            LinearSolver::Qr => "qr",
            LinearSolver::Svd => "svd",
            LinearSolver::Cholesky => "cholesky",
        };
        write!(f, "{name}")
    }
}

impl FromStr for LinearSolver {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "qr" => Ok(LinearSolver::Qr),
            "svd" => Ok(LinearSolver::Svd),
            "cholesky" => Ok(LinearSolver::Cholesky),
            other => Err(SurrogateError::ConfigError(format!(
                "unknown solver `{other}`, should be one of `qr`, `svd` or `cholesky`"
            ))),
        }
    }
}

/// A set of validated polynomial regression parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolyRegValidParams {
    /// Maximum total degree of the polynomial basis terms
    pub(crate) max_degree: usize,
    /// Whether interaction terms are dropped from the basis
    pub(crate) reduced_basis: bool,
    /// Scaling applied to inputs before basis evaluation
    pub(crate) scaler_type: ScalerType,
    /// Factor stretching normalized inputs
    pub(crate) norm_factor: f64,
    /// Least squares solver
    pub(crate) solver: LinearSolver,
}

impl Default for PolyRegValidParams {
    fn default() -> PolyRegValidParams {
        PolyRegValidParams {
            max_degree: 1,
            reduced_basis: false,
            scaler_type: ScalerType::None,
            norm_factor: 1.,
            solver: LinearSolver::Qr,
        }
    }
}

impl PolyRegValidParams {
    /// Get maximum degree of the basis
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Whether the basis is reduced (no interaction terms)
    pub fn reduced_basis(&self) -> bool {
        self.reduced_basis
    }

    /// Get input scaler kind
    pub fn scaler_type(&self) -> ScalerType {
        self.scaler_type
    }

    /// Get normalization factor of the mean and min-max scalers
    pub fn norm_factor(&self) -> f64 {
        self.norm_factor
    }

    /// Get least squares solver
    pub fn solver(&self) -> LinearSolver {
        self.solver
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the fitting of
/// a [polynomial regression](crate::PolynomialRegression).
pub struct PolyRegParams(PolyRegValidParams);

/// Option keys accepted by polynomial regression
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PolyRegOptions {
    #[serde(rename = "max degree", default = "default_max_degree")]
    max_degree: usize,
    #[serde(rename = "scaler type", default)]
    scaler_type: Option<String>,
    #[serde(rename = "reduced basis", default)]
    reduced_basis: bool,
    #[serde(rename = "normalization factor", default = "default_norm_factor")]
    norm_factor: f64,
    #[serde(rename = "solver type", default)]
    solver: Option<String>,
}

fn default_norm_factor() -> f64 {
    1.
}

fn default_max_degree() -> usize {
    1
}

impl Default for PolyRegParams {
    fn default() -> Self {
        Self(PolyRegValidParams::default())
    }
}

impl PolyRegParams {
    /// A constructor for polynomial regression parameters given the max degree of the basis
    pub fn new(max_degree: usize) -> PolyRegParams {
        Self(PolyRegValidParams {
            max_degree,
            ..Default::default()
        })
    }

    /// Parse parameters from a JSON options map.
    ///
    /// Accepted keys are `"max degree"` (default 1), `"scaler type"` (default `"none"`),
    /// `"reduced basis"` (default false), `"normalization factor"` (default 1)
    /// and `"solver type"` (default `"qr"`). A null value stands for no options.
    pub fn from_options(options: &serde_json::Value) -> Result<PolyRegParams> {
        if options.is_null() {
            return Ok(Self::default());
        }
        let opts = PolyRegOptions::deserialize(options)
            .map_err(|e| SurrogateError::ConfigError(format!("polynomial regression: {e}")))?;
        let scaler_type = match opts.scaler_type {
            Some(name) => name.parse()?,
            None => ScalerType::None,
        };
        let solver = match opts.solver {
            Some(name) => name.parse()?,
            None => LinearSolver::Qr,
        };
        Ok(Self::new(opts.max_degree)
            .reduced_basis(opts.reduced_basis)
            .scaler_type(scaler_type)
            .norm_factor(opts.norm_factor)
            .solver(solver))
    }

    /// Set the maximum degree of the basis
    pub fn max_degree(mut self, max_degree: usize) -> Self {
        self.0.max_degree = max_degree;
        self
    }

    /// Drop interaction terms from the basis
    pub fn reduced_basis(mut self, reduced: bool) -> Self {
        self.0.reduced_basis = reduced;
        self
    }

    /// Set input scaler kind
    pub fn scaler_type(mut self, scaler_type: ScalerType) -> Self {
        self.0.scaler_type = scaler_type;
        self
    }

    /// Set the factor stretching inputs normalized by the mean and min-max scalers
    pub fn norm_factor(mut self, norm_factor: f64) -> Self {
        self.0.norm_factor = norm_factor;
        self
    }

    /// Set the least squares solver
    pub fn solver(mut self, solver: LinearSolver) -> Self {
        self.0.solver = solver;
        self
    }
}

impl From<PolyRegValidParams> for PolyRegParams {
    fn from(valid: PolyRegValidParams) -> Self {
        PolyRegParams(valid)
    }
}

impl ParamGuard for PolyRegParams {
    type Checked = PolyRegValidParams;
    type Error = SurrogateError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if !(self.0.norm_factor.is_finite() && self.0.norm_factor > 0.) {
            return Err(SurrogateError::ConfigError(format!(
                "normalization factor should be positive, got {}",
                self.0.norm_factor
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
