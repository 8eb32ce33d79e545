use crate::correlation_models::KernelType;
use crate::errors::{Result, SurrogateError};
use crate::scaler::ScalerType;
use crate::{GP_COBYLA_MAX_EVAL, GP_COBYLA_MIN_EVAL, GP_OPTIM_N_START, NUGGET_FLOOR};
use linfa::{Float, ParamGuard};
use ndarray::{array, Array1};
use serde::{Deserialize, Serialize};

/// An enum to represent a n-dim hyper parameter tuning
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub enum ThetaTuning<F: Float> {
    /// Constant parameter (ie given not estimated)
    Fixed(Array1<F>),
    /// Parameter is optimized between given bounds (lower, upper) starting from the inital guess
    Full {
        /// Initial guess for the parameter
        init: Array1<F>,
        /// Bounds for the parameter array(lower, upper)
        bounds: Array1<(F, F)>,
    },
}

impl<F: Float> Default for ThetaTuning<F> {
    fn default() -> Self {
        ThetaTuning::Full {
            init: array![F::cast(ThetaTuning::<F>::DEFAULT_INIT)],
            bounds: array![(
                F::cast(ThetaTuning::<F>::DEFAULT_BOUNDS.0),
                F::cast(ThetaTuning::<F>::DEFAULT_BOUNDS.1),
            )],
        }
    }
}

impl<F: Float> ThetaTuning<F> {
    /// Default initial theta value
    pub const DEFAULT_INIT: f64 = 1e-1;
    /// Default bounds for theta values
    pub const DEFAULT_BOUNDS: (f64, f64) = (1e-2, 1e1);

    /// Get initial theta value
    pub fn init(&self) -> &Array1<F> {
        match self {
            ThetaTuning::Full { init, bounds: _ } => init,
            ThetaTuning::Fixed(init) => init,
        }
    }

    /// Get bounds for theta value
    pub fn bounds(&self) -> Option<&Array1<(F, F)>> {
        match self {
            ThetaTuning::Full { init: _, bounds } => Some(bounds),
            ThetaTuning::Fixed(_) => None,
        }
    }
}

/// An enum to represent the nugget tuning
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub enum NuggetTuning<F: Float> {
    /// Nugget given, not estimated
    Fixed(F),
    /// Nugget optimized with theta between given bounds starting from the initial guess
    Estimated {
        /// Initial guess
        init: F,
        /// Bounds (lower, upper)
        bounds: (F, F),
    },
}

impl<F: Float> Default for NuggetTuning<F> {
    fn default() -> Self {
        NuggetTuning::Fixed(F::cast(NUGGET_FLOOR))
    }
}

impl<F: Float> NuggetTuning<F> {
    /// Default bounds for an estimated nugget
    pub const DEFAULT_BOUNDS: (f64, f64) = (1e-12, 1e-1);

    /// Estimated nugget tuning within default bounds
    pub fn estimated() -> Self {
        let (lo, hi) = Self::DEFAULT_BOUNDS;
        NuggetTuning::Estimated {
            init: F::cast((lo * hi).sqrt()),
            bounds: (F::cast(lo), F::cast(hi)),
        }
    }

    /// Get nugget value (initial guess when estimated)
    pub fn init(&self) -> F {
        match self {
            NuggetTuning::Fixed(v) => *v,
            NuggetTuning::Estimated { init, bounds: _ } => *init,
        }
    }

    /// Whether the nugget is optimized
    pub fn is_estimated(&self) -> bool {
        matches!(self, NuggetTuning::Estimated { .. })
    }
}

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub struct GpValidParams<F: Float> {
    /// Scaling applied to inputs before kernel and trend evaluations
    pub(crate) scaler_type: ScalerType,
    /// Correlation model representing the spatial correlation between errors at e(x) and e(x')
    pub(crate) kernel: KernelType,
    /// Parameter tuning hint of the autocorrelation model
    pub(crate) theta_tuning: ThetaTuning<F>,
    /// Nugget tuning
    pub(crate) nugget_tuning: NuggetTuning<F>,
    /// Max degree of the polynomial trend
    pub(crate) trend_degree: usize,
    /// Whether interaction terms are dropped from the trend basis
    pub(crate) trend_reduced: bool,
    /// Number of internal likelihood optimization restart
    pub(crate) n_start: usize,
    /// Max number of internal likelihood evaluation during optimization
    pub(crate) max_eval: usize,
    /// Seed of the multistart random generator
    pub(crate) seed: u64,
}

impl<F: Float> Default for GpValidParams<F> {
    fn default() -> GpValidParams<F> {
        GpValidParams {
            scaler_type: ScalerType::Standardization,
            kernel: KernelType::default(),
            theta_tuning: ThetaTuning::default(),
            nugget_tuning: NuggetTuning::default(),
            trend_degree: 0,
            trend_reduced: false,
            n_start: GP_OPTIM_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            seed: 42,
        }
    }
}

impl<F: Float> GpValidParams<F> {
    /// Get input scaler kind
    pub fn scaler_type(&self) -> ScalerType {
        self.scaler_type
    }

    /// Get correlation model
    pub fn kernel(&self) -> KernelType {
        self.kernel
    }

    /// Get starting theta value for optimization
    pub fn theta_tuning(&self) -> &ThetaTuning<F> {
        &self.theta_tuning
    }

    /// Get nugget tuning
    pub fn nugget_tuning(&self) -> &NuggetTuning<F> {
        &self.nugget_tuning
    }

    /// Get max degree of the polynomial trend
    pub fn trend_degree(&self) -> usize {
        self.trend_degree
    }

    /// Whether the trend basis is reduced
    pub fn trend_reduced(&self) -> bool {
        self.trend_reduced
    }

    /// Get the number of internal optimization restart
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get the max number of internal likelihood evaluations during one optimization
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Get the multistart seed
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP algorithm](crate::GaussianProcess).
pub struct GpParams<F: Float>(GpValidParams<F>);

/// Option keys accepted by the GP
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GpOptions {
    #[serde(rename = "scaler name", default)]
    scaler_name: Option<String>,
    #[serde(rename = "kernel type", default)]
    kernel_type: Option<String>,
    #[serde(rename = "num restarts", default)]
    num_restarts: Option<usize>,
    #[serde(rename = "gp seed", default)]
    gp_seed: Option<u64>,
    #[serde(rename = "length-scale bounds", default)]
    length_scale_bounds: Option<(f64, f64)>,
    #[serde(rename = "Nugget", default)]
    nugget: Option<NuggetOptions>,
    #[serde(rename = "Trend", default)]
    trend: Option<TrendOptions>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NuggetOptions {
    #[serde(rename = "estimate nugget", default)]
    estimate_nugget: bool,
    #[serde(rename = "fixed nugget", default)]
    fixed_nugget: Option<f64>,
    #[serde(rename = "Bounds", default)]
    bounds: Option<(f64, f64)>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TrendOptions {
    #[serde(rename = "estimate trend", default)]
    estimate_trend: bool,
    #[serde(rename = "Options", default)]
    options: Option<TrendBasisOptions>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TrendBasisOptions {
    #[serde(rename = "max degree", default = "default_trend_degree")]
    max_degree: usize,
    #[serde(rename = "reduced basis", default)]
    reduced_basis: bool,
}

fn default_trend_degree() -> usize {
    2
}

impl<F: Float> Default for GpParams<F> {
    fn default() -> Self {
        Self(GpValidParams::default())
    }
}

impl<F: Float> GpParams<F> {
    /// A constructor for GP parameters with default settings
    pub fn new() -> GpParams<F> {
        Self::default()
    }

    /// A constructor for GP parameters from validated parameters
    pub fn new_from_valid(params: &GpValidParams<F>) -> Self {
        Self(params.clone())
    }

    /// Parse parameters from a JSON options map.
    ///
    /// Keys are case sensitive and unknown keys are rejected:
    /// `"scaler name"`, `"kernel type"`, `"num restarts"`, `"gp seed"`,
    /// `"length-scale bounds"`, `"Nugget"` (`"estimate nugget"`, `"fixed nugget"`, `"Bounds"`)
    /// and `"Trend"` (`"estimate trend"`, `"Options"` with `"max degree"` and `"reduced basis"`).
    pub fn from_options(options: &serde_json::Value) -> Result<GpParams<F>> {
        if options.is_null() {
            return Ok(Self::default());
        }
        let opts = GpOptions::deserialize(options)
            .map_err(|e| SurrogateError::ConfigError(format!("gaussian process: {e}")))?;

        let mut params = Self::default();
        if let Some(name) = opts.scaler_name {
            params = params.scaler_type(name.parse()?);
        }
        if let Some(name) = opts.kernel_type {
            params = params.kernel(name.parse()?);
        }
        if let Some(n_start) = opts.num_restarts {
            params = params.n_start(n_start);
        }
        if let Some(seed) = opts.gp_seed {
            params = params.seed(seed);
        }
        if let Some((lo, hi)) = opts.length_scale_bounds {
            if !(lo > 0. && lo <= hi) {
                return Err(SurrogateError::ConfigError(format!(
                    "length-scale bounds should verify 0 < lower <= upper, got [{lo}, {hi}]"
                )));
            }
            params = params.theta_bounds(array![(F::cast(1. / hi), F::cast(1. / lo))]);
        }
        if let Some(nugget) = opts.nugget {
            let tuning = if nugget.estimate_nugget {
                let (lo, hi) = nugget
                    .bounds
                    .unwrap_or(NuggetTuning::<F>::DEFAULT_BOUNDS);
                let init = nugget.fixed_nugget.unwrap_or((lo.max(0.) * hi).sqrt());
                NuggetTuning::Estimated {
                    init: F::cast(init),
                    bounds: (F::cast(lo), F::cast(hi)),
                }
            } else {
                NuggetTuning::Fixed(F::cast(nugget.fixed_nugget.unwrap_or(NUGGET_FLOOR)))
            };
            params = params.nugget_tuning(tuning);
        }
        if let Some(trend) = opts.trend {
            if trend.estimate_trend {
                let basis = trend.options.unwrap_or(TrendBasisOptions {
                    max_degree: default_trend_degree(),
                    reduced_basis: false,
                });
                params = params.trend(basis.max_degree, basis.reduced_basis);
            }
        }
        Ok(params)
    }

    /// Set input scaler kind
    pub fn scaler_type(mut self, scaler_type: ScalerType) -> Self {
        self.0.scaler_type = scaler_type;
        self
    }

    /// Set correlation model.
    pub fn kernel(mut self, kernel: KernelType) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set value for theta hyper parameter.
    ///
    /// When theta is optimized, the internal optimization is started from `theta_init`.
    /// When theta is fixed, this set theta constant value.
    pub fn theta_init(mut self, theta_init: Array1<F>) -> Self {
        self.0.theta_tuning = match self.0.theta_tuning {
            ThetaTuning::Full { init: _, bounds } => ThetaTuning::Full {
                init: theta_init,
                bounds,
            },
            ThetaTuning::Fixed(_) => ThetaTuning::Fixed(theta_init),
        };
        self
    }

    /// Set theta hyper parameter search space.
    ///
    /// This function is no-op when theta tuning is fixed
    pub fn theta_bounds(mut self, theta_bounds: Array1<(F, F)>) -> Self {
        self.0.theta_tuning = match self.0.theta_tuning {
            ThetaTuning::Full { init, bounds: _ } => ThetaTuning::Full {
                init,
                bounds: theta_bounds,
            },
            ThetaTuning::Fixed(f) => ThetaTuning::Fixed(f),
        };
        self
    }

    /// Set theta hyper parameter tuning
    pub fn theta_tuning(mut self, theta_tuning: ThetaTuning<F>) -> Self {
        self.0.theta_tuning = theta_tuning;
        self
    }

    /// Set nugget tuning
    pub fn nugget_tuning(mut self, nugget_tuning: NuggetTuning<F>) -> Self {
        self.0.nugget_tuning = nugget_tuning;
        self
    }

    /// Set a fixed nugget.
    ///
    /// Nugget is used to improve numerical stability
    pub fn nugget(mut self, nugget: F) -> Self {
        self.0.nugget_tuning = NuggetTuning::Fixed(nugget);
        self
    }

    /// Set the polynomial trend max degree, 0 being a constant trend (ordinary kriging)
    pub fn trend(mut self, max_degree: usize, reduced: bool) -> Self {
        self.0.trend_degree = max_degree;
        self.0.trend_reduced = reduced;
        self
    }

    /// Set the number of internal GP hyperparameter theta optimization restarts
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set the max number of internal likelihood evaluations during one optimization
    /// Given max_eval has to be greater than [crate::GP_COBYLA_MIN_EVAL] otherwise
    /// max_eval is set to [crate::GP_COBYLA_MIN_EVAL].
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = GP_COBYLA_MIN_EVAL.max(max_eval);
        self
    }

    /// Set the seed of the multistart random generator
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float> From<GpValidParams<F>> for GpParams<F> {
    fn from(valid: GpValidParams<F>) -> Self {
        GpParams(valid)
    }
}

fn check_bounds<F: Float>(name: &str, (lo, hi): (F, F)) -> Result<()> {
    if lo.is_finite() && hi.is_finite() && lo > F::zero() && lo <= hi {
        Ok(())
    } else {
        Err(SurrogateError::ConfigError(format!(
            "{name} bounds should be finite and verify 0 < lower <= upper, got [{lo}, {hi}]"
        )))
    }
}

impl<F: Float> ParamGuard for GpParams<F> {
    type Checked = GpValidParams<F>;
    type Error = SurrogateError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let theta = self.0.theta_tuning.init();
        if theta.is_empty() || theta.iter().any(|v| !v.is_finite() || *v <= F::zero()) {
            return Err(SurrogateError::ConfigError(format!(
                "theta values should be finite and strictly positive, got {theta}"
            )));
        }
        if let Some(bounds) = self.0.theta_tuning.bounds() {
            if bounds.is_empty() {
                return Err(SurrogateError::ConfigError(
                    "theta bounds should not be empty".to_string(),
                ));
            }
            bounds.iter().try_for_each(|b| check_bounds("theta", *b))?;
        }
        match self.0.nugget_tuning {
            NuggetTuning::Fixed(v) => {
                if !v.is_finite() || v < F::zero() {
                    return Err(SurrogateError::ConfigError(format!(
                        "fixed nugget should be finite and positive, got {v}"
                    )));
                }
            }
            NuggetTuning::Estimated { init, bounds } => {
                check_bounds("nugget", bounds)?;
                if !init.is_finite() || init <= F::zero() {
                    return Err(SurrogateError::ConfigError(format!(
                        "nugget initial guess should be finite and strictly positive, got {init}"
                    )));
                }
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use serde_json::json;

    #[test]
    fn test_default_params() {
        let params = GpParams::<f64>::from_options(&json!({}))
            .unwrap()
            .check()
            .unwrap();
        assert_eq!(GpValidParams::default(), params);
        assert_eq!(ScalerType::Standardization, params.scaler_type());
        assert_eq!(0, params.trend_degree());
        assert!(!params.nugget_tuning().is_estimated());
        assert_eq!(NUGGET_FLOOR, params.nugget_tuning().init());
    }

    #[test]
    fn test_options() {
        let params = GpParams::<f64>::from_options(&json!({
            "scaler name": "none",
            "kernel type": "Matern 5/2",
            "num restarts": 3,
            "gp seed": 7,
            "length-scale bounds": [0.1, 10.0],
            "Nugget": {"estimate nugget": true, "Bounds": [1e-10, 1e-2]},
            "Trend": {"estimate trend": true, "Options": {"max degree": 1, "reduced basis": true}}
        }))
        .unwrap()
        .check()
        .unwrap();
        assert_eq!(ScalerType::None, params.scaler_type());
        assert_eq!(KernelType::Matern52, params.kernel());
        assert_eq!(3, params.n_start());
        assert_eq!(7, params.seed());
        let bounds = params.theta_tuning().bounds().unwrap();
        assert_abs_diff_eq!(0.1, bounds[0].0, epsilon = 1e-12);
        assert_abs_diff_eq!(10., bounds[0].1, epsilon = 1e-12);
        match params.nugget_tuning() {
            NuggetTuning::Estimated { init, bounds } => {
                assert_eq!((1e-10, 1e-2), *bounds);
                assert_abs_diff_eq!(1e-6, *init, epsilon = 1e-12);
            }
            other => panic!("nugget should be estimated, got {other:?}"),
        }
        assert_eq!(1, params.trend_degree());
        assert!(params.trend_reduced());
    }

    #[test]
    fn test_fixed_nugget_option() {
        let params = GpParams::<f64>::from_options(&json!({
            "Nugget": {"estimate nugget": false, "fixed nugget": 1e-4}
        }))
        .unwrap()
        .check()
        .unwrap();
        assert_eq!(NuggetTuning::Fixed(1e-4), *params.nugget_tuning());
    }

    #[test]
    fn test_bad_options() {
        for options in [
            json!({"scaler type": "none"}),
            json!({"scaler name": "minmax"}),
            json!({"kernel type": "exponential"}),
            json!({"Nugget": {"estimate Nugget": true}}),
            json!({"Trend": {"estimate trend": true, "Options": {"degree": 2}}}),
            json!({"length-scale bounds": [0.0, 1.0]}),
            json!({"length-scale bounds": [2.0, 1.0]}),
        ] {
            assert!(
                matches!(
                    GpParams::<f64>::from_options(&options),
                    Err(SurrogateError::ConfigError(_))
                ),
                "{options} should be rejected"
            );
        }
    }

    #[test]
    fn test_check() {
        assert!(GpParams::<f64>::new().nugget(-1.).check().is_err());
        assert!(GpParams::<f64>::new().theta_init(array![0.]).check().is_err());
        assert!(GpParams::<f64>::new()
            .theta_bounds(array![(1., 0.1)])
            .check()
            .is_err());
        assert!(GpParams::<f64>::new()
            .nugget_tuning(NuggetTuning::Estimated {
                init: 1e-3,
                bounds: (0., 1.)
            })
            .check()
            .is_err());
        let params = GpParams::<f64>::new().max_eval(1).check().unwrap();
        assert_eq!(GP_COBYLA_MIN_EVAL, params.max_eval());
    }
}
