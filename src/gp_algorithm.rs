use crate::basis::{BasisShape, PolynomialBasis};
use crate::correlation_models::{CorrelationModel, KernelType};
use crate::errors::{Result, SurrogateError};
use crate::gp_parameters::{GpParams, GpValidParams, NuggetTuning, ThetaTuning};
use crate::optimization::{optimize_params, prepare_multistart, CobylaParams};
use crate::scaler::DataScaler;
use crate::utils::{check_points, check_samples, differences, into_f64, DiffMatrix};

use linfa::prelude::{Dataset, DatasetBase, Fit, Float};
use linfa_linalg::{cholesky::*, qr::*, svd::*, triangular::*};
use ndarray::{Array, Array1, Array2, Array3, ArrayBase, Axis, Data, Ix1, Ix2, Zip};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Default number of multistart for hyperparameters optimization
pub const GP_OPTIM_N_START: usize = 10;
/// Minimum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MIN_EVAL: usize = 25;
/// Maximum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MAX_EVAL: usize = 1000;
/// Smallest nugget added to the correlation matrix diagonal
pub const NUGGET_FLOOR: f64 = 100. * f64::EPSILON;

/// Internal parameters computed Gp during training
/// used later on in prediction computations
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub(crate) struct GpInnerParams<F: Float> {
    /// Gaussian process variance
    pub(crate) sigma2: F,
    /// Generalized least-squares regression weights of the trend
    pub(crate) beta: Array2<F>,
    /// Gaussian Process weights
    pub(crate) gamma: Array2<F>,
    /// Cholesky decomposition of the correlation matrix \[R\]
    pub(crate) r_chol: Array2<F>,
    /// Solution of the linear equation system : \[R\] x Ft = y
    pub(crate) ft: Array2<F>,
    /// R upper triangle matrix of QR decomposition of the matrix Ft
    pub(crate) ft_qr_r: Array2<F>,
}

/// State of a fitted GP
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub(crate) struct GpFitted<F: Float> {
    /// Input scaler fitted on training inputs
    pub(crate) scaler: DataScaler<F>,
    /// Polynomial trend basis
    pub(crate) trend: PolynomialBasis,
    /// Optimized hyperparameters theta
    pub(crate) theta: Array1<F>,
    /// Nugget added to the correlation matrix diagonal
    pub(crate) nugget: F,
    /// Reduced likelihood value
    pub(crate) likelihood: F,
    /// Factorizations used for prediction
    pub(crate) inner_params: GpInnerParams<F>,
    /// Scaled training inputs
    pub(crate) xt: Array2<F>,
    /// Training outputs mean
    pub(crate) y_mean: F,
    /// Training outputs standard deviation
    pub(crate) y_std: F,
}

/// A GP regression is an interpolation method where the
/// interpolated values are modeled by a Gaussian process with a mean and
/// governed by a prior covariance kernel, which depends on some
/// parameters to be determined.
///
/// The interpolated output is modeled as stochastic process as follows:
///
/// `Y(x) = mu(x) + Z(x)`
///
/// where:
/// * `mu(x)` is the trend i.e. the mean of the gaussian process
/// * `Z(x)` the realization of stochastic gaussian process ~ `Normal(0, sigma^2)`
///
/// which in turn is written as:
///
/// `Y(x) = betas.regr(x) + sigma^2*corr(x, x')`
///
/// where:
/// * `betas` is a vector of linear regression parameters to be determined
/// * `regr(x)` a vector of polynomial basis functions
/// * `sigma^2` is the process variance
/// * `corr(x, x')` is a correlation function which depends on `distance(x, x')`
///   and a set of unknown parameters `thetas` to be determined.
///
/// # Implementation
///
/// * Inputs are scaled (standardization by default), outputs are always standardized
/// * Trend is a polynomial of configurable degree, constant by default (ordinary kriging)
/// * Correlation kernels: squared exponential, matern 3/2, matern 5/2
/// * Theta and optionally the nugget are optimized by maximizing the reduced likelihood
///   with COBYLA from several starting points run in parallel
/// * Value, gradient and hessian predictions are analytic
///
/// # Example
///
/// ```no_run
/// use surrox::GaussianProcess;
/// use linfa::prelude::*;
/// use ndarray::{arr2, Array, Array1, Array2, Axis};
///
/// // one-dimensional test function to approximate
/// fn xsinx(x: &Array2<f64>) -> Array1<f64> {
///     ((x - 3.5) * ((x - 3.5) / std::f64::consts::PI).mapv(|v| v.sin())).remove_axis(Axis(1))
/// }
///
/// // training data
/// let xt = arr2(&[[0.0], [5.0], [10.0], [15.0], [18.0], [20.0], [25.0]]);
/// let yt = xsinx(&xt);
///
/// let gp = GaussianProcess::<f64>::params()
///     .fit(&Dataset::new(xt, yt))
///     .expect("GP fitted");
///
/// let xtest = Array::linspace(0., 25., 26).insert_axis(Axis(1));
/// let ytest = gp.value(&xtest).expect("GP prediction");
/// let grad = gp.gradient(&xtest).expect("GP gradient");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub struct GaussianProcess<F: Float> {
    /// Parameters used to fit this model
    pub(crate) params: GpValidParams<F>,
    /// Fitted state, `None` until fitted or loaded
    pub(crate) fitted: Option<GpFitted<F>>,
}

impl<F: Float> fmt::Display for GaussianProcess<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.fitted {
            Some(fit) => write!(
                f,
                "GP(trend={}, kernel={}, theta={}, nugget={}, variance={}, likelihood={})",
                fit.trend,
                self.params.kernel,
                fit.theta,
                fit.nugget,
                fit.inner_params.sigma2,
                fit.likelihood,
            ),
            None => write!(f, "GP(unfitted, kernel={})", self.params.kernel),
        }
    }
}

impl<F: Float> GaussianProcess<F> {
    /// Gp parameters contructor
    pub fn params() -> GpParams<F> {
        GpParams::new()
    }

    /// Fit a GP on `x` (n, nx) samples and `y` (n,) responses configured by an options map,
    /// see [GpParams::from_options]
    pub fn new(
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        options: &serde_json::Value,
    ) -> Result<Self> {
        GpParams::from_options(options)?.fit(&Dataset::new(x.to_owned(), y.to_owned()))
    }

    pub(crate) fn fitted(&self) -> Result<&GpFitted<F>> {
        self.fitted.as_ref().ok_or(SurrogateError::NotFitted)
    }

    /// Whether the model is fitted (or loaded) and ready for evaluation
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Parameters used to fit the model
    pub fn parameters(&self) -> &GpValidParams<F> {
        &self.params
    }

    /// Input dimension of the fitted model
    pub fn dims(&self) -> Option<usize> {
        self.fitted.as_ref().map(|fit| fit.xt.ncols())
    }

    /// Retrieve optimized hyperparameters theta
    pub fn theta(&self) -> Result<&Array1<F>> {
        Ok(&self.fitted()?.theta)
    }

    /// Retrieve the nugget used in the correlation matrix
    pub fn nugget(&self) -> Result<F> {
        Ok(self.fitted()?.nugget)
    }

    /// Estimated process variance
    pub fn variance_process(&self) -> Result<F> {
        Ok(self.fitted()?.inner_params.sigma2)
    }

    /// Retrieve reduced likelihood value
    pub fn likelihood(&self) -> Result<F> {
        Ok(self.fitted()?.likelihood)
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n scalar output values as a vector (n,).
    pub fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let fit = self.fitted()?;
        check_points(x, fit.xt.ncols())?;
        let z = fit.scaler.transform(x.view());
        // Compute the mean term at x
        let f = fit.trend.value(&z);
        // Compute the correlation term at x
        let corr = self.correlation(fit, &z);
        // Scaled predictor
        let y_ = &f.dot(&fit.inner_params.beta) + &corr.dot(&fit.inner_params.gamma);
        Ok(y_.column(0).mapv(|v| v * fit.y_std + fit.y_mean))
    }

    /// Predict variance values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n variance values as (n,) column vector.
    pub fn variance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let fit = self.fitted()?;
        check_points(x, fit.xt.ncols())?;
        let inners = &fit.inner_params;
        let z = fit.scaler.transform(x.view());
        let corr = self.correlation(fit, &z);

        let rt = inners.r_chol.solve_triangular(&corr.t(), UPLO::Lower)?;
        let rhs = inners.ft.t().dot(&rt) - fit.trend.value(&z).t();
        let u = inners.ft_qr_r.t().solve_triangular(&rhs, UPLO::Lower)?;

        let mut mse = Array::ones(rt.ncols()) - rt.mapv(|v| v * v).sum_axis(Axis(0))
            + u.mapv(|v: F| v * v).sum_axis(Axis(0));
        mse.mapv_inplace(|v| inners.sigma2 * v);

        // Mean Squared Error might be slightly negative depending on
        // machine precision: set to zero in that case
        Ok(mse.mapv(|v| if v < F::zero() { F::zero() } else { v }))
    }

    /// Predict gradients at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns a (n, nx) matrix containing output derivatives at x wrt each nx components
    pub fn gradient(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let fit = self.fitted()?;
        check_points(x, fit.xt.ncols())?;
        let beta = fit.inner_params.beta.column(0);
        let gamma = fit.inner_params.gamma.column(0);
        let z = fit.scaler.transform(x.view());

        let mut grad = Array2::<F>::zeros(z.raw_dim());
        Zip::from(grad.rows_mut())
            .and(z.rows())
            .for_each(|mut grad_i, z_i| {
                let df = fit.trend.jacobian(&z_i);
                let dr = self.params.kernel.jacobian(&z_i, &fit.xt, &fit.theta);
                let dy = df.t().dot(&beta) + dr.t().dot(&gamma);
                grad_i.assign(&dy.mapv(|v| v * fit.y_std));
            });
        if let Some(scale) = fit.scaler.scale_factors() {
            grad /= scale;
        }
        Ok(grad)
    }

    /// Predict hessians at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns a (n, nx, nx) array of symmetric matrices.
    pub fn hessian(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array3<F>> {
        let fit = self.fitted()?;
        let nx = fit.xt.ncols();
        check_points(x, nx)?;
        let beta = fit.inner_params.beta.column(0);
        let gamma = fit.inner_params.gamma.column(0);
        let z = fit.scaler.transform(x.view());

        let mut hess = Array3::<F>::zeros((z.nrows(), nx, nx));
        for (mut hess_i, z_i) in hess.outer_iter_mut().zip(z.rows()) {
            let trend_hess = fit.trend.hessian(&z_i);
            for (h, b) in trend_hess.outer_iter().zip(beta.iter()) {
                hess_i.scaled_add(*b, &h);
            }
            let corr_hess = self.params.kernel.hessian(&z_i, &fit.xt, &fit.theta);
            for (h, g) in corr_hess.outer_iter().zip(gamma.iter()) {
                hess_i.scaled_add(*g, &h);
            }
            hess_i.mapv_inplace(|v| v * fit.y_std);
            if let Some(scale) = fit.scaler.scale_factors() {
                Zip::indexed(&mut hess_i).for_each(|(k, l), v| *v = *v / (scale[k] * scale[l]));
            }
        }
        Ok(hess)
    }

    /// Compute correlation matrix (n, nt) given scaled `z` points specified as a (n, nx) matrix
    fn correlation(&self, fit: &GpFitted<F>, z: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let mut corr = Array2::<F>::zeros((z.nrows(), fit.xt.nrows()));
        Zip::from(corr.rows_mut())
            .and(z.rows())
            .for_each(|mut corr_i, z_i| {
                let d = differences(&z_i, &fit.xt);
                corr_i.assign(&self.params.kernel.value(&d, &fit.theta).column(0));
            });
        corr
    }

    /// Check a decoded model state is consistent
    pub(crate) fn check_consistency(&self) -> Result<()> {
        let fit = self.fitted()?;
        let inners = &fit.inner_params;
        let (n, nx) = fit.xt.dim();
        let t = fit.trend.n_terms();
        let consistent = n > 0
            && nx > 0
            && fit.theta.len() == nx
            && fit.theta.iter().all(|v| v.is_finite() && *v > F::zero())
            && fit.trend.nvars() == nx
            && fit.scaler.is_consistent(nx)
            && inners.beta.dim() == (t, 1)
            && inners.gamma.dim() == (n, 1)
            && inners.r_chol.dim() == (n, n)
            && inners.ft.dim() == (n, t)
            && inners.ft_qr_r.dim() == (t, t)
            && inners.sigma2.is_finite()
            && inners.sigma2 >= F::zero()
            && fit.nugget.is_finite()
            && fit.nugget >= F::zero()
            && fit.y_mean.is_finite()
            && fit.y_std.is_finite()
            && fit.y_std != F::zero();
        if consistent {
            Ok(())
        } else {
            Err(SurrogateError::CorruptRecord(
                "gaussian process state is inconsistent".to_string(),
            ))
        }
    }
}

/// Broadcast a hyperparameter specification given either for all or for each of `dim` components
fn broadcast_param<T: Clone>(name: &str, values: &Array1<T>, dim: usize) -> Result<Array1<T>> {
    match values.len() {
        1 => Ok(Array1::from_elem(dim, values[0].clone())),
        n if n == dim => Ok(values.to_owned()),
        n => Err(SurrogateError::ConfigError(format!(
            "{name} should be either 1-dim or {dim}-dim (training input dimension), got {n}"
        ))),
    }
}

/// Output mean and sample standard deviation, zero deviation being replaced by one
fn output_normalization<F: Float>(y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> (F, F) {
    let mean = y.mean().unwrap_or_else(F::zero);
    let std = if y.len() > 1 {
        y.std(F::one())
    } else {
        F::zero()
    };
    let std = if std == F::zero() { F::one() } else { std };
    (mean, std)
}

impl<F: Float, D: Data<Elem = F> + Sync> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, SurrogateError>
    for GpValidParams<F>
{
    type Object = GaussianProcess<F>;

    /// Fit GP parameters using maximum likelihood
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();
        check_samples(x, y)?;
        let now = Instant::now();
        let (n_obs, nx) = x.dim();

        let scaler = DataScaler::fit(self.scaler_type(), x);
        let xt = scaler.transform(x.view()).into_owned();
        let (y_mean, y_std) = output_normalization(y);
        let yt = y.mapv(|v| (v - y_mean) / y_std).insert_axis(Axis(1));

        let trend = PolynomialBasis::from_shape(BasisShape {
            nvars: nx,
            max_degree: self.trend_degree(),
            reduced: self.trend_reduced(),
        })?;
        if n_obs < trend.n_terms() {
            return Err(SurrogateError::SingularBasis(format!(
                "{n_obs} samples can not determine the {} terms of the {trend} trend",
                trend.n_terms()
            )));
        }
        let fx = trend.value(&xt);

        let x_distances = DiffMatrix::new(&xt);
        let duplicates = x_distances.duplicates();
        if let Some((i, j)) = duplicates.first() {
            warn!(
                "{} pair(s) of training samples are duplicated (e.g. rows {i} and {j})",
                duplicates.len()
            );
        }

        let theta0 = broadcast_param("theta initial guess", self.theta_tuning().init(), nx)?;
        let theta_bounds = match self.theta_tuning() {
            ThetaTuning::Fixed(_) => None,
            ThetaTuning::Full { init: _, bounds } => {
                Some(broadcast_param("theta bounds", bounds, nx)?)
            }
        };
        let nugget0 = self.nugget_tuning().init();
        let nugget_bounds = match self.nugget_tuning() {
            NuggetTuning::Fixed(_) => None,
            NuggetTuning::Estimated { init: _, bounds } => Some(*bounds),
        };

        // Optimization parameters are log10 theta components then log10 nugget if estimated
        let base: f64 = 10.;
        let decode = |params: &[f64]| -> (Array1<F>, F) {
            let mut theta = theta0.to_owned();
            let mut offset = 0;
            if theta_bounds.is_some() {
                Zip::from(&mut theta)
                    .and(&params[..nx])
                    .for_each(|t, p| *t = F::cast(base.powf(*p)));
                offset = nx;
            }
            let nugget = if nugget_bounds.is_some() {
                F::cast(base.powf(params[offset]))
            } else {
                nugget0
            };
            (theta, nugget)
        };

        let (theta, nugget) = if theta_bounds.is_none() && nugget_bounds.is_none() {
            // Easy path no optimization
            (theta0.to_owned(), nugget0)
        } else {
            let mut init = vec![];
            let mut bounds = vec![];
            if let Some(tb) = theta_bounds.as_ref() {
                init.extend(theta0.iter().cloned());
                bounds.extend(tb.iter().cloned());
            }
            if let Some(nb) = nugget_bounds {
                init.push(nugget0);
                bounds.push(nb);
            }

            let objfn = |params: &[f64]| -> f64 {
                let (theta, nugget) = decode(params);
                // check params as optimizer may return nan values
                if theta.iter().any(|v| !v.is_finite()) || !nugget.is_finite() {
                    // shortcut return worst value wrt to rlf minimization
                    return f64::INFINITY;
                }
                let rxx = self.kernel().value(&x_distances.d, &theta);
                match reduced_likelihood(&fx, rxx, &x_distances, &yt, nugget) {
                    Ok((lkh, _)) => -into_f64(&lkh),
                    Err(_) => f64::INFINITY,
                }
            };

            let (params0, bounds) =
                prepare_multistart(self.n_start(), &Array1::from_vec(init), &bounds, self.seed());
            debug!("Optimize with multistart params = {params0:?} and bounds = {bounds:?}");
            let opt_params = (0..params0.nrows())
                .into_par_iter()
                .map(|i| {
                    optimize_params(
                        &objfn,
                        &params0.row(i).to_owned(),
                        &bounds,
                        CobylaParams {
                            maxeval: (10 * params0.ncols())
                                .clamp(GP_COBYLA_MIN_EVAL, self.max_eval()),
                            ..CobylaParams::default()
                        },
                    )
                })
                .reduce(
                    || (f64::INFINITY, Array::ones((params0.ncols(),))),
                    |a, b| if b.0 < a.0 { b } else { a },
                );
            debug!("elapsed optim = {:?}", now.elapsed().as_millis());
            if !opt_params.0.is_finite() {
                return Err(SurrogateError::FitDivergence(format!(
                    "no finite likelihood reached from {} starting points",
                    params0.nrows()
                )));
            }
            decode(&opt_params.1.to_vec()[..])
        };

        let nugget = nugget.max(F::cast(NUGGET_FLOOR));
        let rxx = self.kernel().value(&x_distances.d, &theta);
        let (likelihood, mut inner_params) =
            reduced_likelihood(&fx, rxx, &x_distances, &yt, nugget)?;
        inner_params.sigma2 = inner_params.sigma2 * y_std * y_std;
        debug!("Selected theta = {theta}, nugget = {nugget}");
        info!(
            "GP fitted on {n_obs} samples in {} ms (likelihood = {likelihood})",
            now.elapsed().as_millis()
        );

        Ok(GaussianProcess {
            params: self.clone(),
            fitted: Some(GpFitted {
                scaler,
                trend,
                theta,
                nugget,
                likelihood,
                inner_params,
                xt,
                y_mean,
                y_std,
            }),
        })
    }
}

/// Compute reduced likelihood function
/// fx: trend basis terms at x samples,
/// rxx: correlation factors at x samples,
/// x_distances: pairwise distances between x samples
/// yt: normalized output training values
/// nugget: factor to improve numerical stability, floored to [NUGGET_FLOOR]
fn reduced_likelihood<F: Float>(
    fx: &ArrayBase<impl Data<Elem = F>, Ix2>,
    rxx: ArrayBase<impl Data<Elem = F>, Ix2>,
    x_distances: &DiffMatrix<F>,
    yt: &ArrayBase<impl Data<Elem = F>, Ix2>,
    nugget: F,
) -> Result<(F, GpInnerParams<F>)> {
    let nugget = nugget.max(F::cast(NUGGET_FLOOR));
    // Set up R
    let mut r_mx: Array2<F> = Array2::<F>::eye(x_distances.n_obs).mapv(|v| v + v * nugget);
    for (i, ij) in x_distances.d_indices.outer_iter().enumerate() {
        r_mx[[ij[0], ij[1]]] = rxx[[i, 0]];
        r_mx[[ij[1], ij[0]]] = rxx[[i, 0]];
    }
    // R cholesky decomposition
    let r_chol = r_mx.cholesky().map_err(|e| {
        SurrogateError::NonPositiveDefinite(format!("with nugget {nugget}: {e}"))
    })?;
    if r_chol.iter().any(|v| !v.is_finite()) {
        return Err(SurrogateError::NonPositiveDefinite(format!(
            "with nugget {nugget}: non finite cholesky factor"
        )));
    }
    // Solve generalized least squared problem
    let ft = r_chol.solve_triangular(fx, UPLO::Lower)?;
    let (ft_qr_q, ft_qr_r) = ft.qr()?.into_decomp();

    // Check whether we have an ill-conditionned problem
    let (_, sv_qr_r, _) = ft_qr_r.svd(false, false)?;
    let sv_max = sv_qr_r.fold(F::zero(), |m, v| m.max(v.abs()));
    let sv_min = sv_qr_r.fold(F::infinity(), |m, v| m.min(v.abs()));
    if !(sv_min / sv_max >= F::cast(1e-10)) {
        return Err(SurrogateError::SingularBasis(
            "trend matrix is too ill conditioned, poor combination \
             of trend degree and training samples"
                .to_string(),
        ));
    }
    let yt = r_chol.solve_triangular(yt, UPLO::Lower)?;

    let beta = ft_qr_r.solve_triangular_into(ft_qr_q.t().dot(&yt), UPLO::Upper)?;
    let rho = yt - ft.dot(&beta);
    let rho_sqr = rho.mapv(|v| v * v).sum();

    let gamma = r_chol.t().solve_triangular_into(rho, UPLO::Upper)?;
    // The determinant of R is equal to the squared product of
    // the diagonal elements of its Cholesky decomposition r_chol
    let n_obs: F = F::cast(x_distances.n_obs);

    let logdet = r_chol.diag().mapv(|v: F| v.log10()).sum() * F::cast(2.) / n_obs;

    // Reduced likelihood, variance floored for exactly interpolated outputs
    let sigma2 = (rho_sqr / n_obs).max(F::min_positive_value());
    let reduced_likelihood = -n_obs * (sigma2.log10() + logdet);

    Ok((
        reduced_likelihood,
        GpInnerParams {
            sigma2,
            beta,
            gamma,
            r_chol,
            ft,
            ft_qr_r,
        },
    ))
}
