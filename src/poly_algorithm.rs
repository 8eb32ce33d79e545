use crate::basis::{BasisShape, PolynomialBasis};
use crate::errors::{Result, SurrogateError};
use crate::poly_parameters::{LinearSolver, PolyRegParams, PolyRegValidParams};
use crate::scaler::DataScaler;
use crate::utils::{check_points, check_samples};

use linfa::prelude::{Dataset, DatasetBase, Fit, Float};
use linfa_linalg::{cholesky::*, qr::*, svd::*, triangular::*};
use ndarray::{Array1, Array2, Array3, ArrayBase, Axis, Data, Ix1, Ix2, Zip};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest ratio of singular values of the design matrix triangular factor
const MIN_RCOND: f64 = 1e-12;

/// State of a fitted polynomial regression
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub(crate) struct PolyFitted<F: Float> {
    /// Input scaler fitted on training inputs
    pub(crate) scaler: DataScaler<F>,
    /// Monomials basis
    pub(crate) basis: PolynomialBasis,
    /// Least-squares coefficients aligned with basis terms
    pub(crate) coefficients: Array1<F>,
}

/// A polynomial regression model fitted by least squares
///
/// `y(x) = sum_k c_k * m_k(z)` where `z` is the scaled input and `m_k`
/// the monomials of total degree less or equal to the max degree, sorted
/// in graded lexicographic order (see [PolynomialBasis]).
///
/// Value, gradient and hessian predictions are analytic, derivatives being
/// expressed wrt the unscaled inputs.
///
/// # Example
///
/// ```no_run
/// use surrox::PolynomialRegression;
/// use linfa::prelude::*;
/// use ndarray::array;
///
/// let xt = array![[0., 0.], [1., 0.], [0., 1.], [1., 1.], [0.5, 0.2], [0.3, 0.9]];
/// let yt = xt.map_axis(ndarray::Axis(1), |r| r[0] * r[0] + 2. * r[0] * r[1] + 3. * r[1]);
///
/// let pr = PolynomialRegression::<f64>::params(2)
///     .fit(&Dataset::new(xt, yt))
///     .expect("PR fitted");
/// let grad = pr.gradient(&array![[0.1, 0.4]]).expect("PR gradient");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub struct PolynomialRegression<F: Float> {
    /// Parameters used to fit this model
    pub(crate) params: PolyRegValidParams,
    /// Fitted state, `None` until fitted or loaded
    pub(crate) fitted: Option<PolyFitted<F>>,
}

impl<F: Float> fmt::Display for PolynomialRegression<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.fitted {
            Some(fit) => write!(
                f,
                "PolynomialRegression(basis={}, scaler={}, coefficients={})",
                fit.basis,
                fit.scaler.kind(),
                fit.coefficients
            ),
            None => write!(
                f,
                "PolynomialRegression(unfitted, degree={})",
                self.params.max_degree()
            ),
        }
    }
}

impl<F: Float> PolynomialRegression<F> {
    /// Polynomial regression parameters constructor given the max degree of the basis
    pub fn params(max_degree: usize) -> PolyRegParams {
        PolyRegParams::new(max_degree)
    }

    /// Fit a polynomial regression on `x` (n, nx) samples and `y` (n,) responses
    /// configured by an options map, see [PolyRegParams::from_options]
    pub fn new(
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        options: &serde_json::Value,
    ) -> Result<Self> {
        PolyRegParams::from_options(options)?.fit(&Dataset::new(x.to_owned(), y.to_owned()))
    }

    pub(crate) fn fitted(&self) -> Result<&PolyFitted<F>> {
        self.fitted.as_ref().ok_or(SurrogateError::NotFitted)
    }

    /// Whether the model is fitted (or loaded) and ready for evaluation
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Parameters used to fit the model
    pub fn parameters(&self) -> &PolyRegValidParams {
        &self.params
    }

    /// Input dimension of the fitted model
    pub fn dims(&self) -> Option<usize> {
        self.fitted.as_ref().map(|fit| fit.basis.nvars())
    }

    /// Regression coefficients in basis term order
    pub fn coefficients(&self) -> Result<&Array1<F>> {
        Ok(&self.fitted()?.coefficients)
    }

    /// Polynomial basis of the fitted model
    pub fn basis(&self) -> Result<&PolynomialBasis> {
        Ok(&self.fitted()?.basis)
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n scalar output values as a vector (n,).
    pub fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let fit = self.fitted()?;
        check_points(x, fit.basis.nvars())?;
        let z = fit.scaler.transform(x.view());
        Ok(fit.basis.value(&z).dot(&fit.coefficients))
    }

    /// Predict gradients at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns a (n, nx) matrix containing output derivatives at x wrt each nx components
    pub fn gradient(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let fit = self.fitted()?;
        check_points(x, fit.basis.nvars())?;
        let z = fit.scaler.transform(x.view());

        let mut grad = Array2::<F>::zeros(z.raw_dim());
        Zip::from(grad.rows_mut())
            .and(z.rows())
            .for_each(|mut grad_i, z_i| {
                grad_i.assign(&fit.basis.jacobian(&z_i).t().dot(&fit.coefficients));
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
        let nx = fit.basis.nvars();
        check_points(x, nx)?;
        let z = fit.scaler.transform(x.view());

        let mut hess = Array3::<F>::zeros((z.nrows(), nx, nx));
        for (mut hess_i, z_i) in hess.outer_iter_mut().zip(z.rows()) {
            let terms = fit.basis.hessian(&z_i);
            for (h, c) in terms.outer_iter().zip(fit.coefficients.iter()) {
                hess_i.scaled_add(*c, &h);
            }
            if let Some(scale) = fit.scaler.scale_factors() {
                Zip::indexed(&mut hess_i).for_each(|(k, l), v| *v = *v / (scale[k] * scale[l]));
            }
        }
        Ok(hess)
    }

    /// Check a decoded model state is consistent
    pub(crate) fn check_consistency(&self) -> Result<()> {
        let fit = self.fitted()?;
        let nx = fit.basis.nvars();
        let consistent = nx > 0
            && fit.coefficients.len() == fit.basis.n_terms()
            && fit.coefficients.iter().all(|c| c.is_finite())
            && fit.scaler.is_consistent(nx);
        if consistent {
            Ok(())
        } else {
            Err(SurrogateError::CorruptRecord(
                "polynomial regression state is inconsistent".to_string(),
            ))
        }
    }
}

impl<F: Float, D: Data<Elem = F>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, SurrogateError>
    for PolyRegValidParams
{
    type Object = PolynomialRegression<F>;

    /// Fit polynomial coefficients by least squares
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();
        check_samples(x, y)?;
        let (n_obs, nx) = x.dim();

        let scaler =
            DataScaler::fit_with_factor(self.scaler_type(), x, F::cast(self.norm_factor()));
        let basis = PolynomialBasis::from_shape(BasisShape {
            nvars: nx,
            max_degree: self.max_degree(),
            reduced: self.reduced_basis(),
        })?;
        let n_terms = basis.n_terms();
        if n_obs < n_terms {
            return Err(SurrogateError::SingularBasis(format!(
                "{n_obs} samples can not determine the {n_terms} terms of the {basis} basis"
            )));
        }
        let design = basis.value(&scaler.transform(x.view()));
        debug!(
            "Least squares on ({n_obs}, {n_terms}) design matrix with {} solver",
            self.solver()
        );

        let coefficients = least_squares(&design, y, self.solver()).map_err(|err| match err {
            SurrogateError::SingularBasis(msg) => {
                SurrogateError::SingularBasis(format!("{msg} with the {basis} basis"))
            }
            err => err,
        })?;
        info!("Polynomial regression fitted on {n_obs} samples with {basis} basis");

        Ok(PolynomialRegression {
            params: self.clone(),
            fitted: Some(PolyFitted {
                scaler,
                basis,
                coefficients,
            }),
        })
    }
}

/// Check the triangular `factor` of a least squares system is well conditioned.
/// With `squared`, the factor comes from the normal equations whose
/// condition number is the square of the design matrix one.
fn check_conditioning<F: Float>(factor: &Array2<F>, squared: bool) -> Result<()> {
    if factor.iter().any(|v| !v.is_finite()) {
        return Err(SurrogateError::SingularBasis(
            "non finite design matrix factorization".to_string(),
        ));
    }
    let (_, sv, _) = factor.svd(false, false)?;
    check_singular_values(&sv, squared)
}

fn check_singular_values<F: Float>(sv: &Array1<F>, squared: bool) -> Result<()> {
    let sv_max = sv.fold(F::zero(), |m, v| m.max(v.abs()));
    let sv_min = sv.fold(F::infinity(), |m, v| m.min(v.abs()));
    let mut rcond = sv_min / sv_max;
    if squared {
        rcond = rcond * rcond;
    }
    if !(rcond >= F::cast(MIN_RCOND)) {
        return Err(SurrogateError::SingularBasis(format!(
            "design matrix is rank deficient (reciprocal condition number {rcond})"
        )));
    }
    Ok(())
}

/// Solve the least squares problem `design . c = y` with the given solver
fn least_squares<F: Float>(
    design: &Array2<F>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    solver: LinearSolver,
) -> Result<Array1<F>> {
    let rhs = y.to_owned().insert_axis(Axis(1));
    let coefficients = match solver {
        LinearSolver::Qr => {
            let (q, r) = design.qr()?.into_decomp();
            check_conditioning(&r, false)?;
            r.solve_triangular_into(q.t().dot(&rhs), UPLO::Upper)?
        }
        LinearSolver::Svd => {
            let (u, sv, vt) = design.svd(true, true)?;
            check_singular_values(&sv, false)?;
            match (u, vt) {
                (Some(u), Some(vt)) => {
                    let projected = u.t().dot(&rhs) / &sv.view().insert_axis(Axis(1));
                    vt.t().dot(&projected)
                }
                _ => {
                    return Err(SurrogateError::SingularBasis(
                        "incomplete singular value decomposition".to_string(),
                    ))
                }
            }
        }
        LinearSolver::Cholesky => {
            let gram = design.t().dot(design);
            let lower = gram.cholesky().map_err(|err| {
                SurrogateError::SingularBasis(format!("normal equations are singular ({err})"))
            })?;
            check_conditioning(&lower, true)?;
            let z = lower.solve_triangular(&design.t().dot(&rhs), UPLO::Lower)?;
            lower.t().solve_triangular_into(z, UPLO::Upper)?
        }
    };
    let coefficients = coefficients.remove_axis(Axis(1));
    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(SurrogateError::SingularBasis(
            "non finite least squares coefficients".to_string(),
        ));
    }
    Ok(coefficients)
}
