//! A module for correlation models used to model the error term of the GP model.
//!
//! The following correlation models are implemented:
//! * squared exponential,
//! * matern 3/2,
//! * matern 5/2.
//!
//! All models are stationary products over input dimensions of a one dimensional
//! factor `g(t_j)` with `t_j = theta_j * (x_j - x'_j)`, so that value, jacobian and
//! hessian wrt `x` are all derived from `g`, `g'` and `g''`.

use crate::errors::SurrogateError;
use crate::utils::differences;
use linfa::Float;
use ndarray::{Array1, Array2, Array3, ArrayBase, Data, Ix1, Ix2, Zip};
use paste::paste;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

/// A trait for using a correlation model in GP regression
pub trait CorrelationModel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// One dimensional correlation factor `g(t)`
    fn factor(&self, t: F) -> F;

    /// First derivative `g'(t)`
    fn factor_deriv(&self, t: F) -> F;

    /// Second derivative `g''(t)`
    fn factor_second_deriv(&self, t: F) -> F;

    /// Compute correlation function matrix r(x, x') given differences `d` between x and x'
    /// and `theta` parameters, where:
    /// `theta` : hyperparameters (nx,)
    /// `d`     : differences (n, nx)
    /// Returns a (n, 1) matrix
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let mut r = Array2::<F>::ones((d.nrows(), 1));
        Zip::from(r.rows_mut()).and(d.rows()).for_each(|mut r_i, d_i| {
            r_i[0] = Zip::from(&d_i)
                .and(theta)
                .fold(F::one(), |acc, &dij, &th| acc * self.factor(th * dij));
        });
        r
    }

    /// Compute jacobian matrix of `r(x, x')` at given `x` given a set of `xtrain` training samples
    /// and `theta` parameters. Returns a (n, nx) matrix: `jac[i, j] = d r(x, xtrain_i) / d x_j`
    fn jacobian(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
        xtrain: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let d = differences(x, xtrain);
        let nx = d.ncols();
        let mut jac = Array2::<F>::zeros(d.raw_dim());
        Zip::from(jac.rows_mut())
            .and(d.rows())
            .for_each(|mut jac_i, d_i| {
                let t = &d_i * theta;
                let g = t.mapv(|v| self.factor(v));
                for j in 0..nx {
                    jac_i[j] = theta[j] * self.factor_deriv(t[j]) * product_except(&g, j, j);
                }
            });
        jac
    }

    /// Compute hessian of `r(x, x')` at given `x` given a set of `xtrain` training samples
    /// and `theta` parameters. Returns a (n, nx, nx) array of symmetric matrices.
    fn hessian(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
        xtrain: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array3<F> {
        let d = differences(x, xtrain);
        let (n, nx) = d.dim();
        let mut hess = Array3::<F>::zeros((n, nx, nx));
        for (mut hess_i, d_i) in hess.outer_iter_mut().zip(d.rows()) {
            let t = &d_i * theta;
            let g = t.mapv(|v| self.factor(v));
            let dg = t.mapv(|v| self.factor_deriv(v));
            for j in 0..nx {
                hess_i[[j, j]] =
                    theta[j] * theta[j] * self.factor_second_deriv(t[j]) * product_except(&g, j, j);
                for l in (j + 1)..nx {
                    let v = theta[j] * theta[l] * dg[j] * dg[l] * product_except(&g, j, l);
                    hess_i[[j, l]] = v;
                    hess_i[[l, j]] = v;
                }
            }
        }
        hess
    }
}

/// Product of `g` components except the ones at index `j` and `l`
fn product_except<F: Float>(g: &Array1<F>, j: usize, l: usize) -> F {
    g.iter()
        .enumerate()
        .filter(|(k, _)| *k != j && *k != l)
        .fold(F::one(), |acc, (_, v)| acc * *v)
}

/// Squared exponential correlation models
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SquaredExponentialCorr();

impl<F: Float> CorrelationModel<F> for SquaredExponentialCorr {
    /// exp(-t^2 / 2)
    fn factor(&self, t: F) -> F {
        F::exp(F::cast(-0.5) * t * t)
    }

    fn factor_deriv(&self, t: F) -> F {
        -t * self.factor(t)
    }

    fn factor_second_deriv(&self, t: F) -> F {
        (t * t - F::one()) * self.factor(t)
    }
}

/// Matern 3/2 correlation model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Matern32Corr();

impl<F: Float> CorrelationModel<F> for Matern32Corr {
    /// (1 + sqrt(3) * |t|) exp( - sqrt(3) * |t| )
    fn factor(&self, t: F) -> F {
        let a = F::cast(3.).sqrt() * t.abs();
        (F::one() + a) * F::exp(-a)
    }

    fn factor_deriv(&self, t: F) -> F {
        let a = F::cast(3.).sqrt() * t.abs();
        F::cast(-3.) * t * F::exp(-a)
    }

    fn factor_second_deriv(&self, t: F) -> F {
        let a = F::cast(3.).sqrt() * t.abs();
        F::cast(-3.) * (F::one() - a) * F::exp(-a)
    }
}

/// Matern 5/2 correlation model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Matern52Corr();

impl<F: Float> CorrelationModel<F> for Matern52Corr {
    /// (1 + sqrt(5) * |t| + 5/3 * t^2) exp( - sqrt(5) * |t| )
    fn factor(&self, t: F) -> F {
        let a = F::cast(5.).sqrt() * t.abs();
        (F::one() + a + a * a / F::cast(3.)) * F::exp(-a)
    }

    fn factor_deriv(&self, t: F) -> F {
        let a = F::cast(5.).sqrt() * t.abs();
        F::cast(-5. / 3.) * t * (F::one() + a) * F::exp(-a)
    }

    fn factor_second_deriv(&self, t: F) -> F {
        let a = F::cast(5.).sqrt() * t.abs();
        F::cast(-5. / 3.) * (F::one() + a - a * a) * F::exp(-a)
    }
}

macro_rules! declare_corr_util_impls {
    ($corr:ident) => {
        paste! {
            impl fmt::Display for [<$corr Corr>] {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{}", stringify!($corr))
                }
            }

            impl From<[<$corr Corr>]> for String {
                fn from(_item: [<$corr Corr>]) -> Self {
                    [<$corr Corr>]().to_string()
                }
            }

            impl TryFrom<String> for [<$corr Corr>] {
                type Error = &'static str;
                fn try_from(s: String) -> Result<Self, Self::Error> {
                    if s == stringify!($corr) {
                        Ok(Self::default())
                    } else {
                        Err(concat!("Bad string value for ", stringify!([<$corr Corr>]),
                            ", should be \'", stringify!($corr), "\'"))
                    }
                }
            }
        }
    };
}

declare_corr_util_impls!(SquaredExponential);
declare_corr_util_impls!(Matern32);
declare_corr_util_impls!(Matern52);

/// Correlation model selected at runtime, by name in options or in persisted records
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum KernelType {
    /// Squared exponential kernel
    #[default]
    SquaredExponential,
    /// Matern 3/2 kernel
    Matern32,
    /// Matern 5/2 kernel
    Matern52,
}

impl KernelType {
    /// Option name of the kernel
    pub fn name(&self) -> &'static str {
        match self {
            KernelType::SquaredExponential => "squared exponential",
            KernelType::Matern32 => "Matern 3/2",
            KernelType::Matern52 => "Matern 5/2",
        }
    }
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for KernelType {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "squared exponential" => Ok(KernelType::SquaredExponential),
            "Matern 3/2" => Ok(KernelType::Matern32),
            "Matern 5/2" => Ok(KernelType::Matern52),
            other => Err(SurrogateError::ConfigError(format!(
                "unknown kernel `{other}`, should be one of `squared exponential`, \
                 `Matern 3/2` or `Matern 5/2`"
            ))),
        }
    }
}

impl From<KernelType> for String {
    fn from(item: KernelType) -> Self {
        item.name().to_string()
    }
}

impl TryFrom<String> for KernelType {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse().map_err(|e: SurrogateError| e.to_string())
    }
}

impl<F: Float> CorrelationModel<F> for KernelType {
    fn factor(&self, t: F) -> F {
        match self {
            KernelType::SquaredExponential => SquaredExponentialCorr().factor(t),
            KernelType::Matern32 => Matern32Corr().factor(t),
            KernelType::Matern52 => Matern52Corr().factor(t),
        }
    }

    fn factor_deriv(&self, t: F) -> F {
        match self {
            KernelType::SquaredExponential => SquaredExponentialCorr().factor_deriv(t),
            KernelType::Matern32 => Matern32Corr().factor_deriv(t),
            KernelType::Matern52 => Matern52Corr().factor_deriv(t),
        }
    }

    fn factor_second_deriv(&self, t: F) -> F {
        match self {
            KernelType::SquaredExponential => SquaredExponentialCorr().factor_second_deriv(t),
            KernelType::Matern32 => Matern32Corr().factor_second_deriv(t),
            KernelType::Matern52 => Matern52Corr().factor_second_deriv(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::DiffMatrix;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, array, Axis};

    #[test]
    fn test_squared_exponential() {
        let xt = array![[4.5], [1.2], [2.0], [3.0], [4.0]];
        let dm = DiffMatrix::new(&xt);
        let res = SquaredExponentialCorr::default().value(&dm.d, &arr1(&[f64::sqrt(0.2)]));
        let expected = array![
            [0.336552878364737],
            [0.5352614285189903],
            [0.7985162187593771],
            [0.9753099120283326],
            [0.9380049995307295],
            [0.7232502423798424],
            [0.4565760496233148],
            [0.9048374180359595],
            [0.6703200460356393],
            [0.9048374180359595]
        ];
        assert_abs_diff_eq!(res, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_squared_exponential_2d() {
        let xt = array![[0., 1.], [2., 3.], [4., 5.]];
        let dm = DiffMatrix::new(&xt);
        let res = SquaredExponentialCorr::default().value(&dm.d, &arr1(&[f64::sqrt(2.), 2.]));
        let expected = array![[6.14421235e-06], [1.42516408e-21], [6.14421235e-06]];
        assert_abs_diff_eq!(res, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_matern32_2d() {
        let xt = array![[0., 1.], [2., 3.], [4., 5.]];
        let dm = DiffMatrix::new(&xt);
        let res = Matern32Corr::default().value(&dm.d, &arr1(&[1., 2.]));
        let expected = array![[1.08539595e-03], [1.10776401e-07], [1.08539595e-03]];
        assert_abs_diff_eq!(res, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_matern52_2d() {
        let xt = array![[0., 1.], [2., 3.], [4., 5.]];
        let dm = DiffMatrix::new(&xt);
        let res = Matern52Corr::default().value(&dm.d, &arr1(&[1., 2.]));
        let expected = array![[6.62391590e-04], [1.02117882e-08], [6.62391590e-04]];
        assert_abs_diff_eq!(res, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_unit_diagonal() {
        let d = Array2::<f64>::zeros((3, 4));
        let theta = arr1(&[0.1, 1., 10., 100.]);
        for kernel in [
            KernelType::SquaredExponential,
            KernelType::Matern32,
            KernelType::Matern52,
        ] {
            assert_abs_diff_eq!(Array2::<f64>::ones((3, 1)), kernel.value(&d, &theta));
        }
    }

    #[test]
    fn test_kernel_names() {
        assert_eq!(KernelType::Matern32, "Matern 3/2".parse().unwrap());
        assert_eq!("squared exponential", KernelType::default().to_string());
        assert!(matches!(
            "matern 3/2".parse::<KernelType>(),
            Err(SurrogateError::ConfigError(_))
        ));
        assert_eq!(
            r#""Matern 5/2""#,
            serde_json::to_string(&KernelType::Matern52).unwrap()
        );
        assert_eq!("Matern52", Matern52Corr().to_string());
        assert_eq!(
            Matern32Corr(),
            Matern32Corr::try_from("Matern32".to_string()).unwrap()
        );
    }

    macro_rules! test_correlation {
        ($corr:ident) => {
            paste! {
                #[test]
                fn [<test_corr_ $corr:snake _derivatives>]() {
                    let x = array![0.3, -0.4];
                    let xt = array![
                        [-0.9375, -0.5625],
                        [-0.5625, -0.4375],
                        [0.9375, 0.1875],
                        [0.8125, 0.5625],
                        [-0.4375, -0.0625],
                        [0.6875, -0.3125],
                        [0.4375, 0.9375],
                        [0.3125, 0.4375],
                        [0.5625, -0.8125],
                        [-0.8125, 0.3125]
                    ];
                    let theta = array![1.3, 0.7];
                    let corr = KernelType::$corr;
                    let jac = corr.jacobian(&x, &xt, &theta);
                    let hess = corr.hessian(&x, &xt, &theta);

                    let e = 1e-5;
                    for k in 0..2 {
                        let mut xp = x.clone();
                        xp[k] += e;
                        let mut xm = x.clone();
                        xm[k] -= e;
                        let rp = corr.value(&differences(&xp, &xt), &theta);
                        let rm = corr.value(&differences(&xm, &xt), &theta);
                        let fdiff = ((rp - rm) / (2. * e)).column(0).to_owned();
                        assert_abs_diff_eq!(fdiff, jac.column(k), epsilon = 1e-6);

                        let jp = corr.jacobian(&xp, &xt, &theta);
                        let jm = corr.jacobian(&xm, &xt, &theta);
                        let fdiff2 = (jp - jm) / (2. * e);
                        assert_abs_diff_eq!(
                            fdiff2,
                            hess.index_axis(Axis(2), k),
                            epsilon = 1e-5
                        );
                    }
                    for h in hess.outer_iter() {
                        assert_abs_diff_eq!(h, h.t());
                    }
                }
            }
        };
    }

    test_correlation!(SquaredExponential);
    test_correlation!(Matern32);
    test_correlation!(Matern52);
}
