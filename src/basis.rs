//! A module for the monomial basis used by polynomial regression
//! and by the trend term of the GP model.
//!
//! Terms are ordered in graded lexicographic order: grouped by total degree
//! from 0 to the max degree, then, within a degree, the term `x_i1 * ... * x_ik`
//! with `i1 <= ... <= ik` comes in lexicographic order of `(i1, ..., ik)`.
//! For instance with 2 variables and max degree 2:
//! `[1, x0, x1, x0^2, x0*x1, x1^2]`.
//!
//! A reduced basis drops interaction terms and keeps pure powers only,
//! ordered by degree then variable: `[1, x0, x1, x0^2, x1^2]`.

use crate::errors::{Result, SurrogateError};
use linfa::Float;
use ndarray::{Array2, Array3, ArrayBase, ArrayView1, Data, Ix1, Ix2, Zip};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// Shape of a polynomial basis, enough to rebuild its terms deterministically
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasisShape {
    /// Number of input variables
    pub nvars: usize,
    /// Maximum total degree of the terms
    pub max_degree: usize,
    /// Whether interaction terms are dropped
    pub reduced: bool,
}

/// A monomial basis of `nvars` variables up to `max_degree` total degree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BasisShape", try_from = "BasisShape")]
pub struct PolynomialBasis {
    shape: BasisShape,
    /// Exponents of each term as a (n_terms, nvars) matrix
    exponents: Array2<i32>,
}

/// Largest number of exponents (terms times variables) held by a basis
pub const MAX_BASIS_SIZE: usize = 1 << 24;

/// Number of terms of a basis of `nvars` variables up to `max_degree` total degree,
/// `None` when it overflows `usize`.
///
/// Full basis: `C(nvars + max_degree, max_degree)`, reduced basis: `1 + nvars * max_degree`.
pub fn n_terms(nvars: usize, max_degree: usize, reduced: bool) -> Option<usize> {
    if reduced {
        nvars.checked_mul(max_degree)?.checked_add(1)
    } else {
        // C(n + p, p) computed incrementally, each partial product is an exact binomial
        (1..=max_degree).try_fold(1usize, |acc, k| {
            acc.checked_mul(nvars.checked_add(k)?).map(|v| v / k)
        })
    }
}

impl PolynomialBasis {
    /// Full basis constructor
    pub fn new(nvars: usize, max_degree: usize) -> Result<Self> {
        Self::from_shape(BasisShape {
            nvars,
            max_degree,
            reduced: false,
        })
    }

    /// Reduced basis (no interaction terms) constructor
    pub fn reduced(nvars: usize, max_degree: usize) -> Result<Self> {
        Self::from_shape(BasisShape {
            nvars,
            max_degree,
            reduced: true,
        })
    }

    /// Basis constructor from its shape.
    ///
    /// Fails with [SurrogateError::SingularBasis] when the basis would hold
    /// more than [MAX_BASIS_SIZE] exponents.
    pub fn from_shape(shape: BasisShape) -> Result<Self> {
        let nt = n_terms(shape.nvars, shape.max_degree, shape.reduced)
            .filter(|nt| {
                nt.checked_mul(shape.nvars)
                    .is_some_and(|size| size <= MAX_BASIS_SIZE)
            })
            .ok_or_else(|| {
                SurrogateError::SingularBasis(format!(
                    "basis of {} variables up to degree {} is too large",
                    shape.nvars, shape.max_degree
                ))
            })?;
        let mut exponents = Array2::<i32>::zeros((nt, shape.nvars));
        let mut row = 1;
        let max_degree = if shape.nvars == 0 { 0 } else { shape.max_degree };
        for degree in 1..=max_degree {
            if shape.reduced {
                for var in 0..shape.nvars {
                    exponents[[row, var]] = degree as i32;
                    row += 1;
                }
            } else {
                let mut indices = vec![0; degree];
                loop {
                    for &var in indices.iter() {
                        exponents[[row, var]] += 1;
                    }
                    row += 1;
                    if !next_multiset(&mut indices, shape.nvars) {
                        break;
                    }
                }
            }
        }
        Ok(PolynomialBasis { shape, exponents })
    }

    /// Shape of the basis
    pub fn shape(&self) -> BasisShape {
        self.shape
    }

    /// Number of input variables
    pub fn nvars(&self) -> usize {
        self.shape.nvars
    }

    /// Number of terms
    pub fn n_terms(&self) -> usize {
        self.exponents.nrows()
    }

    /// Exponents of the terms as a (n_terms, nvars) matrix
    pub fn exponents(&self) -> &Array2<i32> {
        &self.exponents
    }

    /// Compute basis terms at the given `x` data points specified as (n, nvars) matrix.
    /// Returns a (n, n_terms) design matrix.
    pub fn value<F: Float>(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let mut res = Array2::<F>::zeros((x.nrows(), self.n_terms()));
        Zip::from(res.rows_mut())
            .and(x.rows())
            .for_each(|mut res_i, x_i| {
                Zip::from(&mut res_i)
                    .and(self.exponents.rows())
                    .for_each(|r, exps| *r = monomial(&x_i, exps));
            });
        res
    }

    /// Compute basis derivatives at the given `x` data point specified as (nvars,) vector.
    /// Returns a (n_terms, nvars) matrix: `jac[t, k] = d term_t / d x_k`
    pub fn jacobian<F: Float>(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Array2<F> {
        let mut jac = Array2::<F>::zeros((self.n_terms(), self.nvars()));
        for (t, exps) in self.exponents.rows().into_iter().enumerate() {
            let mut exps = exps.to_owned();
            for k in 0..self.nvars() {
                let e = exps[k];
                if e == 0 {
                    continue;
                }
                exps[k] = e - 1;
                jac[[t, k]] = F::cast(e) * monomial(x, exps.view());
                exps[k] = e;
            }
        }
        jac
    }

    /// Compute basis second derivatives at the given `x` data point specified as (nvars,) vector.
    /// Returns a (n_terms, nvars, nvars) array: `hess[t, k, l] = d2 term_t / dx_k dx_l`
    pub fn hessian<F: Float>(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Array3<F> {
        let nx = self.nvars();
        let mut hess = Array3::<F>::zeros((self.n_terms(), nx, nx));
        for (t, exps) in self.exponents.rows().into_iter().enumerate() {
            let mut exps = exps.to_owned();
            for k in 0..nx {
                let ek = exps[k];
                if ek == 0 {
                    continue;
                }
                exps[k] = ek - 1;
                for l in k..nx {
                    let el = exps[l];
                    if el == 0 {
                        continue;
                    }
                    exps[l] = el - 1;
                    let v = F::cast(ek * el) * monomial(x, exps.view());
                    exps[l] = el;
                    hess[[t, k, l]] = v;
                    hess[[t, l, k]] = v;
                }
                exps[k] = ek;
            }
        }
        hess
    }
}

impl fmt::Display for PolynomialBasis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}Polynomial(nvars={}, degree={})",
            if self.shape.reduced { "Reduced" } else { "" },
            self.shape.nvars,
            self.shape.max_degree
        )
    }
}

impl From<PolynomialBasis> for BasisShape {
    fn from(basis: PolynomialBasis) -> Self {
        basis.shape
    }
}

impl TryFrom<BasisShape> for PolynomialBasis {
    type Error = String;
    fn try_from(shape: BasisShape) -> std::result::Result<Self, Self::Error> {
        if shape.nvars == 0 {
            return Err("basis should have at least one variable".to_string());
        }
        PolynomialBasis::from_shape(shape).map_err(|err| err.to_string())
    }
}

/// Value of the monomial of exponents `exps` at `x`
fn monomial<F: Float>(x: &ArrayBase<impl Data<Elem = F>, Ix1>, exps: ArrayView1<i32>) -> F {
    Zip::from(x).and(exps).fold(F::one(), |acc, &xi, &e| {
        if e == 0 {
            acc
        } else {
            acc * xi.powi(e)
        }
    })
}

/// Advance `indices` (non decreasing variable indices) to the next multiset
/// in lexicographic order. Returns false when `indices` was the last one.
fn next_multiset(indices: &mut [usize], nvars: usize) -> bool {
    let k = indices.len();
    match (0..k).rev().find(|&i| indices[i] + 1 < nvars) {
        Some(i) => {
            let v = indices[i] + 1;
            indices[i..].iter_mut().for_each(|idx| *idx = v);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_n_terms() {
        assert_eq!(Some(1), n_terms(3, 0, false));
        assert_eq!(Some(4), n_terms(3, 1, false));
        assert_eq!(Some(10), n_terms(3, 2, false));
        assert_eq!(Some(6), n_terms(2, 2, false));
        assert_eq!(Some(35), n_terms(4, 3, false));
        assert_eq!(Some(7), n_terms(3, 2, true));
        for nvars in 1..5 {
            for degree in 0..5 {
                for reduced in [false, true] {
                    let basis = PolynomialBasis::from_shape(BasisShape {
                        nvars,
                        max_degree: degree,
                        reduced,
                    })
                    .unwrap();
                    assert_eq!(n_terms(nvars, degree, reduced), Some(basis.n_terms()));
                }
            }
        }
    }

    #[test]
    fn test_too_large_basis() {
        assert_eq!(None, n_terms(64, 64, false));
        assert_eq!(None, n_terms(usize::MAX, 2, true));
        assert_eq!(Some(129), n_terms(64, 2, true));
        for (nvars, degree) in [(64, 64), (64, 8)] {
            assert!(matches!(
                PolynomialBasis::new(nvars, degree),
                Err(SurrogateError::SingularBasis(_))
            ));
        }
        assert!(PolynomialBasis::reduced(64, 64).is_ok());
        assert!(serde_json::from_str::<PolynomialBasis>(
            r#"{"nvars":64,"max_degree":64,"reduced":false}"#
        )
        .is_err());
    }

    #[test]
    fn test_graded_lex_order() {
        let basis = PolynomialBasis::new(2, 3).unwrap();
        assert_eq!(
            array![
                [0, 0],
                [1, 0],
                [0, 1],
                [2, 0],
                [1, 1],
                [0, 2],
                [3, 0],
                [2, 1],
                [1, 2],
                [0, 3]
            ],
            *basis.exponents()
        );
        let reduced = PolynomialBasis::reduced(2, 2).unwrap();
        assert_eq!(
            array![[0, 0], [1, 0], [0, 1], [2, 0], [0, 2]],
            *reduced.exponents()
        );
    }

    #[test]
    fn test_quadratic() {
        // same terms and order as a full quadratic basis
        let a = array![[1., 2., 3.], [3., 4., 5.]];
        let actual = PolynomialBasis::new(3, 2).unwrap().value(&a);
        let expected = array![
            [1.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 4.0, 6.0, 9.0],
            [1.0, 3.0, 4.0, 5.0, 9.0, 12.0, 15.0, 16.0, 20.0, 25.0]
        ];
        assert_abs_diff_eq!(expected, actual);
    }

    #[test]
    fn test_quadratic_jac() {
        let expected = array![
            [0., 0., 0.],
            [1., 0., 0.],
            [0., 1., 0.],
            [0., 0., 1.],
            [2., 0., 0.],
            [2., 1., 0.],
            [3., 0., 1.],
            [0., 4., 0.],
            [0., 3., 2.],
            [0., 0., 6.]
        ];
        assert_abs_diff_eq!(
            expected,
            PolynomialBasis::new(3, 2).unwrap().jacobian(&array![1., 2., 3.])
        );
    }

    #[test]
    fn test_cubic_hessian() {
        let basis = PolynomialBasis::new(2, 3).unwrap();
        let x = array![0.5, -2.];
        let hess = basis.hessian(&x);
        // x0^2 * x1
        assert_abs_diff_eq!(
            array![[2. * -2., 2. * 0.5], [2. * 0.5, 0.]],
            hess.index_axis(ndarray::Axis(0), 7)
        );
        // x1^3
        assert_abs_diff_eq!(
            array![[0., 0.], [0., 6. * -2.]],
            hess.index_axis(ndarray::Axis(0), 9)
        );
        // constant and linear terms have no curvature
        for t in 0..3 {
            assert_abs_diff_eq!(
                Array2::<f64>::zeros((2, 2)),
                hess.index_axis(ndarray::Axis(0), t)
            );
        }
    }

    #[test]
    fn test_jacobian_vs_finite_differences() {
        let basis = PolynomialBasis::new(3, 3).unwrap();
        let x = array![0.3, -0.7, 1.1];
        let jac = basis.jacobian(&x);
        let e = 1e-6;
        for k in 0..3 {
            let mut xp = x.clone();
            xp[k] += e;
            let mut xm = x.clone();
            xm[k] -= e;
            let vp = basis.value(&xp.insert_axis(ndarray::Axis(0)));
            let vm = basis.value(&xm.insert_axis(ndarray::Axis(0)));
            let fd: Array1<f64> = ((vp - vm) / (2. * e)).row(0).to_owned();
            assert_abs_diff_eq!(fd, jac.column(k), epsilon = 1e-8);
        }
    }

    #[test]
    fn test_utils() {
        assert_eq!(
            "Polynomial(nvars=2, degree=3)",
            PolynomialBasis::new(2, 3).unwrap().to_string()
        );
        let json = serde_json::to_string(&PolynomialBasis::reduced(4, 2).unwrap()).unwrap();
        assert_eq!(r#"{"nvars":4,"max_degree":2,"reduced":true}"#, json);
        let basis: PolynomialBasis = serde_json::from_str(&json).unwrap();
        assert_eq!(PolynomialBasis::reduced(4, 2).unwrap(), basis);
        assert!(serde_json::from_str::<PolynomialBasis>(
            r#"{"nvars":0,"max_degree":2,"reduced":true}"#
        )
        .is_err());
    }
}
