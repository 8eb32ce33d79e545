//! Common interface of the fitted surrogate models
//!
//! [Surrogate] gives a uniform access to prediction and derivatives of
//! a fitted model as well as its persistence, [SurrogateModel] gathers the
//! model kinds available in a closed enumeration.

use crate::errors::{Result, SurrogateError};
use crate::gp_algorithm::GaussianProcess;
use crate::persistence::{self, SurrogateFileFormat};
use crate::poly_algorithm::PolynomialRegression;

use ndarray::{Array1, Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of surrogate models
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurrogateKind {
    /// [PolynomialRegression] model
    PolynomialRegression,
    /// [GaussianProcess] model
    GaussianProcess,
}

impl fmt::Display for SurrogateKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SurrogateKind::PolynomialRegression => "polynomial regression",
            SurrogateKind::GaussianProcess => "gaussian process",
        };
        write!(f, "{name}")
    }
}

/// A fitted surrogate model of a scalar response
pub trait Surrogate: fmt::Display + Send + Sync {
    /// Kind of the model
    fn kind(&self) -> SurrogateKind;
    /// Input dimension, `None` if the model is not fitted
    fn dims(&self) -> Option<usize>;
    /// Predict values at (n, nx) points, returns (n,) values
    fn value(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>>;
    /// Predict gradients of the `response` at (n, nx) points, returns (n, nx) derivatives
    fn gradient(&self, x: &ArrayView2<f64>, response: usize) -> Result<Array2<f64>>;
    /// Predict hessians of the `response` at (n, nx) points, returns (n, nx, nx) symmetric matrices
    fn hessian(&self, x: &ArrayView2<f64>, response: usize) -> Result<Array3<f64>>;
    /// Save the model in the given file and format
    fn save(&self, path: &str, format: SurrogateFileFormat) -> Result<()>;
    /// Replace the model with the one stored in the given file.
    /// The model is left untouched on error.
    fn load(&mut self, path: &str, format: SurrogateFileFormat) -> Result<()>;
}

/// Only scalar responses are modeled
fn check_response(response: usize) -> Result<()> {
    if response != 0 {
        return Err(SurrogateError::DimensionMismatch(format!(
            "response index should be 0 (single output), got {response}"
        )));
    }
    Ok(())
}

impl Surrogate for PolynomialRegression<f64> {
    fn kind(&self) -> SurrogateKind {
        SurrogateKind::PolynomialRegression
    }
    fn dims(&self) -> Option<usize> {
        PolynomialRegression::dims(self)
    }
    fn value(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        PolynomialRegression::value(self, x)
    }
    fn gradient(&self, x: &ArrayView2<f64>, response: usize) -> Result<Array2<f64>> {
        check_response(response)?;
        PolynomialRegression::gradient(self, x)
    }
    fn hessian(&self, x: &ArrayView2<f64>, response: usize) -> Result<Array3<f64>> {
        check_response(response)?;
        PolynomialRegression::hessian(self, x)
    }
    fn save(&self, path: &str, format: SurrogateFileFormat) -> Result<()> {
        persistence::save_poly(self, path, format)
    }
    fn load(&mut self, path: &str, format: SurrogateFileFormat) -> Result<()> {
        persistence::load_poly(path, format, self)
    }
}

impl Surrogate for GaussianProcess<f64> {
    fn kind(&self) -> SurrogateKind {
        SurrogateKind::GaussianProcess
    }
    fn dims(&self) -> Option<usize> {
        GaussianProcess::dims(self)
    }
    fn value(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        GaussianProcess::value(self, x)
    }
    fn gradient(&self, x: &ArrayView2<f64>, response: usize) -> Result<Array2<f64>> {
        check_response(response)?;
        GaussianProcess::gradient(self, x)
    }
    fn hessian(&self, x: &ArrayView2<f64>, response: usize) -> Result<Array3<f64>> {
        check_response(response)?;
        GaussianProcess::hessian(self, x)
    }
    fn save(&self, path: &str, format: SurrogateFileFormat) -> Result<()> {
        persistence::save_gp(self, path, format)
    }
    fn load(&mut self, path: &str, format: SurrogateFileFormat) -> Result<()> {
        persistence::load_gp(path, format, self)
    }
}

/// A surrogate model of any kind
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SurrogateModel {
    /// A fitted polynomial regression
    PolynomialRegression(PolynomialRegression<f64>),
    /// A fitted gaussian process
    GaussianProcess(GaussianProcess<f64>),
}

impl From<PolynomialRegression<f64>> for SurrogateModel {
    fn from(model: PolynomialRegression<f64>) -> Self {
        SurrogateModel::PolynomialRegression(model)
    }
}

impl From<GaussianProcess<f64>> for SurrogateModel {
    fn from(model: GaussianProcess<f64>) -> Self {
        SurrogateModel::GaussianProcess(model)
    }
}

impl SurrogateModel {
    fn inner(&self) -> &dyn Surrogate {
        match self {
            SurrogateModel::PolynomialRegression(model) => model,
            SurrogateModel::GaussianProcess(model) => model,
        }
    }

    /// Load a model of any kind from the given file
    pub fn from_file(path: &str, format: SurrogateFileFormat) -> Result<Self> {
        persistence::load_surrogate(path, format)
    }

    pub(crate) fn check_consistency(&self) -> Result<()> {
        match self {
            SurrogateModel::PolynomialRegression(model) => model.check_consistency(),
            SurrogateModel::GaussianProcess(model) => model.check_consistency(),
        }
    }
}

impl fmt::Display for SurrogateModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.inner().fmt(f)
    }
}

impl Surrogate for SurrogateModel {
    fn kind(&self) -> SurrogateKind {
        self.inner().kind()
    }
    fn dims(&self) -> Option<usize> {
        self.inner().dims()
    }
    fn value(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        self.inner().value(x)
    }
    fn gradient(&self, x: &ArrayView2<f64>, response: usize) -> Result<Array2<f64>> {
        self.inner().gradient(x, response)
    }
    fn hessian(&self, x: &ArrayView2<f64>, response: usize) -> Result<Array3<f64>> {
        self.inner().hessian(x, response)
    }
    fn save(&self, path: &str, format: SurrogateFileFormat) -> Result<()> {
        persistence::save_surrogate(self, path, format)
    }
    fn load(&mut self, path: &str, format: SurrogateFileFormat) -> Result<()> {
        *self = persistence::load_surrogate(path, format)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array, Axis};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;
    use serde_json::json;

    fn training_data() -> (Array2<f64>, Array1<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let xt = Array::random_using((10, 2), Uniform::new(-1., 1.), &mut rng);
        let yt = xt.map_axis(Axis(1), |r| r[0] * r[0] + 2. * r[0] * r[1] + 3. * r[1]);
        (xt, yt)
    }

    fn models() -> Vec<Box<dyn Surrogate>> {
        let (xt, yt) = training_data();
        let pr = PolynomialRegression::new(&xt, &yt, &json!({"max degree": 2})).unwrap();
        let gp = GaussianProcess::new(&xt, &yt, &json!({})).unwrap();
        vec![
            Box::new(pr.clone()),
            Box::new(gp.clone()),
            Box::new(SurrogateModel::from(pr)),
            Box::new(SurrogateModel::from(gp)),
        ]
    }

    #[test]
    fn test_surrogate_interface() {
        let x = array![[0.1, 0.4], [-0.3, 0.2]];
        for model in models() {
            assert_eq!(Some(2), model.dims());
            let y = model.value(&x.view()).unwrap();
            assert_abs_diff_eq!(array![1.29, 0.57], y, epsilon = 0.2);
            let grad = model.gradient(&x.view(), 0).unwrap();
            assert_eq!((2, 2), grad.dim());
            let hess = model.hessian(&x.view(), 0).unwrap();
            assert_eq!((2, 2, 2), hess.dim());
            assert_abs_diff_eq!(hess[[1, 0, 1]], hess[[1, 1, 0]], epsilon = 1e-10);
            assert!(!model.to_string().is_empty());
        }
    }

    #[test]
    fn test_bad_response_index() {
        let x = array![[0.1, 0.4]];
        for model in models() {
            assert!(matches!(
                model.gradient(&x.view(), 1),
                Err(SurrogateError::DimensionMismatch(_))
            ));
            assert!(matches!(
                model.hessian(&x.view(), 2),
                Err(SurrogateError::DimensionMismatch(_))
            ));
        }
    }

    #[test]
    fn test_unfitted() {
        let x = array![[0.1, 0.4]];
        let unfitted: Vec<Box<dyn Surrogate>> = vec![
            Box::<PolynomialRegression<f64>>::default(),
            Box::<GaussianProcess<f64>>::default(),
        ];
        for model in unfitted {
            assert_eq!(None, model.dims());
            assert!(matches!(
                model.value(&x.view()),
                Err(SurrogateError::NotFitted)
            ));
            assert!(matches!(
                model.gradient(&x.view(), 0),
                Err(SurrogateError::NotFitted)
            ));
        }
    }

    #[test]
    fn test_kind() {
        let (xt, yt) = training_data();
        let model = SurrogateModel::from(PolynomialRegression::new(&xt, &yt, &json!({})).unwrap());
        assert_eq!(SurrogateKind::PolynomialRegression, model.kind());
        assert_eq!("polynomial regression", model.kind().to_string());
    }
}
