//! This library implements surrogate models of scalar responses with analytic derivatives:
//!
//! * [PolynomialRegression]: least-squares fit of a polynomial basis of given max degree,
//!   parameterized by [PolyRegParams],
//! * [GaussianProcess]: [Kriging](https://en.wikipedia.org/wiki/Kriging) models with
//!   a polynomial trend and a stationary correlation kernel whose hyperparameters are
//!   optimized by maximizing the reduced likelihood, parameterized by [GpParams].
//!
//! Both models predict values, gradients and hessians at any points, inputs being
//! optionally scaled (see [DataScaler]). They share the [Surrogate] interface and can be
//! saved and reloaded exactly in text (JSON) or binary formats (see [persistence]).
//!
//! Models are either fitted from an options map as in
//!
//! ```no_run
//! use surrox::{GaussianProcess, Surrogate, SurrogateFileFormat};
//! use ndarray::array;
//! use serde_json::json;
//!
//! let xt = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
//! let yt = array![0.0, 1.0, 1.5, 0.9, 1.0];
//! let options = json!({"scaler name": "standardization", "Nugget": {"estimate nugget": true}});
//! let gp = GaussianProcess::new(&xt, &yt, &options).expect("GP fitted");
//!
//! let x = array![[1.5], [3.5]];
//! let grad = gp.gradient(&x).expect("GP gradients");
//! gp.save("gp.json", SurrogateFileFormat::Text).expect("GP saved");
//! ```
//!
//! or through the [linfa](https://github.com/rust-ml/linfa) `Fit` trait using the parameters builders.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
pub mod basis;
pub mod correlation_models;
mod errors;
mod gp_algorithm;
mod gp_parameters;
mod optimization;
pub mod persistence;
mod poly_algorithm;
mod poly_parameters;
mod scaler;
mod surrogates;
mod utils;

pub use basis::PolynomialBasis;
pub use correlation_models::KernelType;
pub use errors::*;
pub use gp_algorithm::*;
pub use gp_parameters::*;
pub use persistence::SurrogateFileFormat;
pub use poly_algorithm::*;
pub use poly_parameters::*;
pub use scaler::*;
pub use surrogates::*;
pub use utils::DiffMatrix;
