//! A module for input data scaling applied before basis and correlation evaluations.
//!
//! The following scalers are implemented:
//! * none (identity, no arithmetic at all),
//! * standardization,
//! * mean normalization,
//! * min-max normalization.
//!
//! All non identity scalers are per-feature affine maps `z = (x - offset) / scale`,
//! so their jacobian is the constant diagonal matrix `diag(1 / scale)`.
//! Normalized features may be stretched by a normalization factor `c`,
//! the scale becoming `(max - min) / c`.

use crate::errors::{Result, SurrogateError};
use linfa::Float;
use ndarray::{Array1, ArrayBase, ArrayView2, Axis, CowArray, Data, Ix2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of scaling applied to input samples
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScalerType {
    /// Samples are used as given
    #[default]
    None,
    /// `(x - mean) / std` with population standard deviation
    Standardization,
    /// `(x - mean) / (max - min)`
    MeanNormalization,
    /// `(x - min) / (max - min)`
    MinMaxNormalization,
}

impl fmt::Display for ScalerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ScalerType::None => "none",
            ScalerType::Standardization => "standardization",
            ScalerType::MeanNormalization => "mean normalization",
            ScalerType::MinMaxNormalization => "min max normalization",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ScalerType {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ScalerType::None),
            "standardization" | "standard" => Ok(ScalerType::Standardization),
            "mean normalization" => Ok(ScalerType::MeanNormalization),
            "min max normalization" => Ok(ScalerType::MinMaxNormalization),
            other => Err(SurrogateError::ConfigError(format!(
                "unknown scaler `{other}`, should be one of `none`, `standardization`, \
                 `mean normalization` or `min max normalization`"
            ))),
        }
    }
}

/// Per-feature affine map `z = (x - offset) / scale`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub struct AffineScaling<F: Float> {
    pub(crate) offset: Array1<F>,
    pub(crate) scale: Array1<F>,
}

impl<F: Float> AffineScaling<F> {
    /// Offset subtracted to each feature
    pub fn offset(&self) -> &Array1<F> {
        &self.offset
    }

    /// Factor dividing each feature once offset
    pub fn scale(&self) -> &Array1<F> {
        &self.scale
    }
}

/// A fitted scaler holding the state computed from training samples
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub enum DataScaler<F: Float> {
    /// Identity: transforms hand back the given data untouched
    #[default]
    NoScaler,
    /// Standardization state (mean, std)
    Standardization(AffineScaling<F>),
    /// Mean normalization state (mean, max - min)
    MeanNormalization(AffineScaling<F>),
    /// Min-max normalization state (min, max - min)
    MinMaxNormalization(AffineScaling<F>),
}

impl<F: Float> DataScaler<F> {
    /// Compute scaler state of given `kind` from `x` samples given as a (n, nx) matrix
    pub fn fit(kind: ScalerType, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Self {
        Self::fit_with_factor(kind, x, F::one())
    }

    /// Compute scaler state of given `kind` from `x` samples given as a (n, nx) matrix,
    /// normalized features being multiplied by `norm_factor`.
    ///
    /// `norm_factor` is ignored by the identity and standardization scalers.
    pub fn fit_with_factor(
        kind: ScalerType,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        norm_factor: F,
    ) -> Self {
        match kind {
            ScalerType::None => DataScaler::NoScaler,
            ScalerType::Standardization => {
                let mean = column_means(x);
                let std = x.std_axis(Axis(0), F::zero()).mapv(non_zero);
                DataScaler::Standardization(AffineScaling {
                    offset: mean,
                    scale: std,
                })
            }
            ScalerType::MeanNormalization => {
                let (min, max) = column_bounds(x);
                DataScaler::MeanNormalization(AffineScaling {
                    offset: column_means(x),
                    scale: (max - &min).mapv(non_zero) / norm_factor,
                })
            }
            ScalerType::MinMaxNormalization => {
                let (min, max) = column_bounds(x);
                let range = (max - &min).mapv(non_zero);
                DataScaler::MinMaxNormalization(AffineScaling {
                    offset: min,
                    scale: range / norm_factor,
                })
            }
        }
    }

    /// Kind of the scaler
    pub fn kind(&self) -> ScalerType {
        match self {
            DataScaler::NoScaler => ScalerType::None,
            DataScaler::Standardization(_) => ScalerType::Standardization,
            DataScaler::MeanNormalization(_) => ScalerType::MeanNormalization,
            DataScaler::MinMaxNormalization(_) => ScalerType::MinMaxNormalization,
        }
    }

    fn affine(&self) -> Option<&AffineScaling<F>> {
        match self {
            DataScaler::NoScaler => None,
            DataScaler::Standardization(a)
            | DataScaler::MeanNormalization(a)
            | DataScaler::MinMaxNormalization(a) => Some(a),
        }
    }

    /// Scale `x` points given as a (n, nx) matrix.
    pub fn transform<'a>(&self, x: ArrayView2<'a, F>) -> CowArray<'a, F, Ix2> {
        match self.affine() {
            None => CowArray::from(x),
            Some(a) => CowArray::from((&x - &a.offset) / &a.scale),
        }
    }

    /// Map scaled `z` points given as a (n, nx) matrix back to the original space.
    pub fn inverse_transform<'a>(&self, z: ArrayView2<'a, F>) -> CowArray<'a, F, Ix2> {
        match self.affine() {
            None => CowArray::from(z),
            Some(a) => CowArray::from(&z * &a.scale + &a.offset),
        }
    }

    /// Per-feature scale factors, `None` for the identity scaler.
    ///
    /// Derivatives wrt original inputs are derivatives wrt scaled inputs divided by these factors.
    pub fn scale_factors(&self) -> Option<&Array1<F>> {
        self.affine().map(|a| &a.scale)
    }

    /// Number of features handled by the scaler, `None` for the identity scaler.
    pub fn nfeatures(&self) -> Option<usize> {
        self.affine().map(|a| a.scale.len())
    }

    /// Whether the scaler state is consistent with `nx` features
    pub(crate) fn is_consistent(&self, nx: usize) -> bool {
        match self.affine() {
            None => true,
            Some(a) => {
                a.offset.len() == nx
                    && a.scale.len() == nx
                    && a.scale.iter().all(|s| s.is_finite() && *s != F::zero())
                    && a.offset.iter().all(|o| o.is_finite())
            }
        }
    }
}

impl<F: Float> fmt::Display for DataScaler<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

fn non_zero<F: Float>(v: F) -> F {
    if v == F::zero() {
        F::one()
    } else {
        v
    }
}

fn column_means<F: Float>(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
    x.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()))
}

fn column_bounds<F: Float>(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> (Array1<F>, Array1<F>) {
    let min = x.fold_axis(Axis(0), F::infinity(), |m, v| m.min(*v));
    let max = x.fold_axis(Axis(0), F::neg_infinity(), |m, v| m.max(*v));
    (min, max)
}
