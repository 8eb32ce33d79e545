use crate::errors::{Result, SurrogateError};
use linfa::Float;
use ndarray::{s, Array2, ArrayBase, Data, Ix1, Ix2};

/// A structure to retain absolute differences computation used to compute covariance matrix
#[derive(Debug)]
pub struct DiffMatrix<F: Float> {
    /// Differences as (n_obs * (n_obs-1))/2, nx) array
    pub d: Array2<F>,
    /// Indices of the differences in the original data array
    pub d_indices: Array2<usize>,
    /// Number of observations
    pub n_obs: usize,
}

impl<F: Float> DiffMatrix<F> {
    /// Compute differences given points given as an array (n_obs, nx)
    pub fn new(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> DiffMatrix<F> {
        let (d, d_indices) = Self::cross_diff(x);
        let n_obs = x.nrows();

        DiffMatrix {
            d,
            d_indices,
            n_obs,
        }
    }

    /// Pairs of indices of identical observations
    pub fn duplicates(&self) -> Vec<(usize, usize)> {
        self.d
            .rows()
            .into_iter()
            .zip(self.d_indices.rows())
            .filter(|(d, _)| d.iter().all(|v| *v == F::zero()))
            .map(|(_, idx)| (idx[0], idx[1]))
            .collect()
    }

    fn cross_diff(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> (Array2<F>, Array2<usize>) {
        let n_obs = x.nrows();
        let nx = x.ncols();
        let n_non_zero_cross_dist = n_obs * n_obs.saturating_sub(1) / 2;
        let mut indices = Array2::<usize>::zeros((n_non_zero_cross_dist, 2));
        let mut d = Array2::zeros((n_non_zero_cross_dist, nx));
        let mut idx = 0;
        for k in 0..n_obs.saturating_sub(1) {
            let idx0 = idx;
            idx = idx0 + n_obs - k - 1;

            for i in (k + 1)..n_obs {
                let r = idx0 + i - k - 1;
                indices[[r, 0]] = k;
                indices[[r, 1]] = i;
            }

            let diff = &x.slice(s![k, ..]) - &x.slice(s![k + 1..n_obs, ..]);
            d.slice_mut(s![idx0..idx, ..]).assign(&diff);
        }
        d.mapv_inplace(|v| v.abs());

        (d, indices)
    }
}

/// Computes differences between x and each element of y
/// resulting in a 2d array of shape (nrows(y), ncols(x));
/// *Panics* if x and y have not the same number of components
pub fn differences<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix1>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(x.len() == y.ncols());
    x.to_owned() - y
}

/// Check training samples `x` (n, nx) and responses `y` (n,) are consistent and finite
pub(crate) fn check_samples<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(SurrogateError::DimensionMismatch(format!(
            "at least one sample of at least one variable is required, got {:?} samples",
            x.dim()
        )));
    }
    if x.nrows() != y.len() {
        return Err(SurrogateError::DimensionMismatch(format!(
            "{} samples given with {} responses",
            x.nrows(),
            y.len()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(SurrogateError::ConfigError(
            "training samples and responses should be finite".to_string(),
        ));
    }
    Ok(())
}

/// Check evaluation points `x` have the `nx` components of the fitted model
pub(crate) fn check_points<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    nx: usize,
) -> Result<()> {
    if x.ncols() != nx {
        return Err(SurrogateError::DimensionMismatch(format!(
            "points should have {nx} components, got {}",
            x.ncols()
        )));
    }
    Ok(())
}

/// Conversion to f64 used to drive the optimizer
#[inline]
pub(crate) fn into_f64<F: Float>(v: &F) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_differences() {
        let x = array![-0.9486833];
        let y = array![
            [-1.26491106],
            [-0.63245553],
            [0.],
            [0.63245553],
            [1.26491106]
        ];
        assert_abs_diff_eq!(
            &array![
                [0.31622777],
                [-0.31622777],
                [-0.9486833],
                [-1.58113883],
                [-2.21359436],
            ],
            &differences(&x, &y),
            epsilon = 1e-6
        )
    }

    #[test]
    fn test_diff_matrix() {
        let xt = array![[0.5], [1.2], [2.0], [3.0], [4.0]];
        let expected = (
            array![
                [0.7],
                [1.5],
                [2.5],
                [3.5],
                [0.8],
                [1.8],
                [2.8],
                [1.],
                [2.],
                [1.]
            ],
            array![
                [0, 1],
                [0, 2],
                [0, 3],
                [0, 4],
                [1, 2],
                [1, 3],
                [1, 4],
                [2, 3],
                [2, 4],
                [3, 4]
            ],
        );
        let dm = DiffMatrix::new(&xt);
        assert_abs_diff_eq!(expected.0, dm.d, epsilon = 1e-12);
        assert_eq!(expected.1, dm.d_indices);
        assert!(dm.duplicates().is_empty());
    }

    #[test]
    fn test_duplicates() {
        let xt = array![[0.5, 1.], [1.2, 0.], [0.5, 1.], [1.2, 1.]];
        assert_eq!(vec![(0, 2)], DiffMatrix::new(&xt).duplicates());
        assert_eq!(0, DiffMatrix::new(&array![[1.]]).d.nrows());
    }

    #[test]
    fn test_check_samples() {
        let x = array![[1., 2.], [3., 4.]];
        assert!(check_samples(&x, &array![1., 2.]).is_ok());
        assert!(matches!(
            check_samples(&x, &array![1., 2., 3.]),
            Err(SurrogateError::DimensionMismatch(_))
        ));
        assert!(matches!(
            check_samples(&Array2::<f64>::zeros((0, 2)), &ndarray::Array1::zeros(0)),
            Err(SurrogateError::DimensionMismatch(_))
        ));
        assert!(matches!(
            check_samples(&x, &array![1., f64::NAN]),
            Err(SurrogateError::ConfigError(_))
        ));
        assert!(matches!(
            check_samples(&array![[1., f64::NEG_INFINITY], [3., 4.]], &array![1., 2.]),
            Err(SurrogateError::ConfigError(_))
        ));
        assert!(check_points(&x, 2).is_ok());
        assert!(check_points(&x, 3).is_err());
    }
}
