use crate::utils::into_f64;
use linfa::Float;
use ndarray::{arr1, s, Array, Array1, Array2, Zip};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

pub(crate) struct CobylaParams {
    pub rhobeg: f64,
    pub ftol_rel: f64,
    pub maxeval: usize,
}

impl Default for CobylaParams {
    fn default() -> Self {
        CobylaParams {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: 200,
        }
    }
}

/// Build the optimization starting points on log10 scale: the given `param0` first
/// (clamped within bounds), then `n_start` points drawn uniformly within `bounds` with a `seed`ed generator.
/// Returns (n_start + 1, nparams) starting points and log10 bounds.
pub(crate) fn prepare_multistart<F: Float>(
    n_start: usize,
    param0: &Array1<F>,
    bounds: &[(F, F)],
    seed: u64,
) -> (Array2<f64>, Vec<(f64, f64)>) {
    // Use log10 params as optimization parameters
    let bounds: Vec<(f64, f64)> = bounds
        .iter()
        .map(|(lo, up)| (into_f64(lo).log10(), into_f64(up).log10()))
        .collect();

    let mut params0 = Array2::zeros((n_start + 1, param0.len()));
    Zip::from(params0.row_mut(0))
        .and(param0)
        .and(&bounds)
        .for_each(|p, v, (lo, up)| *p = into_f64(v).log10().clamp(*lo, *up));

    if n_start > 0 {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let unit = Array::random_using((n_start, bounds.len()), Uniform::new(0., 1.), &mut rng);
        let lower = arr1(&bounds.iter().map(|b| b.0).collect::<Vec<_>>());
        let width = arr1(&bounds.iter().map(|b| b.1 - b.0).collect::<Vec<_>>());
        Zip::from(params0.slice_mut(s![1.., ..]).rows_mut())
            .and(unit.rows())
            .for_each(|mut p, u| p.assign(&(&u * &width + &lower)));
    }
    (params0, bounds)
}

/// Optimize hyper parameters given an initial guess and bounds with cobyla.
/// Returns the best objective value (infinite when optimization failed) and parameters.
pub(crate) fn optimize_params<ObjF>(
    objfn: ObjF,
    param0: &Array1<f64>,
    bounds: &[(f64, f64)],
    cobyla: CobylaParams,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64]) -> f64,
{
    use cobyla::{minimize, Func, RhoBeg, StopTols};

    let cons: Vec<&dyn Func<()>> = vec![];
    let param0 = param0.to_vec();

    match minimize(
        |x: &[f64], _u: &mut ()| objfn(x),
        &param0,
        bounds,
        &cons,
        (),
        cobyla.maxeval,
        RhoBeg::All(cobyla.rhobeg),
        Some(StopTols {
            ftol_rel: cobyla.ftol_rel,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let fval = if f64::is_nan(fval) {
                f64::INFINITY
            } else {
                fval
            };
            (fval, arr1(&x_opt))
        }
        Err((status, x_opt, _)) => {
            log::warn!("Cobyla optimizer failed in hyperparameters optimization status={status:?}");
            (f64::INFINITY, arr1(&x_opt))
        }
    }
}
