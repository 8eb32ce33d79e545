use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use linfa::prelude::{Dataset, Fit};
use ndarray::{Array, Array1, Array2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use surrox::{GaussianProcess, KernelType, PolynomialRegression};

fn training_data(nt: usize, dim: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let xt = Array::random_using((nt, dim), Uniform::new(-1., 1.), &mut rng);
    let yt = xt.map_axis(Axis(1), |x| {
        x.mapv(|v| v * v).sum() / 4. - x.mapv(|v| (3. * v).cos()).product()
    });
    (xt, yt)
}

fn criterion_poly(c: &mut Criterion) {
    let mut group = c.benchmark_group("poly");
    let (xt, yt) = training_data(200, 5);
    let xtest = training_data(100, 5).0;
    for degree in [1, 2, 3] {
        group.bench_with_input(BenchmarkId::new("fit", degree), &degree, |b, &degree| {
            b.iter(|| {
                std::hint::black_box(
                    PolynomialRegression::<f64>::params(degree)
                        .fit(&Dataset::new(xt.clone(), yt.clone()))
                        .expect("PR fitted"),
                )
            })
        });
        let pr = PolynomialRegression::<f64>::params(degree)
            .fit(&Dataset::new(xt.clone(), yt.clone()))
            .expect("PR fitted");
        group.bench_with_input(BenchmarkId::new("hessian", degree), &degree, |b, _| {
            b.iter(|| std::hint::black_box(pr.hessian(&xtest).expect("PR hessian")))
        });
    }
    group.finish();
}

fn criterion_gp(c: &mut Criterion) {
    let mut group = c.benchmark_group("gp");
    group.sample_size(10);
    let (xt, yt) = training_data(50, 3);
    let xtest = training_data(100, 3).0;
    for kernel in [
        KernelType::SquaredExponential,
        KernelType::Matern32,
        KernelType::Matern52,
    ] {
        group.bench_function(format!("fit {kernel}"), |b| {
            b.iter(|| {
                std::hint::black_box(
                    GaussianProcess::<f64>::params()
                        .kernel(kernel)
                        .fit(&Dataset::new(xt.clone(), yt.clone()))
                        .expect("GP fitted"),
                )
            })
        });
        let gp = GaussianProcess::<f64>::params()
            .kernel(kernel)
            .fit(&Dataset::new(xt.clone(), yt.clone()))
            .expect("GP fitted");
        group.bench_function(format!("gradient {kernel}"), |b| {
            b.iter(|| std::hint::black_box(gp.gradient(&xtest).expect("GP gradient")))
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_poly, criterion_gp);
criterion_main!(benches);
