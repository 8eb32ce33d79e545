use linfa::prelude::{Dataset, Fit};
use ndarray::{array, Array, Array1, Array2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use serde_json::json;
use surrox::persistence::{load_gp, load_poly, save_gp, save_poly};
use surrox::{
    GaussianProcess, KernelType, PolynomialRegression, Surrogate, SurrogateFileFormat,
    SurrogateModel,
};

fn simple_func(x: &Array2<f64>) -> Array1<f64> {
    x.map_axis(Axis(1), |r| r[0] * r[0] + 2. * r[0] * r[1] + 3. * r[1])
}

fn main() -> surrox::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("SURROX_LOG", "info")).init();

    let mut rng = Xoshiro256Plus::seed_from_u64(44);
    let build_samples = Array::random_using((10, 2), Uniform::new(-1., 1.), &mut rng);
    let build_response = simple_func(&build_samples);
    let eval_samples = Array::random_using((10, 2), Uniform::new(-1., 1.), &mut rng);
    let eval_truth = simple_func(&eval_samples);
    let dpoint = array![[0.1, 0.4]];

    let out_dir = "target/demos";
    std::fs::create_dir_all(out_dir)?;

    // Polynomial regression
    let pr = PolynomialRegression::new(
        &build_samples,
        &build_response,
        &json!({"max degree": 2, "scaler type": "none"}),
    )?;
    println!("{pr}");
    println!("Truth:\n{eval_truth}");
    println!("Surrogate value:\n{}\n", pr.value(&eval_samples)?);
    println!("Surrogate gradient:\n{}\n", pr.gradient(&dpoint)?);
    println!("Surrogate Hessian:\n{}\n", pr.hessian(&dpoint)?);

    let poly_file = format!("{out_dir}/poly.json");
    println!("Saving Polynomial");
    save_poly(&pr, &poly_file, false.into())?;
    println!("Loading Polynomial");
    let prload = PolynomialRegression::<f64>::from_file(&poly_file, false.into())?;
    assert_eq!(pr.value(&dpoint)?, prload.value(&dpoint)?);

    let mut pr_target = PolynomialRegression::default();
    load_poly(&poly_file, SurrogateFileFormat::Text, &mut pr_target)?;
    println!("Loaded Surrogate:\n{}\n", pr_target.value(&eval_samples)?);

    // Gaussian process
    let config_opts = json!({"scaler name": "none", "Nugget": {"estimate nugget": true}});
    let gp = GaussianProcess::new(&build_samples, &build_response, &config_opts)?;
    let gp_eval_surr = gp.value(&eval_samples)?;
    println!("{gp}");
    println!("GP value:\n{gp_eval_surr}\n");
    println!("GP variance:\n{}\n", gp.variance(&eval_samples)?);
    println!("GP gradient:\n{}\n", gp.gradient(&dpoint)?);
    println!("GP Hessian:\n{}\n", gp.hessian(&dpoint)?);

    let gp_file = format!("{out_dir}/gp.bin");
    println!("Saving GP");
    save_gp(&gp, &gp_file, true.into())?;
    println!("Loading GP");
    let mut gpload = GaussianProcess::default();
    load_gp(&gp_file, true.into(), &mut gpload)?;
    assert_eq!(gp_eval_surr, gpload.value(&eval_samples)?);

    // Any kind of surrogate through the linfa builder and the common interface
    let surrogates: Vec<SurrogateModel> = vec![
        PolynomialRegression::<f64>::params(3)
            .fit(&Dataset::new(build_samples.clone(), build_response.clone()))?
            .into(),
        GaussianProcess::<f64>::params()
            .kernel(KernelType::Matern52)
            .fit(&Dataset::new(build_samples, build_response))?
            .into(),
    ];
    for surrogate in surrogates {
        let file = format!("{out_dir}/{}.json", surrogate.kind()).replace(' ', "_");
        surrogate.save(&file, SurrogateFileFormat::Text)?;
        let reloaded = SurrogateModel::from_file(&file, SurrogateFileFormat::Text)?;
        println!(
            "{} gradient at {dpoint}: {}",
            reloaded.kind(),
            reloaded.gradient(&dpoint.view(), 0)?
        );
    }
    Ok(())
}
