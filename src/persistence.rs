//! Save and load fitted surrogates
//!
//! A record holds a magic tag, a format version and the model tagged with its kind.
//! It is written either as pretty printed JSON ([SurrogateFileFormat::Text])
//! or with bincode fixed-width little-endian encoding ([SurrogateFileFormat::Binary]).
//! Both formats reload models exactly.

use crate::errors::{Result, SurrogateError};
use crate::gp_algorithm::GaussianProcess;
use crate::poly_algorithm::PolynomialRegression;
use crate::surrogates::SurrogateModel;

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

/// Tag starting every record
pub const RECORD_MAGIC: &str = "surrox";
/// Version of the record layout
pub const RECORD_VERSION: u32 = 1;

/// File formats of saved surrogates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SurrogateFileFormat {
    /// Human readable format (JSON)
    #[default]
    Text,
    /// Binary format
    Binary,
}

impl From<bool> for SurrogateFileFormat {
    /// `true` stands for binary
    fn from(binary: bool) -> Self {
        if binary {
            SurrogateFileFormat::Binary
        } else {
            SurrogateFileFormat::Text
        }
    }
}

/// Borrowed model written in a record
#[derive(Serialize)]
enum ModelRef<'a> {
    PolynomialRegression(&'a PolynomialRegression<f64>),
    GaussianProcess(&'a GaussianProcess<f64>),
}

#[derive(Serialize)]
struct RecordRef<'a> {
    magic: &'a str,
    version: u32,
    model: ModelRef<'a>,
}

#[derive(Deserialize)]
struct RecordHeader {
    magic: String,
    version: u32,
}

#[derive(Deserialize)]
struct Record {
    #[allow(dead_code)]
    magic: String,
    #[allow(dead_code)]
    version: u32,
    model: SurrogateModel,
}

fn encode(model: ModelRef, format: SurrogateFileFormat) -> Result<Vec<u8>> {
    let record = RecordRef {
        magic: RECORD_MAGIC,
        version: RECORD_VERSION,
        model,
    };
    match format {
        SurrogateFileFormat::Text => serde_json::to_vec_pretty(&record)
            .map_err(|err| SurrogateError::SaveError(format!("JSON encoding ({err})"))),
        SurrogateFileFormat::Binary => bincode::serialize(&record)
            .map_err(|err| SurrogateError::SaveError(format!("binary encoding ({err})"))),
    }
}

fn decode_from<'a, T: Deserialize<'a>>(data: &'a [u8], format: SurrogateFileFormat) -> Result<T> {
    match format {
        SurrogateFileFormat::Text => serde_json::from_slice(data)
            .map_err(|err| SurrogateError::CorruptRecord(format!("JSON decoding ({err})"))),
        SurrogateFileFormat::Binary => bincode::deserialize(data)
            .map_err(|err| SurrogateError::CorruptRecord(format!("binary decoding ({err})"))),
    }
}

fn decode(data: &[u8], format: SurrogateFileFormat) -> Result<SurrogateModel> {
    let header: RecordHeader = decode_from(data, format)?;
    if header.magic != RECORD_MAGIC {
        return Err(SurrogateError::CorruptRecord(format!(
            "bad magic tag `{}`",
            header.magic
        )));
    }
    if header.version != RECORD_VERSION {
        return Err(SurrogateError::CorruptRecord(format!(
            "unsupported record version {}, expected {RECORD_VERSION}",
            header.version
        )));
    }
    let record: Record = decode_from(data, format)?;
    record.model.check_consistency()?;
    Ok(record.model)
}

fn write_record(model: ModelRef, path: &str, format: SurrogateFileFormat) -> Result<()> {
    let bytes = encode(model, format)?;
    let mut file = fs::File::create(path)?;
    file.write_all(&bytes)?;
    debug!("Surrogate saved in {path} ({} bytes, {format:?})", bytes.len());
    Ok(())
}

/// Save a fitted polynomial regression in the given file
pub fn save_poly(
    model: &PolynomialRegression<f64>,
    path: &str,
    format: SurrogateFileFormat,
) -> Result<()> {
    model.fitted()?;
    write_record(ModelRef::PolynomialRegression(model), path, format)
}

/// Save a fitted gaussian process in the given file
pub fn save_gp(model: &GaussianProcess<f64>, path: &str, format: SurrogateFileFormat) -> Result<()> {
    model.fitted()?;
    write_record(ModelRef::GaussianProcess(model), path, format)
}

/// Save a fitted surrogate of any kind in the given file
pub fn save_surrogate(model: &SurrogateModel, path: &str, format: SurrogateFileFormat) -> Result<()> {
    match model {
        SurrogateModel::PolynomialRegression(pr) => save_poly(pr, path, format),
        SurrogateModel::GaussianProcess(gp) => save_gp(gp, path, format),
    }
}

/// Load a surrogate of any kind from the given file
pub fn load_surrogate(path: &str, format: SurrogateFileFormat) -> Result<SurrogateModel> {
    let data = fs::read(path)?;
    decode(&data, format)
        .map_err(|err| match err {
            SurrogateError::CorruptRecord(msg) => {
                SurrogateError::CorruptRecord(format!("Error while loading from {path}: {msg}"))
            }
            err => err,
        })
}

/// Load a polynomial regression from the given file into `target`.
/// `target` is left untouched on error.
pub fn load_poly(
    path: &str,
    format: SurrogateFileFormat,
    target: &mut PolynomialRegression<f64>,
) -> Result<()> {
    match load_surrogate(path, format)? {
        SurrogateModel::PolynomialRegression(model) => {
            *target = model;
            Ok(())
        }
        SurrogateModel::GaussianProcess(_) => Err(SurrogateError::CorruptRecord(format!(
            "{path} holds a gaussian process, not a polynomial regression"
        ))),
    }
}

/// Load a gaussian process from the given file into `target`.
/// `target` is left untouched on error.
pub fn load_gp(
    path: &str,
    format: SurrogateFileFormat,
    target: &mut GaussianProcess<f64>,
) -> Result<()> {
    match load_surrogate(path, format)? {
        SurrogateModel::GaussianProcess(model) => {
            *target = model;
            Ok(())
        }
        SurrogateModel::PolynomialRegression(_) => Err(SurrogateError::CorruptRecord(format!(
            "{path} holds a polynomial regression, not a gaussian process"
        ))),
    }
}

impl PolynomialRegression<f64> {
    /// Load a polynomial regression from the given file
    pub fn from_file(path: &str, format: SurrogateFileFormat) -> Result<Self> {
        let mut model = Self::default();
        load_poly(path, format, &mut model)?;
        Ok(model)
    }
}

impl GaussianProcess<f64> {
    /// Load a gaussian process from the given file
    pub fn from_file(path: &str, format: SurrogateFileFormat) -> Result<Self> {
        let mut model = Self::default();
        load_gp(path, format, &mut model)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surrogates::Surrogate;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array, Array1, Array2, Axis};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;
    use serde_json::json;

    const TEST_DIR: &str = "target/tests";

    fn test_path(name: &str) -> String {
        fs::create_dir_all(TEST_DIR).ok();
        format!("{TEST_DIR}/{name}")
    }

    fn training_data() -> (Array2<f64>, Array1<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let xt = Array::random_using((10, 2), Uniform::new(-1., 1.), &mut rng);
        let yt = xt.map_axis(Axis(1), |r| r[0] * r[0] + 2. * r[0] * r[1] + 3. * r[1]);
        (xt, yt)
    }

    fn poly() -> PolynomialRegression<f64> {
        let (xt, yt) = training_data();
        PolynomialRegression::new(
            &xt,
            &yt,
            &json!({"max degree": 2, "scaler type": "standardization"}),
        )
        .unwrap()
    }

    fn gp() -> GaussianProcess<f64> {
        let (xt, yt) = training_data();
        GaussianProcess::new(&xt, &yt, &json!({"kernel type": "Matern 5/2"})).unwrap()
    }

    #[test]
    fn test_poly_round_trip() {
        let pr = poly();
        let x = array![[0.1, 0.4], [-0.7, 0.3]];
        for (name, binary) in [("pr_roundtrip.json", false), ("pr_roundtrip.bin", true)] {
            let path = test_path(name);
            pr.save(&path, binary.into()).unwrap();
            let loaded = PolynomialRegression::<f64>::from_file(&path, binary.into()).unwrap();
            assert_eq!(pr, loaded);
            assert_eq!(pr.value(&x).unwrap(), loaded.value(&x).unwrap());
            assert_eq!(pr.gradient(&x).unwrap(), loaded.gradient(&x).unwrap());
        }
    }

    #[test]
    fn test_gp_round_trip() {
        let gp = gp();
        let x = array![[0.1, 0.4], [-0.7, 0.3]];
        for (name, format) in [
            ("gp_roundtrip.json", SurrogateFileFormat::Text),
            ("gp_roundtrip.bin", SurrogateFileFormat::Binary),
        ] {
            let path = test_path(name);
            gp.save(&path, format).unwrap();
            let mut loaded = GaussianProcess::<f64>::default();
            loaded.load(&path, format).unwrap();
            assert_eq!(gp, loaded);
            assert_eq!(gp.value(&x).unwrap(), loaded.value(&x).unwrap());
            assert_eq!(gp.hessian(&x).unwrap(), loaded.hessian(&x).unwrap());
        }
    }

    #[test]
    fn test_text_and_binary_agree() {
        let gp = gp();
        let (text, bin) = (test_path("gp_agree.json"), test_path("gp_agree.bin"));
        gp.save(&text, SurrogateFileFormat::Text).unwrap();
        gp.save(&bin, SurrogateFileFormat::Binary).unwrap();
        let from_text = load_surrogate(&text, SurrogateFileFormat::Text).unwrap();
        let from_bin = load_surrogate(&bin, SurrogateFileFormat::Binary).unwrap();
        let x = array![[0.2, -0.5]];
        assert_abs_diff_eq!(
            from_text.value(&x.view()).unwrap(),
            from_bin.value(&x.view()).unwrap(),
            epsilon = 1e-12
        );
        assert_eq!(from_text, from_bin);
    }

    #[test]
    fn test_text_record_layout() {
        let path = test_path("pr_layout.json");
        poly().save(&path, SurrogateFileFormat::Text).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let record: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json!("surrox"), record["magic"]);
        assert_eq!(json!(1), record["version"]);
        assert!(record["model"]["PolynomialRegression"].is_object());
        assert!(content.lines().count() > 1);
    }

    #[test]
    fn test_save_unfitted() {
        let path = test_path("unfitted.json");
        assert!(matches!(
            PolynomialRegression::<f64>::default().save(&path, SurrogateFileFormat::Text),
            Err(SurrogateError::NotFitted)
        ));
        assert!(matches!(
            GaussianProcess::<f64>::default().save(&path, SurrogateFileFormat::Binary),
            Err(SurrogateError::NotFitted)
        ));
    }

    #[test]
    fn test_wrong_kind() {
        let path = test_path("gp_kind.bin");
        gp().save(&path, SurrogateFileFormat::Binary).unwrap();
        let mut pr = poly();
        let before = pr.clone();
        assert!(matches!(
            pr.load(&path, SurrogateFileFormat::Binary),
            Err(SurrogateError::CorruptRecord(_))
        ));
        assert_eq!(before, pr);
        assert_eq!(
            crate::surrogates::SurrogateKind::GaussianProcess,
            SurrogateModel::from_file(&path, SurrogateFileFormat::Binary)
                .unwrap()
                .kind()
        );
    }

    #[test]
    fn test_truncated_files() {
        let gp = gp();
        for (name, format) in [
            ("gp_truncated.json", SurrogateFileFormat::Text),
            ("gp_truncated.bin", SurrogateFileFormat::Binary),
        ] {
            let path = test_path(name);
            gp.save(&path, format).unwrap();
            let data = fs::read(&path).unwrap();
            fs::write(&path, &data[..data.len() / 2]).unwrap();
            let mut target = GaussianProcess::<f64>::default();
            assert!(matches!(
                target.load(&path, format),
                Err(SurrogateError::CorruptRecord(_))
            ));
            assert!(!target.is_fitted());
        }
    }

    #[test]
    fn test_corrupted_records() {
        let path = test_path("pr_corrupted.json");
        poly().save(&path, SurrogateFileFormat::Text).unwrap();
        let record: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        let mut bad_magic = record.clone();
        bad_magic["magic"] = json!("egobox");
        let mut bad_version = record.clone();
        bad_version["version"] = json!(2);
        let mut bad_shape = record.clone();
        bad_shape["model"]["PolynomialRegression"]["fitted"]["coefficients"] =
            json!({"v": 1, "dim": [2], "data": [1.0, 2.0]});
        let mut huge_basis = record.clone();
        huge_basis["model"]["PolynomialRegression"]["fitted"]["basis"] =
            json!({"nvars": 64, "max_degree": 64, "reduced": false});

        for corrupted in [bad_magic, bad_version, bad_shape, huge_basis] {
            fs::write(&path, serde_json::to_vec_pretty(&corrupted).unwrap()).unwrap();
            assert!(matches!(
                PolynomialRegression::<f64>::from_file(&path, SurrogateFileFormat::Text),
                Err(SurrogateError::CorruptRecord(_))
            ));
        }

        // text read as binary and garbage
        poly().save(&path, SurrogateFileFormat::Text).unwrap();
        assert!(matches!(
            load_surrogate(&path, SurrogateFileFormat::Binary),
            Err(SurrogateError::CorruptRecord(_))
        ));
        fs::write(&path, b"not a surrogate").unwrap();
        assert!(matches!(
            load_surrogate(&path, SurrogateFileFormat::Text),
            Err(SurrogateError::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_surrogate(&test_path("missing.json"), SurrogateFileFormat::Text),
            Err(SurrogateError::Io(_))
        ));
    }

    #[test]
    fn test_format_from_bool() {
        assert_eq!(SurrogateFileFormat::Binary, SurrogateFileFormat::from(true));
        assert_eq!(SurrogateFileFormat::Text, SurrogateFileFormat::from(false));
    }
}
