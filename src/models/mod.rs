//! Pre-fitted model handles
//!
//! Every scorer the pipeline touches is an opaque, pre-fitted parameter set
//! deserialized once at startup from a JSON file under the configured model
//! directory. Scoring is pure per call; nothing here mutates state.
//!
//! Components take the trait objects defined below rather than concrete
//! models, so each stage can be exercised with mock scorers in tests.

pub mod classifier;
pub mod outlier;
pub mod reduction;
pub mod scaler;

use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors raised while loading or applying a pre-fitted model.
#[derive(Debug)]
pub enum ModelError {
    /// Model file missing or unreadable.
    Io(String),
    /// Model file present but not parseable.
    Parse(String),
    /// Input does not match the fitted shape.
    Shape(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::Io(msg) => write!(f, "model file error: {}", msg),
            ModelError::Parse(msg) => write!(f, "model parse error: {}", msg),
            ModelError::Shape(msg) => write!(f, "model shape error: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

/// Per-row inlier/outlier decisions, one per sample row: 1 = inlier,
/// -1 = outlier.
pub trait OutlierScorer: Send + Sync {
    fn predict(&self, rows: &Array2<f64>) -> Result<Vec<i8>, ModelError>;
}

/// Row-wise dimensionality reduction: maps an `N x d` matrix to `N x k`
/// with `k < d`, deterministically.
pub trait Reducer: Send + Sync {
    fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>, ModelError>;
}

/// Class-probability scorer over one flattened feature vector.
pub trait Classifier: Send + Sync {
    fn predict_proba(&self, input: &Array1<f64>) -> Result<Array1<f64>, ModelError>;
}

/// Resolve a model name to its file under the model directory.
pub fn model_path(model_dir: &str, name: &str) -> PathBuf {
    Path::new(model_dir).join(format!("{}.json", name))
}

/// Read and deserialize one model file.
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ModelError::Io(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| ModelError::Parse(format!("{}: {}", path.display(), e)))
}

/// Activation applied after a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Linear => x,
        }
    }
}

/// One fitted affine layer, as serialized in encoder and classifier files.
#[derive(Debug, Deserialize)]
pub struct DenseFile {
    /// Row-major `out x in` weight matrix.
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub activation: Activation,
}

/// One fitted affine layer ready for application.
#[derive(Debug)]
pub struct Dense {
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

impl Dense {
    pub fn from_file(layer: DenseFile) -> Result<Self, ModelError> {
        let out = layer.weights.len();
        if out == 0 {
            return Err(ModelError::Shape("layer has no output rows".to_string()));
        }
        let width = layer.weights[0].len();
        if layer.weights.iter().any(|row| row.len() != width) {
            return Err(ModelError::Shape("ragged weight matrix".to_string()));
        }
        if layer.bias.len() != out {
            return Err(ModelError::Shape(format!(
                "bias width {} does not match {} output rows",
                layer.bias.len(),
                out
            )));
        }

        let flat: Vec<f64> = layer.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((out, width), flat)
            .map_err(|e| ModelError::Shape(e.to_string()))?;

        Ok(Self {
            weights,
            bias: Array1::from_vec(layer.bias),
            activation: layer.activation,
        })
    }

    pub fn input_width(&self) -> usize {
        self.weights.ncols()
    }

    pub fn output_width(&self) -> usize {
        self.weights.nrows()
    }

    pub fn forward(&self, input: &Array1<f64>) -> Result<Array1<f64>, ModelError> {
        if input.len() != self.input_width() {
            return Err(ModelError::Shape(format!(
                "input width {} does not match layer width {}",
                input.len(),
                self.input_width()
            )));
        }
        let mut out = self.weights.dot(input) + &self.bias;
        out.mapv_inplace(|x| self.activation.apply(x));
        Ok(out)
    }
}

/// Build a layer stack, checking that adjacent widths line up.
pub(crate) fn build_layers(files: Vec<DenseFile>) -> Result<Vec<Dense>, ModelError> {
    if files.is_empty() {
        return Err(ModelError::Shape("model has no layers".to_string()));
    }
    let mut layers = Vec::with_capacity(files.len());
    for file in files {
        let layer = Dense::from_file(file)?;
        if let Some(prev) = layers.last() {
            let prev: &Dense = prev;
            if prev.output_width() != layer.input_width() {
                return Err(ModelError::Shape(format!(
                    "layer width mismatch: {} -> {}",
                    prev.output_width(),
                    layer.input_width()
                )));
            }
        }
        layers.push(layer);
    }
    Ok(layers)
}
