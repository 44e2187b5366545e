//! Pre-fitted activity classifier
//!
//! A stack of fitted affine layers over the flattened reduced window, with a
//! softmax over the final logits. The externally visible label is the
//! arg-max index shifted by one, since label 0 is reserved upstream for the
//! null "no activity" class.

use super::{build_layers, load_json, Classifier, Dense, DenseFile, ModelError};
use ndarray::Array1;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ClassifierModelFile {
    layers: Vec<DenseFile>,
}

#[derive(Debug)]
pub struct ClassifierModel {
    layers: Vec<Dense>,
}

impl ClassifierModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file: ClassifierModelFile = load_json(path)?;
        Ok(Self {
            layers: build_layers(file.layers)?,
        })
    }

    pub fn input_width(&self) -> usize {
        self.layers[0].input_width()
    }

    pub fn class_count(&self) -> usize {
        self.layers[self.layers.len() - 1].output_width()
    }
}

impl Classifier for ClassifierModel {
    fn predict_proba(&self, input: &Array1<f64>) -> Result<Array1<f64>, ModelError> {
        let mut current = input.clone();
        for layer in &self.layers {
            current = layer.forward(&current)?;
        }
        Ok(softmax(&current))
    }
}

/// Numerically stable softmax.
fn softmax(logits: &Array1<f64>) -> Array1<f64> {
    let max = logits.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exp = logits.mapv(|x| (x - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Index of the largest probability. Ties resolve to the first maximum.
pub fn argmax(proba: &Array1<f64>) -> usize {
    let mut best = 0;
    for (i, value) in proba.iter().enumerate() {
        if *value > proba[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Activation;
    use ndarray::array;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn identity_classifier(classes: usize) -> ClassifierModel {
        let weights = (0..classes)
            .map(|i| (0..classes).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        ClassifierModel {
            layers: build_layers(vec![DenseFile {
                weights,
                bias: vec![0.0; classes],
                activation: Activation::Linear,
            }])
            .unwrap(),
        }
    }

    #[test]
    fn test_predict_proba_sums_to_one() {
        let model = identity_classifier(3);
        let proba = model.predict_proba(&array![1.0, 2.0, 0.5]).unwrap();

        assert!((proba.sum() - 1.0).abs() < 1e-9);
        assert_eq!(argmax(&proba), 1);
    }

    #[test]
    fn test_argmax_prefers_first_on_tie() {
        assert_eq!(argmax(&array![0.4, 0.4, 0.2]), 0);
    }

    #[test]
    fn test_load_round_trip() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"layers":[{{"weights":[[1.0,0.0],[0.0,1.0]],"bias":[0.0,0.0],"activation":"linear"}}]}}"#
        )
        .unwrap();

        let model = ClassifierModel::load(file.path()).unwrap();
        assert_eq!(model.input_width(), 2);
        assert_eq!(model.class_count(), 2);
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let model = identity_classifier(2);
        assert!(matches!(
            model.predict_proba(&array![1.0, 2.0, 3.0]),
            Err(ModelError::Shape(_))
        ));
    }
}
