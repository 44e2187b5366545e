//! Dimensionality reduction strategies
//!
//! Two interchangeable strategies, fixed at load time by the model file's
//! `kind` tag: a linear principal-component projection, or a learned
//! non-linear encoder. Both map a fixed-width input row to a smaller
//! fixed-width output row, deterministically, with no state across calls.

use super::{build_layers, load_json, Dense, DenseFile, ModelError, Reducer};
use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ReductionModelFile {
    Projection {
        mean: Vec<f64>,
        /// `k x d` component matrix, one principal axis per row.
        components: Vec<Vec<f64>>,
    },
    Encoder {
        layers: Vec<DenseFile>,
    },
}

#[derive(Debug)]
pub enum ReductionModel {
    Projection {
        mean: Array1<f64>,
        components: Array2<f64>,
    },
    Encoder {
        layers: Vec<Dense>,
    },
}

impl ReductionModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        match load_json(path)? {
            ReductionModelFile::Projection { mean, components } => {
                let k = components.len();
                if k == 0 {
                    return Err(ModelError::Shape("projection has no components".to_string()));
                }
                let d = components[0].len();
                if components.iter().any(|row| row.len() != d) {
                    return Err(ModelError::Shape("ragged component matrix".to_string()));
                }
                if mean.len() != d {
                    return Err(ModelError::Shape(format!(
                        "mean width {} does not match component width {}",
                        mean.len(),
                        d
                    )));
                }
                if k >= d {
                    return Err(ModelError::Shape(format!(
                        "projection does not reduce: {} components over width {}",
                        k, d
                    )));
                }

                let flat: Vec<f64> = components.into_iter().flatten().collect();
                let components = Array2::from_shape_vec((k, d), flat)
                    .map_err(|e| ModelError::Shape(e.to_string()))?;

                Ok(ReductionModel::Projection {
                    mean: Array1::from_vec(mean),
                    components,
                })
            }
            ReductionModelFile::Encoder { layers } => Ok(ReductionModel::Encoder {
                layers: build_layers(layers)?,
            }),
        }
    }

    pub fn input_width(&self) -> usize {
        match self {
            ReductionModel::Projection { components, .. } => components.ncols(),
            ReductionModel::Encoder { layers } => layers[0].input_width(),
        }
    }

    pub fn output_width(&self) -> usize {
        match self {
            ReductionModel::Projection { components, .. } => components.nrows(),
            ReductionModel::Encoder { layers } => layers[layers.len() - 1].output_width(),
        }
    }

    fn reduce_row(&self, row: Array1<f64>) -> Result<Array1<f64>, ModelError> {
        match self {
            ReductionModel::Projection { mean, components } => {
                Ok(components.dot(&(row - mean)))
            }
            ReductionModel::Encoder { layers } => {
                let mut current = row;
                for layer in layers {
                    current = layer.forward(&current)?;
                }
                Ok(current)
            }
        }
    }
}

impl Reducer for ReductionModel {
    fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        if rows.ncols() != self.input_width() {
            return Err(ModelError::Shape(format!(
                "input width {} does not match fitted width {}",
                rows.ncols(),
                self.input_width()
            )));
        }

        let mut reduced = Array2::<f64>::zeros((rows.nrows(), self.output_width()));
        for (i, row) in rows.outer_iter().enumerate() {
            let out = self.reduce_row(row.to_owned())?;
            reduced.row_mut(i).assign(&out);
        }
        Ok(reduced)
    }
}
