//! Pre-fitted affine scaler: `(x - mean) / scale` per channel column.

use super::{load_json, ModelError};
use ndarray::Array2;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct ScalerModel {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl ScalerModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let model: ScalerModel = load_json(path)?;
        if model.mean.len() != model.scale.len() {
            return Err(ModelError::Shape(format!(
                "mean width {} does not match scale width {}",
                model.mean.len(),
                model.scale.len()
            )));
        }
        if model.scale.iter().any(|s| *s == 0.0) {
            return Err(ModelError::Parse("scaler has a zero scale entry".to_string()));
        }
        Ok(model)
    }

    /// Scale each row of an `N x d` matrix column-wise.
    pub fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        if rows.ncols() != self.mean.len() {
            return Err(ModelError::Shape(format!(
                "input width {} does not match fitted width {}",
                rows.ncols(),
                self.mean.len()
            )));
        }

        let mut scaled = rows.clone();
        for mut row in scaled.outer_iter_mut() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = (*value - self.mean[j]) / self.scale[j];
            }
        }
        Ok(scaled)
    }
}
