//! Pre-fitted outlier detector
//!
//! The decision rule is a standardized distance threshold in feature space:
//! a row whose mean squared standardized deviation from the fitted center
//! stays at or below `threshold` is an inlier. The fit tooling exports both
//! isolation-forest and local-outlier-factor fits in this shape; which one
//! backs the file is opaque to the pipeline.

use super::{load_json, ModelError, OutlierScorer};
use ndarray::Array2;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct OutlierModel {
    pub name: String,
    pub center: Vec<f64>,
    pub scale: Vec<f64>,
    pub threshold: f64,
}

impl OutlierModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let model: OutlierModel = load_json(path)?;
        if model.center.len() != model.scale.len() {
            return Err(ModelError::Shape(format!(
                "center width {} does not match scale width {}",
                model.center.len(),
                model.scale.len()
            )));
        }
        if model.scale.iter().any(|s| *s == 0.0) {
            return Err(ModelError::Parse(
                "outlier model has a zero scale entry".to_string(),
            ));
        }
        Ok(model)
    }

    fn score_row(&self, row: ndarray::ArrayView1<f64>) -> f64 {
        let mut acc = 0.0;
        for (j, value) in row.iter().enumerate() {
            let z = (value - self.center[j]) / self.scale[j];
            acc += z * z;
        }
        acc / row.len() as f64
    }
}

impl OutlierScorer for OutlierModel {
    fn predict(&self, rows: &Array2<f64>) -> Result<Vec<i8>, ModelError> {
        if rows.ncols() != self.center.len() {
            return Err(ModelError::Shape(format!(
                "input width {} does not match fitted width {}",
                rows.ncols(),
                self.center.len()
            )));
        }

        let mut decisions = Vec::with_capacity(rows.nrows());
        for row in rows.outer_iter() {
            let score = self.score_row(row);
            decisions.push(if score <= self.threshold { 1 } else { -1 });
        }
        Ok(decisions)
    }
}
