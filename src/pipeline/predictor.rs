//! Local activity classification over incoming windows.

use super::validator::{Validator, Verdict};
use crate::models::classifier::argmax;
use crate::models::scaler::ScalerModel;
use crate::models::{Classifier, Reducer};
use ndarray::{Array1, Array2};
use std::sync::Arc;

/// Classification pipeline: scale, gate on the scaled window, reduce,
/// classify, arg-max.
///
/// The outlier gate here runs on the scaled representation and is
/// independent of the router's validator stage on the raw window; neither
/// short-circuits the other. A gate rejection yields no label, which is a
/// skip rather than an error.
pub struct Predictor {
    scaler: Arc<ScalerModel>,
    gate: Arc<Validator>,
    reducer: Arc<dyn Reducer>,
    classifier: Arc<dyn Classifier>,
}

impl Predictor {
    pub fn new(
        scaler: Arc<ScalerModel>,
        gate: Arc<Validator>,
        reducer: Arc<dyn Reducer>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            scaler,
            gate,
            reducer,
            classifier,
        }
    }

    /// Label for one raw `N x channels` window, or `None` on skip.
    ///
    /// Labels are 1-indexed on the wire; label 0 is reserved upstream for
    /// the null class.
    pub fn predict(&self, rows: &Array2<f64>) -> Option<i64> {
        let scaled = match self.scaler.transform(rows) {
            Ok(scaled) => scaled,
            Err(e) => {
                log::error!("❌ Error scaling window for inference: {}", e);
                return None;
            }
        };

        if self.gate.validate(&scaled) == Verdict::Fail {
            log::info!("✅ Scaled window rejected by outlier gate, skipping inference");
            return None;
        }

        let reduced = match self.reducer.transform(&scaled) {
            Ok(reduced) => reduced,
            Err(e) => {
                log::error!("❌ Error reducing window for inference: {}", e);
                return None;
            }
        };

        let flat: Array1<f64> = reduced.iter().copied().collect();
        match self.classifier.predict_proba(&flat) {
            Ok(proba) => {
                let label = argmax(&proba) as i64 + 1;
                log::info!("✅ Inference completed, predicted label: {}", label);
                Some(label)
            }
            Err(e) => {
                log::error!("❌ Error during inference prediction: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelError, OutlierScorer};
    use ndarray::{array, Array2};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AllInliers;

    impl OutlierScorer for AllInliers {
        fn predict(&self, rows: &Array2<f64>) -> Result<Vec<i8>, ModelError> {
            Ok(vec![1; rows.nrows()])
        }
    }

    struct AllOutliers;

    impl OutlierScorer for AllOutliers {
        fn predict(&self, rows: &Array2<f64>) -> Result<Vec<i8>, ModelError> {
            Ok(vec![-1; rows.nrows()])
        }
    }

    /// Keeps the first column of each row.
    struct FirstColumn;

    impl Reducer for FirstColumn {
        fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
            let mut out = Array2::zeros((rows.nrows(), 1));
            for (i, row) in rows.outer_iter().enumerate() {
                out[[i, 0]] = row[0];
            }
            Ok(out)
        }
    }

    /// Puts all probability mass on a fixed class, counting invocations.
    struct FixedClass {
        class: usize,
        classes: usize,
        calls: AtomicUsize,
    }

    impl Classifier for FixedClass {
        fn predict_proba(&self, _input: &Array1<f64>) -> Result<Array1<f64>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut proba = Array1::zeros(self.classes);
            proba[self.class] = 1.0;
            Ok(proba)
        }
    }

    fn identity_scaler(width: usize) -> Arc<ScalerModel> {
        Arc::new(ScalerModel {
            mean: vec![0.0; width],
            scale: vec![1.0; width],
        })
    }

    #[test]
    fn test_predict_returns_one_indexed_label() {
        let classifier = Arc::new(FixedClass {
            class: 2,
            classes: 4,
            calls: AtomicUsize::new(0),
        });
        let predictor = Predictor::new(
            identity_scaler(2),
            Arc::new(Validator::new(Arc::new(AllInliers), 2, 80)),
            Arc::new(FirstColumn),
            classifier.clone(),
        );

        let label = predictor.predict(&array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(label, Some(3)); // class index 2, 1-indexed
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_gate_rejection_skips_classifier() {
        let classifier = Arc::new(FixedClass {
            class: 0,
            classes: 2,
            calls: AtomicUsize::new(0),
        });
        let predictor = Predictor::new(
            identity_scaler(2),
            Arc::new(Validator::new(Arc::new(AllOutliers), 2, 80)),
            Arc::new(FirstColumn),
            classifier.clone(),
        );

        assert_eq!(predictor.predict(&array![[1.0, 2.0], [3.0, 4.0]]), None);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scaler_width_mismatch_skips() {
        let predictor = Predictor::new(
            identity_scaler(3),
            Arc::new(Validator::new(Arc::new(AllInliers), 2, 80)),
            Arc::new(FirstColumn),
            Arc::new(FixedClass {
                class: 0,
                classes: 2,
                calls: AtomicUsize::new(0),
            }),
        );

        assert_eq!(predictor.predict(&array![[1.0, 2.0]]), None);
    }
}
