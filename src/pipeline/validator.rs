//! Window validation against the outlier detector.

use crate::models::OutlierScorer;
use ndarray::Array2;
use std::sync::Arc;

/// Pass/fail verdict over one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

/// Applies the outlier scorer across a window's sample rows and checks the
/// inlier share against the configured drop-rate threshold.
///
/// The same component gates both the ingestion router (raw windows) and the
/// predictor (scaled windows); the threshold algorithm is identical, only
/// the representation differs.
pub struct Validator {
    scorer: Arc<dyn OutlierScorer>,
    window_size: usize,
    drop_rate: u32,
}

impl Validator {
    pub fn new(scorer: Arc<dyn OutlierScorer>, window_size: usize, drop_rate: u32) -> Self {
        Self {
            scorer,
            window_size,
            drop_rate,
        }
    }

    /// Verdict for one `N x channels` window matrix.
    ///
    /// A degenerate shape (no rows or no columns) is invalid input, not a
    /// scoring outcome: it fails without invoking the scorer. The threshold
    /// comparison is inclusive - a window exactly at the drop rate passes.
    pub fn validate(&self, rows: &Array2<f64>) -> Verdict {
        if rows.nrows() == 0 || rows.ncols() == 0 {
            log::warn!("⚠️ Empty or zero-width window, skipping outlier scoring");
            return Verdict::Fail;
        }

        let decisions = match self.scorer.predict(rows) {
            Ok(decisions) => decisions,
            Err(e) => {
                log::error!("❌ Outlier scoring failed: {}", e);
                return Verdict::Fail;
            }
        };

        let inliers = decisions.iter().filter(|d| **d == 1).count();
        let valid_percent = (inliers as f64 / self.window_size as f64) * 100.0;

        if valid_percent >= self.drop_rate as f64 {
            Verdict::Pass
        } else {
            log::warn!(
                "❌ Window failed outlier validation: {:.1}% valid, threshold {}%",
                valid_percent,
                self.drop_rate
            );
            Verdict::Fail
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelError;
    use ndarray::Array2;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scorer marking a fixed number of rows inlier, counting invocations.
    struct FixedScorer {
        inliers: usize,
        calls: AtomicUsize,
    }

    impl FixedScorer {
        fn new(inliers: usize) -> Self {
            Self {
                inliers,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl OutlierScorer for FixedScorer {
        fn predict(&self, rows: &Array2<f64>) -> Result<Vec<i8>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..rows.nrows())
                .map(|i| if i < self.inliers { 1 } else { -1 })
                .collect())
        }
    }

    struct FailingScorer;

    impl OutlierScorer for FailingScorer {
        fn predict(&self, _rows: &Array2<f64>) -> Result<Vec<i8>, ModelError> {
            Err(ModelError::Shape("width mismatch".to_string()))
        }
    }

    fn window(rows: usize, cols: usize) -> Array2<f64> {
        Array2::zeros((rows, cols))
    }

    #[test]
    fn test_boundary_percentage_passes() {
        // 20/25 inliers = exactly 80%, threshold 80 - inclusive boundary
        let scorer = Arc::new(FixedScorer::new(20));
        let validator = Validator::new(scorer, 25, 80);

        assert_eq!(validator.validate(&window(25, 23)), Verdict::Pass);
    }

    #[test]
    fn test_below_threshold_fails() {
        let scorer = Arc::new(FixedScorer::new(15));
        let validator = Validator::new(scorer, 25, 80);

        assert_eq!(validator.validate(&window(25, 23)), Verdict::Fail);
    }

    #[test]
    fn test_empty_input_fails_without_scoring() {
        let scorer = Arc::new(FixedScorer::new(25));
        let validator = Validator::new(scorer.clone(), 25, 80);

        assert_eq!(validator.validate(&window(0, 23)), Verdict::Fail);
        assert_eq!(validator.validate(&window(25, 0)), Verdict::Fail);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scorer_error_fails_window() {
        let validator = Validator::new(Arc::new(FailingScorer), 25, 80);
        assert_eq!(validator.validate(&window(25, 23)), Verdict::Fail);
    }
}
