//! Set-prediction contract and baseline predictors

use crate::calibration::LabelCalibrator;
use crate::error::{CalibrateError, Result};
use crate::model::MultiLabelModel;
use crate::multilabel::{MultiLabel, SupportSet};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Anything that maps a feature vector to a predicted label set
pub trait MultiLabelClassifier: Send + Sync {
    fn predict(&self, x: ArrayView1<'_, f64>) -> Result<MultiLabel>;

    /// Predict every row in parallel, keeping row order
    fn predict_batch(&self, features: &Array2<f64>) -> Result<Vec<MultiLabel>> {
        (0..features.nrows())
            .into_par_iter()
            .map(|i| self.predict(features.row(i)))
            .collect()
    }
}

/// Thresholds each calibrated marginal on its own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndependentPredictor<M> {
    model: Arc<M>,
    label_calibrator: LabelCalibrator,
    threshold: f64,
}

impl<M: MultiLabelModel> IndependentPredictor<M> {
    pub fn new(model: Arc<M>, label_calibrator: LabelCalibrator) -> Self {
        Self {
            model,
            label_calibrator,
            threshold: 0.5,
        }
    }

    /// Labels with calibrated probability at or above `threshold` are predicted
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CalibrateError::invalid_parameter(
                "threshold",
                threshold,
                "must lie in [0, 1]",
            ));
        }
        self.threshold = threshold;
        Ok(self)
    }
}

impl<M: MultiLabelModel> MultiLabelClassifier for IndependentPredictor<M> {
    fn predict(&self, x: ArrayView1<'_, f64>) -> Result<MultiLabel> {
        let probs = self
            .label_calibrator
            .calibrated_class_probs(&self.model.predict_class_probs(x))?;
        Ok(probs
            .iter()
            .enumerate()
            .filter(|(_, &p)| p >= self.threshold)
            .map(|(k, _)| k)
            .collect())
    }
}

/// Picks the support member with the largest product of calibrated
/// per-label agreement probabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportPredictor<M> {
    model: Arc<M>,
    support: SupportSet,
    label_calibrator: LabelCalibrator,
}

impl<M: MultiLabelModel> SupportPredictor<M> {
    pub fn new(model: Arc<M>, support: SupportSet, label_calibrator: LabelCalibrator) -> Self {
        Self {
            model,
            support,
            label_calibrator,
        }
    }

    fn scores(&self, x: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
        let probs = self
            .label_calibrator
            .calibrated_class_probs(&self.model.predict_class_probs(x))?;
        Ok(self
            .support
            .iter()
            .map(|set| {
                probs
                    .iter()
                    .enumerate()
                    .map(|(k, &p)| if set.matches(k) { p } else { 1.0 - p })
                    .product::<f64>()
            })
            .collect())
    }

    /// The `k` highest-scoring support members, best first
    ///
    /// Equal scores keep support order.
    pub fn top_k(&self, x: ArrayView1<'_, f64>, k: usize) -> Result<Vec<(MultiLabel, f64)>> {
        let scores = self.scores(x)?;
        let mut ranked: Vec<usize> = (0..scores.len()).collect();
        ranked.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });
        Ok(ranked
            .into_iter()
            .take(k)
            .filter_map(|i| self.support.get(i).map(|set| (set.clone(), scores[i])))
            .collect())
    }
}

impl<M: MultiLabelModel> MultiLabelClassifier for SupportPredictor<M> {
    fn predict(&self, x: ArrayView1<'_, f64>) -> Result<MultiLabel> {
        Ok(self
            .top_k(x, 1)?
            .into_iter()
            .next()
            .map(|(set, _)| set)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BinaryRelevanceModel;
    use ndarray::array;

    fn model() -> Arc<BinaryRelevanceModel> {
        // x = [1]: P(0) ~ 0.88, P(1) ~ 0.62, P(2) ~ 0.27
        Arc::new(BinaryRelevanceModel::new(array![[2.0], [0.5], [-1.0]], array![0.0, 0.0, 0.0]).unwrap())
    }

    #[test]
    fn test_independent_threshold() {
        let predictor = IndependentPredictor::new(model(), LabelCalibrator::Identity);
        let x = array![1.0];
        assert_eq!(predictor.predict(x.view()).unwrap(), MultiLabel::from_labels(vec![0, 1]));

        let strict = predictor.clone().with_threshold(0.8).unwrap();
        assert_eq!(strict.predict(x.view()).unwrap(), MultiLabel::from_labels(vec![0]));
        assert!(predictor.with_threshold(1.5).is_err());
    }

    #[test]
    fn test_support_predictor_stays_in_support() {
        let support = SupportSet::new(vec![
            MultiLabel::from_labels(vec![2]),
            MultiLabel::from_labels(vec![0]),
            MultiLabel::from_labels(vec![1, 2]),
        ])
        .unwrap();
        let predictor = SupportPredictor::new(model(), support, LabelCalibrator::Identity);
        let x = array![1.0];
        assert_eq!(predictor.predict(x.view()).unwrap(), MultiLabel::from_labels(vec![0]));

        let top = predictor.top_k(x.view(), 5).unwrap();
        assert_eq!(top.len(), 3);
        assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_batch_keeps_row_order() {
        let predictor = IndependentPredictor::new(model(), LabelCalibrator::Identity);
        let features = array![[1.0], [-3.0], [1.0]];
        let predictions = predictor.predict_batch(&features).unwrap();
        assert_eq!(predictions.len(), 3);
        assert_eq!(predictions[0], predictions[2]);
        // at x = -3 only label 2 is likely
        assert_eq!(predictions[1], MultiLabel::from_labels(vec![2]));
    }
}
