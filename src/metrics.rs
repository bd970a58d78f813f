//! Multi-label evaluation measures

use crate::dataset::MultiLabelDataset;
use crate::error::{CalibrateError, Result};
use crate::multilabel::{f1, MultiLabel};
use crate::predictor::MultiLabelClassifier;
use serde::{Deserialize, Serialize};

/// Set-level quality of predictions against ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLabelMeasures {
    pub num_instances: usize,
    /// Fraction of exact set matches
    pub subset_accuracy: f64,
    /// Mean per-instance F1
    pub instance_f1: f64,
    pub instance_precision: f64,
    pub instance_recall: f64,
    /// Fraction of wrong label decisions over all instances and labels
    pub hamming_loss: f64,
    /// F1 over pooled true/false positive and negative counts
    pub micro_f1: f64,
}

impl MultiLabelMeasures {
    /// Compare `predictions` with `truths` over `num_classes` labels
    pub fn compute(
        num_classes: usize,
        truths: &[MultiLabel],
        predictions: &[MultiLabel],
    ) -> Result<Self> {
        if truths.len() != predictions.len() {
            return Err(CalibrateError::ShapeError {
                expected: format!("{} predictions", truths.len()),
                actual: format!("{} predictions", predictions.len()),
            });
        }
        if truths.is_empty() {
            return Err(CalibrateError::ValidationError(
                "cannot evaluate zero instances".to_string(),
            ));
        }
        if num_classes == 0 {
            return Err(CalibrateError::invalid_parameter(
                "num_classes",
                num_classes,
                "must be at least 1",
            ));
        }

        let n = truths.len() as f64;
        let mut exact = 0usize;
        let (mut f1_sum, mut precision_sum, mut recall_sum) = (0.0, 0.0, 0.0);
        let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);

        for (truth, prediction) in truths.iter().zip(predictions) {
            let hits = prediction.intersection_size(truth);
            let (p, t) = (prediction.cardinality(), truth.cardinality());
            if prediction == truth {
                exact += 1;
            }
            f1_sum += f1(prediction, truth);
            precision_sum += match p {
                0 => f64::from(u8::from(t == 0)),
                _ => hits as f64 / p as f64,
            };
            recall_sum += match t {
                0 => f64::from(u8::from(p == 0)),
                _ => hits as f64 / t as f64,
            };
            tp += hits;
            fp += p - hits;
            fn_ += t - hits;
        }

        let micro_f1 = if tp + fp + fn_ == 0 {
            1.0
        } else {
            2.0 * tp as f64 / (2 * tp + fp + fn_) as f64
        };

        Ok(Self {
            num_instances: truths.len(),
            subset_accuracy: exact as f64 / n,
            instance_f1: f1_sum / n,
            instance_precision: precision_sum / n,
            instance_recall: recall_sum / n,
            hamming_loss: (fp + fn_) as f64 / (n * num_classes as f64),
            micro_f1,
        })
    }

    /// Predict every row of `dataset` with `classifier` and score the result
    pub fn evaluate<C: MultiLabelClassifier + ?Sized>(
        classifier: &C,
        dataset: &MultiLabelDataset,
    ) -> Result<Self> {
        let predictions = classifier.predict_batch(dataset.features())?;
        Self::compute(dataset.num_classes(), dataset.labels(), &predictions)
    }
}
