//! Multi-label classification data and regression training sets

use crate::error::{CalibrateError, Result};
use crate::multilabel::MultiLabel;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Feature rows paired with ground-truth label sets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLabelDataset {
    features: Array2<f64>,
    labels: Vec<MultiLabel>,
    num_classes: usize,
}

impl MultiLabelDataset {
    pub fn new(features: Array2<f64>, labels: Vec<MultiLabel>, num_classes: usize) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(CalibrateError::ShapeError {
                expected: format!("{} label sets", features.nrows()),
                actual: format!("{} label sets", labels.len()),
            });
        }
        if let Some(bad) = labels
            .iter()
            .filter_map(|l| l.max_label())
            .find(|&k| k >= num_classes)
        {
            return Err(CalibrateError::ValidationError(format!(
                "label {} out of range for {} classes",
                bad, num_classes
            )));
        }

        Ok(Self {
            features,
            labels,
            num_classes,
        })
    }

    pub fn num_data_points(&self) -> usize {
        self.labels.len()
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.features.row(i)
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn label(&self, i: usize) -> &MultiLabel {
        &self.labels[i]
    }

    pub fn labels(&self) -> &[MultiLabel] {
        &self.labels
    }
}

/// Regression training set: one feature row per target value
///
/// Built by the prediction vectorizer with correctness (0/1) targets and
/// consumed by set calibrators and the reranker trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionDataset {
    features: Array2<f64>,
    targets: Array1<f64>,
}

impl RegressionDataset {
    pub fn new(features: Array2<f64>, targets: Array1<f64>) -> Result<Self> {
        if features.nrows() != targets.len() {
            return Err(CalibrateError::ShapeError {
                expected: format!("targets length = {}", features.nrows()),
                actual: format!("targets length = {}", targets.len()),
            });
        }
        Ok(Self { features, targets })
    }

    /// Assemble a dataset from equally sized rows
    pub fn from_rows(rows: Vec<Array1<f64>>, targets: Vec<f64>, num_features: usize) -> Result<Self> {
        if let Some(row) = rows.iter().find(|r| r.len() != num_features) {
            return Err(CalibrateError::ShapeError {
                expected: format!("row length = {}", num_features),
                actual: format!("row length = {}", row.len()),
            });
        }
        let n = rows.len();
        let mut flat = Vec::with_capacity(n * num_features);
        for row in &rows {
            flat.extend(row.iter().copied());
        }
        let features = Array2::from_shape_vec((n, num_features), flat)?;
        Self::new(features, Array1::from_vec(targets))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn targets(&self) -> &Array1<f64> {
        &self.targets
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.features.row(i)
    }

    /// Check that a feature column exists
    pub(crate) fn require_column(&self, index: usize, what: &str) -> Result<()> {
        if index >= self.num_features() {
            return Err(CalibrateError::ConfigError(format!(
                "{} index {} out of range for {} features",
                what,
                index,
                self.num_features()
            )));
        }
        Ok(())
    }
}
