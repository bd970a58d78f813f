//! Isotonic rescaling of candidate probabilities and P-matrix entries

use super::f1::GeneralF1Predictor;
use crate::calibration::IsotonicRegression;
use crate::dataset::MultiLabelDataset;
use crate::error::{CalibrateError, Result};
use crate::model::MultiLabelModel;
use crate::multilabel::SupportSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

fn ensure_non_empty(dataset: &MultiLabelDataset, what: &str) -> Result<()> {
    if dataset.num_data_points() == 0 {
        return Err(CalibrateError::ValidationError(format!(
            "cannot fit {} on an empty dataset",
            what
        )));
    }
    Ok(())
}

/// Isotonic map from a candidate's base probability to how often it is the truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetIsotonicScaling {
    isotonic: IsotonicRegression,
}

impl SetIsotonicScaling {
    /// Fit on every (data point, support member) pair of `dataset`
    pub fn fit(
        model: &dyn MultiLabelModel,
        support: &SupportSet,
        dataset: &MultiLabelDataset,
    ) -> Result<Self> {
        ensure_non_empty(dataset, "set isotonic scaling")?;

        let pairs: Vec<(f64, f64)> = (0..dataset.num_data_points())
            .into_par_iter()
            .flat_map_iter(|i| {
                let truth = dataset.label(i);
                let probs = model.predict_assignment_probs(dataset.row(i), support, 0.0);
                support
                    .iter()
                    .zip(probs)
                    .map(|(candidate, p)| (p, if candidate == truth { 1.0 } else { 0.0 }))
                    .collect::<Vec<_>>()
            })
            .collect();

        let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let mut isotonic = IsotonicRegression::new();
        isotonic.fit_weighted(&x, &y, None)?;

        info!(
            num_data_points = dataset.num_data_points(),
            support_size = support.len(),
            num_blocks = isotonic.num_blocks(),
            "Fitted set isotonic scaling"
        );
        Ok(Self { isotonic })
    }

    pub fn calibrated_prob(&self, prob: f64) -> Result<f64> {
        self.isotonic.predict_one(prob)
    }
}

/// Isotonic map applied entry-wise to label-by-cardinality matrices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PMatrixIsotonicScaling {
    isotonic: IsotonicRegression,
}

impl PMatrixIsotonicScaling {
    /// Fit predicted entries `P[i][s]` against `[i ∈ Y and |Y| = s + 1]`
    pub fn fit(
        model: &dyn MultiLabelModel,
        support: &SupportSet,
        dataset: &MultiLabelDataset,
    ) -> Result<Self> {
        ensure_non_empty(dataset, "P-matrix isotonic scaling")?;
        let num_classes = model.num_classes();

        let pairs: Vec<(f64, f64)> = (0..dataset.num_data_points())
            .into_par_iter()
            .map(|i| -> Result<Vec<(f64, f64)>> {
                let truth = dataset.label(i);
                let probs = model.predict_assignment_probs(dataset.row(i), support, 0.0);
                let matrix = GeneralF1Predictor::pmatrix(num_classes, support.as_slice(), &probs)?;

                let mut out = Vec::with_capacity(num_classes * num_classes);
                for (label, row) in matrix.iter().enumerate() {
                    for (s, &p) in row.iter().enumerate() {
                        let hit = truth.matches(label) && truth.cardinality() == s + 1;
                        out.push((p, if hit { 1.0 } else { 0.0 }));
                    }
                }
                Ok(out)
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let mut isotonic = IsotonicRegression::new();
        isotonic.fit_weighted(&x, &y, None)?;

        info!(
            num_data_points = dataset.num_data_points(),
            num_classes,
            num_blocks = isotonic.num_blocks(),
            "Fitted P-matrix isotonic scaling"
        );
        Ok(Self { isotonic })
    }

    pub fn calibrated_prob(&self, prob: f64) -> Result<f64> {
        self.isotonic.predict_one(prob)
    }

    /// Rescale every entry of a matrix
    pub fn calibrate_matrix(&self, matrix: &mut [Vec<f64>]) -> Result<()> {
        for row in matrix.iter_mut() {
            for entry in row.iter_mut() {
                *entry = self.isotonic.predict_one(*entry)?;
            }
        }
        Ok(())
    }
}
