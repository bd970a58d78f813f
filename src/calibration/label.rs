//! Per-label marginal calibration

use super::isotonic::IsotonicRegression;
use crate::dataset::MultiLabelDataset;
use crate::error::{CalibrateError, Result};
use crate::model::MultiLabelModel;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

/// Which label calibrator to fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelCalibratorKind {
    /// Pass marginals through unchanged
    None,
    /// One isotonic map per label
    Isotonic,
}

impl FromStr for LabelCalibratorKind {
    type Err = CalibrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "identity" => Ok(Self::None),
            "isotonic" => Ok(Self::Isotonic),
            other => Err(CalibrateError::ConfigError(format!(
                "unknown label calibrator '{}'",
                other
            ))),
        }
    }
}

/// Maps raw per-label marginals to calibrated marginals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LabelCalibrator {
    Identity,
    Isotonic(IsotonicLabelCalibrator),
}

impl LabelCalibrator {
    /// Fit the requested calibrator on held-out data
    pub fn fit(
        kind: LabelCalibratorKind,
        model: &dyn MultiLabelModel,
        dataset: &MultiLabelDataset,
    ) -> Result<Self> {
        match kind {
            LabelCalibratorKind::None => Ok(Self::Identity),
            LabelCalibratorKind::Isotonic => {
                IsotonicLabelCalibrator::fit(model, dataset).map(Self::Isotonic)
            }
        }
    }

    /// Calibrate a full marginal vector element-wise
    pub fn calibrated_class_probs(&self, raw: &[f64]) -> Result<Vec<f64>> {
        match self {
            Self::Identity => Ok(raw.to_vec()),
            Self::Isotonic(iso) => iso.calibrated_class_probs(raw),
        }
    }
}

impl Default for LabelCalibrator {
    fn default() -> Self {
        Self::Identity
    }
}

/// One isotonic regression per class index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicLabelCalibrator {
    calibrators: Vec<IsotonicRegression>,
}

impl IsotonicLabelCalibrator {
    /// Fit on `(predicted marginal, observed indicator)` pairs pooled per label
    pub fn fit(model: &dyn MultiLabelModel, dataset: &MultiLabelDataset) -> Result<Self> {
        let n = dataset.num_data_points();
        if n == 0 {
            return Err(CalibrateError::ValidationError(
                "cannot fit label calibrator on an empty dataset".to_string(),
            ));
        }
        let num_classes = model.num_classes();

        let marginals: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| model.predict_class_probs(dataset.row(i)))
            .collect();

        let calibrators = (0..num_classes)
            .into_par_iter()
            .map(|k| {
                let x: Vec<f64> = marginals.iter().map(|m| m[k]).collect();
                let y: Vec<f64> = dataset
                    .labels()
                    .iter()
                    .map(|l| if l.matches(k) { 1.0 } else { 0.0 })
                    .collect();
                let mut iso = IsotonicRegression::new();
                iso.fit_weighted(&x, &y, None)?;
                Ok(iso)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(num_classes, num_data_points = n, "Fitted isotonic label calibrator");
        Ok(Self { calibrators })
    }

    pub fn num_classes(&self) -> usize {
        self.calibrators.len()
    }

    pub fn calibrated_class_probs(&self, raw: &[f64]) -> Result<Vec<f64>> {
        if raw.len() != self.calibrators.len() {
            return Err(CalibrateError::ShapeError {
                expected: format!("{} class probabilities", self.calibrators.len()),
                actual: format!("{} class probabilities", raw.len()),
            });
        }
        raw.iter()
            .zip(&self.calibrators)
            .map(|(&p, iso)| iso.predict_one(p))
            .collect()
    }
}
