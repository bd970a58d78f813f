//! Candidate-set calibration over vectorized instances

use super::isotonic::IsotonicRegression;
use crate::dataset::RegressionDataset;
use crate::error::{CalibrateError, Result};
use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{info, warn};

/// Maps a candidate's feature vector to the probability that it is correct
///
/// Implementations are immutable once fitted and safe to share across threads.
pub trait VectorCalibrator: Send + Sync {
    /// Calibrated correctness probability in [0, 1]
    fn calibrate(&self, features: ArrayView1<'_, f64>) -> Result<f64>;

    /// Calibrate every row of a dataset in parallel
    fn calibrate_dataset(&self, data: &RegressionDataset) -> Result<Vec<f64>> {
        (0..data.len())
            .into_par_iter()
            .map(|i| self.calibrate(data.row(i)))
            .collect()
    }

    /// Human-readable name of this calibrator
    fn name(&self) -> &'static str;
}

/// Which set calibrator to fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetCalibratorKind {
    None,
    Isotonic,
    CardinalityIsotonic,
    Reranker,
}

impl FromStr for SetCalibratorKind {
    type Err = CalibrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "identity" => Ok(Self::None),
            "isotonic" => Ok(Self::Isotonic),
            "cardinality_isotonic" => Ok(Self::CardinalityIsotonic),
            "reranker" => Ok(Self::Reranker),
            other => Err(CalibrateError::ConfigError(format!(
                "unknown set calibrator '{}'",
                other
            ))),
        }
    }
}

fn feature_at(features: ArrayView1<'_, f64>, index: usize) -> Result<f64> {
    features.get(index).copied().ok_or_else(|| CalibrateError::ShapeError {
        expected: format!("at least {} features", index + 1),
        actual: format!("{} features", features.len()),
    })
}

fn ensure_non_empty(data: &RegressionDataset) -> Result<()> {
    if data.is_empty() {
        return Err(CalibrateError::ValidationError(
            "cannot fit set calibrator on an empty dataset".to_string(),
        ));
    }
    Ok(())
}

/// Returns the designated score feature, clamped to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdentityVectorCalibrator {
    score_index: usize,
}

impl IdentityVectorCalibrator {
    pub fn new(score_index: usize) -> Self {
        Self { score_index }
    }
}

impl VectorCalibrator for IdentityVectorCalibrator {
    fn calibrate(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        let v = feature_at(features, self.score_index)?;
        Ok(if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// One global isotonic map from the score feature to correctness frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicVectorCalibrator {
    score_index: usize,
    isotonic: IsotonicRegression,
}

impl IsotonicVectorCalibrator {
    pub fn fit(data: &RegressionDataset, score_index: usize) -> Result<Self> {
        ensure_non_empty(data)?;
        data.require_column(score_index, "score")?;

        let x: Vec<f64> = data.features().column(score_index).to_vec();
        let y: Vec<f64> = data.targets().to_vec();
        let mut isotonic = IsotonicRegression::new();
        isotonic.fit_weighted(&x, &y, None)?;

        info!(
            num_instances = data.len(),
            num_blocks = isotonic.num_blocks(),
            "Fitted isotonic set calibrator"
        );
        Ok(Self {
            score_index,
            isotonic,
        })
    }
}

impl VectorCalibrator for IsotonicVectorCalibrator {
    fn calibrate(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        self.isotonic.predict_one(feature_at(features, self.score_index)?)
    }

    fn name(&self) -> &'static str {
        "isotonic"
    }
}

/// Configuration for cardinality-bucketed isotonic calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardinalityIsotonicConfig {
    /// Feature holding the score to calibrate
    pub score_index: usize,
    /// Feature holding the candidate's cardinality
    pub card_index: usize,
    /// Buckets with fewer instances use the global map instead
    pub min_bucket_size: usize,
}

impl Default for CardinalityIsotonicConfig {
    fn default() -> Self {
        Self {
            score_index: 0,
            card_index: 1,
            min_bucket_size: 10,
        }
    }
}

impl CardinalityIsotonicConfig {
    pub fn new(score_index: usize, card_index: usize) -> Self {
        Self {
            score_index,
            card_index,
            ..Default::default()
        }
    }

    pub fn with_min_bucket_size(mut self, size: usize) -> Self {
        self.min_bucket_size = size;
        self
    }
}

/// One isotonic map per candidate cardinality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardinalityIsotonicCalibrator {
    score_index: usize,
    card_index: usize,
    buckets: BTreeMap<usize, IsotonicRegression>,
    fallback: IsotonicRegression,
}

fn cardinality_of(value: f64) -> usize {
    if value.is_finite() && value > 0.0 {
        value.round() as usize
    } else {
        0
    }
}

impl CardinalityIsotonicCalibrator {
    pub fn fit(data: &RegressionDataset, config: &CardinalityIsotonicConfig) -> Result<Self> {
        ensure_non_empty(data)?;
        data.require_column(config.score_index, "score")?;
        data.require_column(config.card_index, "cardinality")?;

        let scores = data.features().column(config.score_index);
        let cards = data.features().column(config.card_index);
        let targets = data.targets();

        let mut grouped: BTreeMap<usize, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for i in 0..data.len() {
            let entry = grouped.entry(cardinality_of(cards[i])).or_default();
            entry.0.push(scores[i]);
            entry.1.push(targets[i]);
        }

        let mut fallback = IsotonicRegression::new();
        fallback.fit_weighted(&scores.to_vec(), &targets.to_vec(), None)?;

        let mut buckets = BTreeMap::new();
        for (card, (x, y)) in grouped {
            if x.len() < config.min_bucket_size {
                warn!(
                    cardinality = card,
                    size = x.len(),
                    min_bucket_size = config.min_bucket_size,
                    "Cardinality bucket too small, using global isotonic map"
                );
                continue;
            }
            let mut iso = IsotonicRegression::new();
            iso.fit_weighted(&x, &y, None)?;
            buckets.insert(card, iso);
        }

        info!(
            num_instances = data.len(),
            num_buckets = buckets.len(),
            "Fitted cardinality isotonic set calibrator"
        );
        Ok(Self {
            score_index: config.score_index,
            card_index: config.card_index,
            buckets,
            fallback,
        })
    }

    /// Cardinalities that received a dedicated map
    pub fn bucket_cardinalities(&self) -> Vec<usize> {
        self.buckets.keys().copied().collect()
    }
}

impl VectorCalibrator for CardinalityIsotonicCalibrator {
    fn calibrate(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        let score = feature_at(features, self.score_index)?;
        let card = cardinality_of(feature_at(features, self.card_index)?);
        self.buckets
            .get(&card)
            .unwrap_or(&self.fallback)
            .predict_one(score)
    }

    fn name(&self) -> &'static str {
        "cardinality_isotonic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn data() -> RegressionDataset {
        // column 0: score, column 1: cardinality
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..30 {
            let score = i as f64 / 30.0;
            rows.push(array![score, 1.0]);
            targets.push(if score > 0.5 { 1.0 } else { 0.0 });
            rows.push(array![score, 2.0]);
            targets.push(if score > 0.8 { 1.0 } else { 0.0 });
        }
        rows.push(array![0.9, 3.0]);
        targets.push(0.0);
        RegressionDataset::from_rows(rows, targets, 2).unwrap()
    }

    #[test]
    fn test_identity_clamps() {
        let calibrator = IdentityVectorCalibrator::new(1);
        assert_eq!(calibrator.calibrate(array![0.0, 1.7].view()).unwrap(), 1.0);
        assert_eq!(calibrator.calibrate(array![0.0, 0.3].view()).unwrap(), 0.3);
        assert!(calibrator.calibrate(array![0.0].view()).is_err());
    }

    #[test]
    fn test_isotonic_vector_calibrator() {
        let calibrator = IsotonicVectorCalibrator::fit(&data(), 0).unwrap();
        let low = calibrator.calibrate(array![0.1, 1.0].view()).unwrap();
        let high = calibrator.calibrate(array![0.95, 1.0].view()).unwrap();
        assert!(low <= high);
        assert!((0.0..=1.0).contains(&low));
        assert!(IsotonicVectorCalibrator::fit(&data(), 5).is_err());
    }

    #[test]
    fn test_cardinality_buckets() {
        let config = CardinalityIsotonicConfig::new(0, 1);
        let calibrator = CardinalityIsotonicCalibrator::fit(&data(), &config).unwrap();
        assert_eq!(calibrator.bucket_cardinalities(), vec![1, 2]);

        // score 0.7 is correct for singletons, not for pairs
        let single = calibrator.calibrate(array![0.7, 1.0].view()).unwrap();
        let pair = calibrator.calibrate(array![0.7, 2.0].view()).unwrap();
        assert_eq!(single, 1.0);
        assert_eq!(pair, 0.0);

        // cardinality 3 has one instance and falls back to the global map
        let fallback = calibrator.calibrate(array![0.7, 3.0].view()).unwrap();
        assert!(fallback > 0.0 && fallback < 1.0);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let empty = RegressionDataset::new(ndarray::Array2::zeros((0, 2)), Array1::zeros(0)).unwrap();
        assert!(IsotonicVectorCalibrator::fit(&empty, 0).is_err());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            "cardinality_isotonic".parse::<SetCalibratorKind>().unwrap(),
            SetCalibratorKind::CardinalityIsotonic
        );
        assert!("bogus".parse::<SetCalibratorKind>().is_err());
    }
}
