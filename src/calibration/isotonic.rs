//! Isotonic regression calibration

use crate::error::{CalibrateError, Result};
use serde::{Deserialize, Serialize};

/// Isotonic regression calibrator
///
/// Fits a non-decreasing step function by weighted least squares using the
/// pool adjacent violators algorithm. Observations with equal `x` are merged
/// into one weighted point before pooling, so the fit does not depend on
/// their order. Evaluation returns the value of the last block starting at or
/// below `x`, clipped to [0, 1]; inputs below the first block map to the
/// first value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsotonicRegression {
    /// Left edge of each fitted block
    block_starts: Option<Vec<f64>>,
    /// Fitted value of each block (non-decreasing)
    block_values: Option<Vec<f64>>,
}

/// A pooled run of sorted observations
#[derive(Debug, Clone, Copy)]
struct Block {
    start: f64,
    sum_wy: f64,
    sum_w: f64,
}

impl Block {
    fn mean(&self) -> f64 {
        self.sum_wy / self.sum_w
    }

    fn absorb(&mut self, other: &Block) {
        self.sum_wy += other.sum_wy;
        self.sum_w += other.sum_w;
    }
}

impl IsotonicRegression {
    /// Create new isotonic regression calibrator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit on raw slices with optional per-observation weights
    ///
    /// Non-positive weights drop their observation. Fitting fails when no
    /// positive weight remains.
    pub fn fit_weighted(&mut self, x: &[f64], y: &[f64], weights: Option<&[f64]>) -> Result<()> {
        let n = x.len();
        if n != y.len() {
            return Err(CalibrateError::ValidationError(
                "Inputs and targets must have same length".to_string(),
            ));
        }
        if let Some(w) = weights {
            if w.len() != n {
                return Err(CalibrateError::ValidationError(
                    "Weights must have same length as inputs".to_string(),
                ));
            }
        }
        if n == 0 {
            return Err(CalibrateError::ValidationError("Empty input".to_string()));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(CalibrateError::ValidationError(
                "Inputs and targets must be finite".to_string(),
            ));
        }

        // Sort by input
        let mut indices: Vec<usize> = (0..n).collect();
        indices.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(std::cmp::Ordering::Equal));

        let points = Self::merge_ties(indices.iter().map(|&i| {
            let w = weights.map_or(1.0, |w| w[i]);
            (x[i], y[i], w)
        }));
        if points.is_empty() {
            return Err(CalibrateError::ValidationError(
                "Total observation weight must be positive".to_string(),
            ));
        }

        let blocks = Self::pava(points);
        self.block_starts = Some(blocks.iter().map(|b| b.start).collect());
        self.block_values = Some(blocks.iter().map(Block::mean).collect());
        Ok(())
    }

    /// Collapse each run of equal inputs into one weighted point
    fn merge_ties(sorted: impl Iterator<Item = (f64, f64, f64)>) -> Vec<Block> {
        let mut points: Vec<Block> = Vec::new();
        for (x, y, w) in sorted {
            if w <= 0.0 || !w.is_finite() {
                continue;
            }
            let point = Block {
                start: x,
                sum_wy: w * y,
                sum_w: w,
            };
            match points.last_mut() {
                Some(last) if last.start == x => last.absorb(&point),
                _ => points.push(point),
            }
        }
        points
    }

    /// Pool Adjacent Violators Algorithm (PAVA) over points with distinct, sorted inputs
    fn pava(points: Vec<Block>) -> Vec<Block> {
        let mut stack: Vec<Block> = Vec::with_capacity(points.len());
        for mut current in points {
            // Merge backwards while monotonicity is violated
            while let Some(prev) = stack.last() {
                if prev.mean() > current.mean() {
                    let mut merged = *prev;
                    merged.absorb(&current);
                    current = merged;
                    stack.pop();
                } else {
                    break;
                }
            }
            stack.push(current);
        }
        stack
    }

    /// Whether `fit` has been called successfully
    pub fn is_fitted(&self) -> bool {
        self.block_starts.as_ref().map_or(false, |b| !b.is_empty())
    }

    /// Number of constant pieces of the fitted step function
    pub fn num_blocks(&self) -> usize {
        self.block_starts.as_ref().map_or(0, Vec::len)
    }

    /// Calibrate a single value
    pub fn predict_one(&self, x: f64) -> Result<f64> {
        let (starts, values) = match (&self.block_starts, &self.block_values) {
            (Some(s), Some(v)) if !s.is_empty() => (s, v),
            _ => return Err(CalibrateError::ModelNotFitted),
        };

        let idx = starts.partition_point(|&s| s <= x);
        Ok(values[idx.saturating_sub(1)].clamp(0.0, 1.0))
    }
}
