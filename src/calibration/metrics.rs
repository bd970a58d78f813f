//! Calibration quality measures over (confidence, outcome) pairs

use crate::error::{CalibrateError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Equal-width binning of confidences against observed outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityDiagram {
    /// Bin edges, `n_bins + 1` values from 0 to 1
    pub bin_edges: Vec<f64>,
    /// Mean predicted probability in each bin
    pub bin_confidences: Vec<f64>,
    /// Fraction of positives in each bin
    pub bin_accuracies: Vec<f64>,
    /// Number of samples in each bin
    pub bin_counts: Vec<usize>,
}

impl ReliabilityDiagram {
    fn total(&self) -> usize {
        self.bin_counts.iter().sum()
    }

    /// Occupied bins as `(weight, accuracy, confidence)`
    fn occupied(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        let n = self.total().max(1) as f64;
        (0..self.bin_counts.len())
            .filter(move |&b| self.bin_counts[b] > 0)
            .map(move |b| {
                (
                    self.bin_counts[b] as f64 / n,
                    self.bin_accuracies[b],
                    self.bin_confidences[b],
                )
            })
    }
}

/// Summary of how well a set of confidences matches observed correctness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub num_instances: usize,
    /// Mean squared error between confidence and outcome (Brier score)
    pub mse: f64,
    /// Bin-weighted mean of |accuracy - confidence| (ECE)
    pub absolute_calibration_error: f64,
    /// Bin-weighted mean of (accuracy - confidence)^2
    pub square_calibration_error: f64,
    /// Largest per-bin |accuracy - confidence| (MCE)
    pub max_calibration_error: f64,
    /// Bin-weighted spread of bin accuracies around the base rate
    pub sharpness: f64,
    /// Outcome variance `ȳ(1 - ȳ)`
    pub variance: f64,
    pub reliability: ReliabilityDiagram,
}

fn check_lengths(probs: &Array1<f64>, labels: &Array1<f64>) -> Result<()> {
    if probs.len() != labels.len() {
        return Err(CalibrateError::ShapeError {
            expected: format!("{} outcomes", probs.len()),
            actual: format!("{} outcomes", labels.len()),
        });
    }
    if probs.is_empty() {
        return Err(CalibrateError::ValidationError(
            "calibration measures need at least one instance".to_string(),
        ));
    }
    Ok(())
}

/// Expected Calibration Error
///
/// ECE = sum_b (|B_b| / n) * |acc(B_b) - conf(B_b)|
pub fn expected_calibration_error(
    probs: &Array1<f64>,
    labels: &Array1<f64>,
    n_bins: usize,
) -> Result<f64> {
    let reliability = reliability_diagram(probs, labels, n_bins)?;
    Ok(reliability
        .occupied()
        .map(|(w, acc, conf)| w * (acc - conf).abs())
        .sum())
}

/// Maximum Calibration Error, `max_b |acc(B_b) - conf(B_b)|`
pub fn maximum_calibration_error(
    probs: &Array1<f64>,
    labels: &Array1<f64>,
    n_bins: usize,
) -> Result<f64> {
    let reliability = reliability_diagram(probs, labels, n_bins)?;
    Ok(reliability
        .occupied()
        .map(|(_, acc, conf)| (acc - conf).abs())
        .fold(0.0, f64::max))
}

/// Brier score, `(1/n) * sum_i (p_i - y_i)^2`
pub fn brier_score(probs: &Array1<f64>, labels: &Array1<f64>) -> Result<f64> {
    check_lengths(probs, labels)?;
    let sum: f64 = probs
        .iter()
        .zip(labels.iter())
        .map(|(&p, &y)| (p - y).powi(2))
        .sum();
    Ok(sum / probs.len() as f64)
}

/// Bin confidences into `n_bins` equal-width bins over [0, 1]
///
/// Confidences outside [0, 1] land in the first or last bin.
pub fn reliability_diagram(
    probs: &Array1<f64>,
    labels: &Array1<f64>,
    n_bins: usize,
) -> Result<ReliabilityDiagram> {
    check_lengths(probs, labels)?;

    let n_bins = n_bins.max(1);
    let bin_width = 1.0 / n_bins as f64;
    let bin_edges: Vec<f64> = (0..=n_bins).map(|i| i as f64 * bin_width).collect();

    let mut bin_sums = vec![0.0; n_bins];
    let mut bin_correct = vec![0.0; n_bins];
    let mut bin_counts = vec![0usize; n_bins];

    for (&p, &y) in probs.iter().zip(labels.iter()) {
        let bin = ((p.max(0.0) / bin_width) as usize).min(n_bins - 1);
        bin_sums[bin] += p;
        bin_correct[bin] += y;
        bin_counts[bin] += 1;
    }

    let per_bin = |totals: &[f64]| -> Vec<f64> {
        totals
            .iter()
            .zip(&bin_counts)
            .map(|(&t, &c)| if c > 0 { t / c as f64 } else { 0.0 })
            .collect()
    };

    Ok(ReliabilityDiagram {
        bin_edges,
        bin_confidences: per_bin(&bin_sums),
        bin_accuracies: per_bin(&bin_correct),
        bin_counts,
    })
}

/// Compute every calibration measure over one binning
pub fn calibration_report(
    probs: &Array1<f64>,
    labels: &Array1<f64>,
    n_bins: usize,
) -> Result<CalibrationReport> {
    let reliability = reliability_diagram(probs, labels, n_bins)?;
    let mse = brier_score(probs, labels)?;
    let base_rate = labels.mean().unwrap_or(0.0);

    let mut absolute = 0.0;
    let mut square = 0.0;
    let mut max_error: f64 = 0.0;
    let mut sharpness = 0.0;
    for (w, acc, conf) in reliability.occupied() {
        let gap = acc - conf;
        absolute += w * gap.abs();
        square += w * gap * gap;
        max_error = max_error.max(gap.abs());
        sharpness += w * (acc - base_rate).powi(2);
    }

    Ok(CalibrationReport {
        num_instances: probs.len(),
        mse,
        absolute_calibration_error: absolute,
        square_calibration_error: square,
        max_calibration_error: max_error,
        sharpness,
        variance: base_rate * (1.0 - base_rate),
        reliability,
    })
}
