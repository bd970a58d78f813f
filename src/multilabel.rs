//! Label sets and candidate supports

use crate::dataset::MultiLabelDataset;
use crate::error::{CalibrateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An immutable set of label indices out of `K` classes
///
/// Labels are kept sorted, so equality, hashing and ordering are all set
/// semantics. Ordering compares the ordered label lists element by element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MultiLabel {
    labels: Vec<usize>,
}

impl MultiLabel {
    /// The empty label set
    pub fn empty() -> Self {
        Self { labels: Vec::new() }
    }

    /// Build a label set from any collection of indices (duplicates collapse)
    pub fn from_labels<I: IntoIterator<Item = usize>>(labels: I) -> Self {
        let mut labels: Vec<usize> = labels.into_iter().collect();
        labels.sort_unstable();
        labels.dedup();
        Self { labels }
    }

    /// Build a label set from a 0/1 indicator vector (values > 0.5 are members)
    pub fn from_indicator(indicator: &[f64]) -> Self {
        Self {
            labels: indicator
                .iter()
                .enumerate()
                .filter(|(_, &v)| v > 0.5)
                .map(|(k, _)| k)
                .collect(),
        }
    }

    /// Whether class `k` is in the set
    pub fn matches(&self, k: usize) -> bool {
        self.labels.binary_search(&k).is_ok()
    }

    /// Number of labels in the set
    pub fn cardinality(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in increasing order
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Largest label index, if any
    pub fn max_label(&self) -> Option<usize> {
        self.labels.last().copied()
    }

    /// Size of the intersection with another set
    pub fn intersection_size(&self, other: &MultiLabel) -> usize {
        let (mut i, mut j, mut count) = (0, 0, 0);
        while i < self.labels.len() && j < other.labels.len() {
            match self.labels[i].cmp(&other.labels[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    count += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        count
    }

    /// Dense 0/1 indicator of length `num_classes`
    pub fn to_indicator(&self, num_classes: usize) -> Vec<f64> {
        let mut indicator = vec![0.0; num_classes];
        for &k in &self.labels {
            if k < num_classes {
                indicator[k] = 1.0;
            }
        }
        indicator
    }
}

impl FromIterator<usize> for MultiLabel {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::from_labels(iter)
    }
}

impl From<Vec<usize>> for MultiLabel {
    fn from(labels: Vec<usize>) -> Self {
        Self::from_labels(labels)
    }
}

impl fmt::Display for MultiLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, k) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", k)?;
        }
        write!(f, "}}")
    }
}

/// F1 between a predicted set and a true set
///
/// `2|P∩T| / (|P|+|T|)`, with F1 = 1 when both sets are empty and 0 when
/// exactly one of them is.
pub fn f1(predicted: &MultiLabel, truth: &MultiLabel) -> f64 {
    let denom = predicted.cardinality() + truth.cardinality();
    if denom == 0 {
        return 1.0;
    }
    2.0 * predicted.intersection_size(truth) as f64 / denom as f64
}

/// An ordered, non-empty collection of distinct candidate label sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportSet {
    candidates: Vec<MultiLabel>,
}

impl SupportSet {
    /// Build a support from explicit candidates, keeping first occurrences
    pub fn new(candidates: Vec<MultiLabel>) -> Result<Self> {
        let mut seen = std::collections::HashSet::with_capacity(candidates.len());
        let candidates: Vec<MultiLabel> = candidates
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect();

        if candidates.is_empty() {
            return Err(CalibrateError::ConfigError(
                "support set must contain at least one candidate".to_string(),
            ));
        }
        Ok(Self { candidates })
    }

    /// Label sets observed in a dataset, in first-seen order
    ///
    /// Sets observed fewer than `min_count` times are pruned.
    pub fn from_dataset(dataset: &MultiLabelDataset, min_count: usize) -> Result<Self> {
        let mut counts: HashMap<&MultiLabel, usize> = HashMap::new();
        let mut order: Vec<&MultiLabel> = Vec::new();
        for label in dataset.labels() {
            let count = counts.entry(label).or_insert(0);
            if *count == 0 {
                order.push(label);
            }
            *count += 1;
        }

        let candidates = order
            .into_iter()
            .filter(|label| counts[label] >= min_count)
            .cloned()
            .collect();
        Self::new(candidates)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Always false for a constructed support; kept for API symmetry
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MultiLabel> {
        self.candidates.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MultiLabel> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[MultiLabel] {
        &self.candidates
    }

    /// Index of a candidate within the support
    pub fn position(&self, candidate: &MultiLabel) -> Option<usize> {
        self.candidates.iter().position(|c| c == candidate)
    }

    /// Index of the empty set, if the support contains it
    pub fn empty_index(&self) -> Option<usize> {
        self.candidates.iter().position(|c| c.is_empty())
    }
}

impl<'a> IntoIterator for &'a SupportSet {
    type Item = &'a MultiLabel;
    type IntoIter = std::slice::Iter<'a, MultiLabel>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}
