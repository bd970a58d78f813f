//! Label-set statistics collected from the training labels

use crate::dataset::MultiLabelDataset;
use crate::multilabel::{f1, MultiLabel};
use serde::{Deserialize, Serialize};

/// An implied label pair: every training set containing `premise` also
/// contains `conclusion`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Implication {
    pub premise: usize,
    pub conclusion: usize,
}

impl Implication {
    /// Whether a label set respects `premise => conclusion`
    pub fn holds_for(&self, set: &MultiLabel) -> bool {
        !set.matches(self.premise) || set.matches(self.conclusion)
    }
}

/// Empirical priors over training label sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSetPriors {
    num_classes: usize,
    /// Distinct training sets with their frequencies, sorted by set
    set_frequencies: Vec<(MultiLabel, f64)>,
    /// Frequency of each cardinality `0..=K`
    cardinality_frequencies: Vec<f64>,
    implications: Vec<Implication>,
    /// Per implication, the frequency of the four membership configurations
    /// indexed by `2 * [premise present] + [conclusion present]`
    pair_frequencies: Vec<[f64; 4]>,
}

impl LabelSetPriors {
    /// Collect statistics from `dataset`
    ///
    /// A pair `(a, b)` is implied when label `a` occurs at least
    /// `min_implication_support` times and `b` accompanies it every time.
    pub fn from_dataset(dataset: &MultiLabelDataset, min_implication_support: usize) -> Self {
        let num_classes = dataset.num_classes();
        let labels = dataset.labels();
        let n = labels.len();
        let weight = if n == 0 { 0.0 } else { 1.0 / n as f64 };

        let mut sorted: Vec<&MultiLabel> = labels.iter().collect();
        sorted.sort();
        let mut set_frequencies: Vec<(MultiLabel, f64)> = Vec::new();
        for set in sorted {
            match set_frequencies.last_mut() {
                Some((last, freq)) if last == set => *freq += weight,
                _ => set_frequencies.push((set.clone(), weight)),
            }
        }

        let mut cardinality_frequencies = vec![0.0; num_classes + 1];
        let mut label_counts = vec![0usize; num_classes];
        let mut co_counts = vec![vec![0usize; num_classes]; num_classes];
        for set in labels {
            cardinality_frequencies[set.cardinality().min(num_classes)] += weight;
            for &a in set.labels() {
                label_counts[a] += 1;
                for &b in set.labels() {
                    co_counts[a][b] += 1;
                }
            }
        }

        let mut implications = Vec::new();
        for a in 0..num_classes {
            if label_counts[a] == 0 || label_counts[a] < min_implication_support {
                continue;
            }
            for b in 0..num_classes {
                if a != b && co_counts[a][b] == label_counts[a] {
                    implications.push(Implication {
                        premise: a,
                        conclusion: b,
                    });
                }
            }
        }

        let pair_frequencies = implications
            .iter()
            .map(|imp| {
                let mut freq = [0.0; 4];
                for set in labels {
                    freq[pair_configuration(imp, set)] += weight;
                }
                freq
            })
            .collect();

        Self {
            num_classes,
            set_frequencies,
            cardinality_frequencies,
            implications,
            pair_frequencies,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn implications(&self) -> &[Implication] {
        &self.implications
    }

    /// Training frequency of exactly this set
    pub fn set_prior(&self, set: &MultiLabel) -> f64 {
        self.set_frequencies
            .binary_search_by(|(s, _)| s.cmp(set))
            .map_or(0.0, |i| self.set_frequencies[i].1)
    }

    /// Training frequency of sets with this cardinality
    pub fn cardinality_prior(&self, cardinality: usize) -> f64 {
        self.cardinality_frequencies
            .get(cardinality)
            .copied()
            .unwrap_or(0.0)
    }

    /// Expected F1 of `set` when the truth follows the training distribution
    pub fn f1_prior(&self, set: &MultiLabel) -> f64 {
        self.set_frequencies
            .iter()
            .map(|(truth, freq)| freq * f1(set, truth))
            .sum()
    }

    /// Per implication, the training frequency of `set`'s configuration on that pair
    pub fn pair_priors(&self, set: &MultiLabel) -> impl Iterator<Item = f64> + '_ {
        let set = set.clone();
        self.implications
            .iter()
            .zip(&self.pair_frequencies)
            .map(move |(imp, freq)| freq[pair_configuration(imp, &set)])
    }
}

fn pair_configuration(imp: &Implication, set: &MultiLabel) -> usize {
    2 * usize::from(set.matches(imp.premise)) + usize::from(set.matches(imp.conclusion))
}
