//! Leaf-wise least-squares regression tree with monotone constraints
//!
//! Growth is best-first: the leaf whose split reduces squared error the most
//! is expanded next, until `num_leaves` leaves exist or no split helps.
//!
//! Monotone constraints follow the basic bound-propagation scheme. Every
//! leaf carries an interval its value is clamped to. A split on an
//! increasing feature is only accepted when the clamped left value does not
//! exceed the clamped right value, and the children's intervals are cut at
//! the midpoint of the two values, so every leaf left of the split stays
//! below every leaf right of it.

use super::Monotonicity;
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const MIN_GAIN: f64 = 1e-12;

/// Shape limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub num_leaves: usize,
    pub min_data_in_leaf: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, sample: ArrayView1<'_, f64>) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }

    fn num_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.num_leaves() + right.num_leaves(),
        }
    }
}

/// A fitted regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: TreeNode,
}

/// Inclusive interval a leaf value must stay in
#[derive(Debug, Clone, Copy)]
struct Bounds {
    lower: f64,
    upper: f64,
}

impl Bounds {
    fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }
}

/// Squared-error reduction of predicting `w` instead of 0 for a set with
/// residual sum `sum` and size `n`
fn reduction(sum: f64, n: f64, w: f64) -> f64 {
    2.0 * w * sum - n * w * w
}

struct Candidate {
    gain: f64,
    feature: usize,
    threshold: f64,
    left_value: f64,
    right_value: f64,
    left_indices: Vec<usize>,
    right_indices: Vec<usize>,
}

fn best_split_for_feature(
    x: &Array2<f64>,
    residuals: &[f64],
    indices: &[usize],
    feature: usize,
    constraint: Monotonicity,
    bounds: Bounds,
    min_data_in_leaf: usize,
) -> Option<Candidate> {
    let mut sorted: Vec<(usize, f64)> = indices.iter().map(|&i| (i, x[[i, feature]])).collect();
    sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let n = sorted.len();
    let total: f64 = indices.iter().map(|&i| residuals[i]).sum();
    let parent = reduction(total, n as f64, bounds.clamp(total / n as f64));

    let mut left_sum = 0.0;
    let mut best: Option<(f64, usize, f64, f64)> = None;

    for pos in 0..n.saturating_sub(1) {
        left_sum += residuals[sorted[pos].0];
        let left_n = pos + 1;
        let right_n = n - left_n;
        if left_n < min_data_in_leaf || right_n < min_data_in_leaf {
            continue;
        }
        if sorted[pos].1 == sorted[pos + 1].1 {
            continue;
        }

        let right_sum = total - left_sum;
        let wl = bounds.clamp(left_sum / left_n as f64);
        let wr = bounds.clamp(right_sum / right_n as f64);
        let feasible = match constraint {
            Monotonicity::None => true,
            Monotonicity::Increasing => wl <= wr,
            Monotonicity::Decreasing => wl >= wr,
        };
        if !feasible {
            continue;
        }

        let gain = reduction(left_sum, left_n as f64, wl) + reduction(right_sum, right_n as f64, wr) - parent;
        if gain > best.map_or(MIN_GAIN, |b| b.0) {
            best = Some((gain, left_n, wl, wr));
        }
    }

    best.map(|(gain, cut, left_value, right_value)| Candidate {
        gain,
        feature,
        threshold: (sorted[cut - 1].1 + sorted[cut].1) / 2.0,
        left_value,
        right_value,
        left_indices: sorted[..cut].iter().map(|&(i, _)| i).collect(),
        right_indices: sorted[cut..].iter().map(|&(i, _)| i).collect(),
    })
}

struct PendingSplit {
    node_id: usize,
    candidate: Candidate,
}

impl PartialEq for PendingSplit {
    fn eq(&self, other: &Self) -> bool {
        self.candidate.gain == other.candidate.gain
    }
}
impl Eq for PendingSplit {}
impl PartialOrd for PendingSplit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingSplit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.candidate
            .gain
            .partial_cmp(&other.candidate.gain)
            .unwrap_or(Ordering::Equal)
            // earlier nodes first among equal gains
            .then_with(|| other.node_id.cmp(&self.node_id))
    }
}

enum NodeSlot {
    Leaf { indices: Vec<usize>, bounds: Bounds },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

impl RegressionTree {
    /// Fit residuals on the rows listed in `indices`
    pub(crate) fn fit(
        x: &Array2<f64>,
        residuals: &[f64],
        indices: &[usize],
        constraints: &[Monotonicity],
        config: &TreeConfig,
    ) -> Self {
        let find_split = |indices: &[usize], bounds: Bounds| -> Option<Candidate> {
            if indices.len() < 2 * config.min_data_in_leaf.max(1) {
                return None;
            }
            let candidates: Vec<Candidate> = (0..x.ncols())
                .into_par_iter()
                .filter_map(|feature| {
                    let constraint = constraints.get(feature).copied().unwrap_or_default();
                    best_split_for_feature(
                        x,
                        residuals,
                        indices,
                        feature,
                        constraint,
                        bounds,
                        config.min_data_in_leaf,
                    )
                })
                .collect();
            // strict comparison keeps the lowest feature index among ties
            candidates.into_iter().fold(None, |best: Option<Candidate>, c| match best {
                Some(b) if b.gain >= c.gain => Some(b),
                _ => Some(c),
            })
        };

        let mut nodes = vec![NodeSlot::Leaf {
            indices: indices.to_vec(),
            bounds: Bounds::unbounded(),
        }];
        let mut heap = BinaryHeap::new();
        if let Some(candidate) = find_split(indices, Bounds::unbounded()) {
            heap.push(PendingSplit { node_id: 0, candidate });
        }

        let mut num_leaves = 1;
        while num_leaves < config.num_leaves {
            let Some(PendingSplit { node_id, candidate }) = heap.pop() else {
                break;
            };
            let bounds = match &nodes[node_id] {
                NodeSlot::Leaf { bounds, .. } => *bounds,
                NodeSlot::Split { .. } => continue,
            };

            let feature = candidate.feature;
            let constraint = constraints.get(feature).copied().unwrap_or_default();
            let mid = (candidate.left_value + candidate.right_value) / 2.0;
            let (left_bounds, right_bounds) = match constraint {
                Monotonicity::None => (bounds, bounds),
                Monotonicity::Increasing => (
                    Bounds { upper: mid, ..bounds },
                    Bounds { lower: mid, ..bounds },
                ),
                Monotonicity::Decreasing => (
                    Bounds { lower: mid, ..bounds },
                    Bounds { upper: mid, ..bounds },
                ),
            };

            let left_id = nodes.len();
            let right_id = left_id + 1;
            for (child_id, child_indices, child_bounds) in [
                (left_id, &candidate.left_indices, left_bounds),
                (right_id, &candidate.right_indices, right_bounds),
            ] {
                if let Some(next) = find_split(child_indices, child_bounds) {
                    heap.push(PendingSplit {
                        node_id: child_id,
                        candidate: next,
                    });
                }
            }
            nodes.push(NodeSlot::Leaf {
                indices: candidate.left_indices,
                bounds: left_bounds,
            });
            nodes.push(NodeSlot::Leaf {
                indices: candidate.right_indices,
                bounds: right_bounds,
            });
            nodes[node_id] = NodeSlot::Split {
                feature,
                threshold: candidate.threshold,
                left: left_id,
                right: right_id,
            };
            num_leaves += 1;
        }

        fn to_node(nodes: &[NodeSlot], id: usize, residuals: &[f64]) -> TreeNode {
            match &nodes[id] {
                NodeSlot::Leaf { indices, bounds } => {
                    let mean = if indices.is_empty() {
                        0.0
                    } else {
                        indices.iter().map(|&i| residuals[i]).sum::<f64>() / indices.len() as f64
                    };
                    TreeNode::Leaf {
                        value: bounds.clamp(mean),
                    }
                }
                NodeSlot::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => TreeNode::Split {
                    feature: *feature,
                    threshold: *threshold,
                    left: Box::new(to_node(nodes, *left, residuals)),
                    right: Box::new(to_node(nodes, *right, residuals)),
                },
            }
        }

        Self {
            root: to_node(&nodes, 0, residuals),
        }
    }

    pub fn predict(&self, sample: ArrayView1<'_, f64>) -> f64 {
        self.root.predict(sample)
    }

    pub fn num_leaves(&self) -> usize {
        self.root.num_leaves()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn config(num_leaves: usize) -> TreeConfig {
        TreeConfig {
            num_leaves,
            min_data_in_leaf: 1,
        }
    }

    #[test]
    fn test_step_is_recovered() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let residuals = [0.0, 0.0, 1.0, 1.0];
        let tree = RegressionTree::fit(&x, &residuals, &[0, 1, 2, 3], &[], &config(4));
        assert_eq!(tree.num_leaves(), 2);
        assert_eq!(tree.predict(array![0.5].view()), 0.0);
        assert_eq!(tree.predict(array![2.5].view()), 1.0);
    }

    #[test]
    fn test_leaf_limit() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let residuals = [5.0, -3.0, 4.0, -2.0, 1.0];
        let tree = RegressionTree::fit(&x, &residuals, &[0, 1, 2, 3, 4], &[], &config(3));
        assert!(tree.num_leaves() <= 3);
    }

    #[test]
    fn test_increasing_constraint_blocks_decreasing_fit() {
        // residuals fall with x, which an increasing feature cannot express
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let residuals = [3.0, 2.0, 1.0, 0.0];
        let tree = RegressionTree::fit(
            &x,
            &residuals,
            &[0, 1, 2, 3],
            &[Monotonicity::Increasing],
            &config(4),
        );
        assert_eq!(tree.num_leaves(), 1);
        assert!((tree.predict(array![0.0].view()) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_constrained_tree_is_monotone() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]];
        let residuals = [0.0, 2.0, 1.0, 0.5, 3.0, 2.5];
        let tree = RegressionTree::fit(
            &x,
            &residuals,
            &[0, 1, 2, 3, 4, 5],
            &[Monotonicity::Increasing, Monotonicity::None],
            &config(6),
        );
        for other in [0.0, 1.0] {
            let mut previous = f64::NEG_INFINITY;
            for step in 0..=50 {
                let value = tree.predict(array![step as f64 / 10.0, other].view());
                assert!(value >= previous - 1e-12);
                previous = value;
            }
        }
    }
}
