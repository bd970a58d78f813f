//! Shared fixtures for integration tests

#![allow(dead_code)]

use multilabel_calibrate::prelude::*;
use ndarray::{array, Array2};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::Arc;

pub const NUM_CLASSES: usize = 3;

/// Route library events to the test output, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Overconfident binary relevance model over two features
pub fn base_model() -> Arc<BinaryRelevanceModel> {
    Arc::new(
        BinaryRelevanceModel::new(
            array![[2.5, 0.0], [0.0, 2.5], [1.5, 1.5]],
            array![0.0, 0.0, -0.5],
        )
        .expect("valid weights"),
    )
}

/// Data whose labels are drawn with probability `p²`, where `p` is the
/// base model's marginal
pub fn miscalibrated_dataset(n: usize, seed: u64) -> MultiLabelDataset {
    let model = base_model();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut features = Array2::zeros((n, 2));
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        features[[i, 0]] = rng.gen_range(-2.0..2.0);
        features[[i, 1]] = rng.gen_range(-2.0..2.0);
        let marginals = model.predict_class_probs(features.row(i));
        let set: MultiLabel = marginals
            .iter()
            .enumerate()
            .filter(|(_, &p)| rng.gen::<f64>() < p * p)
            .map(|(k, _)| k)
            .collect();
        labels.push(set);
    }
    MultiLabelDataset::new(features, labels, NUM_CLASSES).expect("consistent dataset")
}
