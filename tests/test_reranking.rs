//! Integration test: vectorizer and reranker end-to-end

mod common;

use multilabel_calibrate::prelude::*;
use ndarray::Array1;
use std::sync::Arc;

fn full_vectorizer(train: &MultiLabelDataset) -> PredictionVectorizer {
    PredictionVectorizer::builder()
        .br_prob(true)
        .cbm_prob(true)
        .label_probs(true)
        .card_prior(true)
        .card(true)
        .set_prior(true)
        .f1_prior(true)
        .pair_prior(true)
        .encode_label(true)
        .position(true)
        .implication(true)
        .min_implication_support(1)
        .build(train, LabelCalibrator::Identity)
        .unwrap()
}

#[test]
fn test_vectorizer_is_deterministic() {
    let model = common::base_model();
    let train = common::miscalibrated_dataset(300, 11);
    let vectorizer = full_vectorizer(&train);
    let again = full_vectorizer(&train);
    assert_eq!(vectorizer, again);

    let candidate = MultiLabel::from_labels(vec![0, 2]);
    for i in 0..20 {
        let first = vectorizer
            .create_instance(model.as_ref(), train.row(i), &candidate, train.label(i))
            .unwrap();
        let second = vectorizer
            .create_instance(model.as_ref(), train.row(i), &candidate, train.label(i))
            .unwrap();
        let bits = |v: &Array1<f64>| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&first.features), bits(&second.features));
        assert_eq!(first.correctness, second.correctness);
        assert_eq!(first.features.len(), vectorizer.num_features());
    }
}

#[test]
fn test_training_data_contains_every_truth() {
    let model = common::base_model();
    let train = common::miscalibrated_dataset(200, 12);
    let vectorizer = full_vectorizer(&train);
    let data = vectorizer
        .create_cali_training_data(&train, model.as_ref(), 3)
        .unwrap();

    let positives = data.targets().iter().filter(|&&t| t == 1.0).count();
    assert_eq!(positives, train.num_data_points(), "one correct row per data point");
    assert!(data.len() >= train.num_data_points());
    assert!(data.len() <= train.num_data_points() * 4);
    assert_eq!(data.num_features(), vectorizer.num_features());
}

#[test]
fn test_monotone_reranker_respects_increasing_features() {
    common::init_tracing();
    let model = common::base_model();
    let train = common::miscalibrated_dataset(600, 13);
    let vectorizer = full_vectorizer(&train);
    let data = vectorizer
        .create_cali_training_data(&train, model.as_ref(), 5)
        .unwrap();
    let constraints = vectorizer
        .monotonicity_constraints(common::NUM_CLASSES)
        .unwrap();

    let config = RerankerConfig::default()
        .with_num_iterations(30)
        .with_num_candidates(5);
    let reranker = RerankerTrainer::new(config)
        .unwrap()
        .train(&data, model, vectorizer)
        .unwrap();

    for row in (0..data.len()).step_by(data.len() / 10 + 1) {
        let base = data.row(row).to_owned();
        for (j, constraint) in constraints.iter().enumerate() {
            if *constraint != Monotonicity::Increasing {
                continue;
            }
            let column = data.features().column(j);
            let lo = column.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = column.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

            let mut previous = f64::NEG_INFINITY;
            for step in 0..=10 {
                let mut shifted = base.clone();
                shifted[j] = lo + (hi - lo) * step as f64 / 10.0;
                let score = reranker.calibrate(shifted.view()).unwrap();
                assert!(
                    score >= previous - 1e-12,
                    "score decreased along feature {} at row {}",
                    j,
                    row
                );
                previous = score;
            }
        }
    }
}

#[test]
fn test_reranker_as_classifier() {
    common::init_tracing();
    let model = common::base_model();
    let train = common::miscalibrated_dataset(500, 14);
    let test = common::miscalibrated_dataset(100, 15);
    let vectorizer = PredictionVectorizer::builder()
        .br_prob(true)
        .card(true)
        .set_prior(true)
        .log_scale(true)
        .build(&train, LabelCalibrator::Identity)
        .unwrap();
    let data = vectorizer
        .create_cali_training_data(&train, model.as_ref(), 8)
        .unwrap();
    let reranker = RerankerTrainer::new(
        RerankerConfig::default()
            .with_num_iterations(25)
            .with_num_candidates(8),
    )
    .unwrap()
    .train(&data, Arc::clone(&model), vectorizer)
    .unwrap();

    for i in 0..test.num_data_points() {
        let (prediction, score) = reranker.predict_with_score(test.row(i)).unwrap();
        assert!((0.0..=1.0).contains(&score));
        let candidates = reranker
            .vectorizer()
            .candidates(model.as_ref(), test.row(i), 8);
        assert!(candidates.iter().any(|(c, _)| *c == prediction));
    }

    let measures = MultiLabelMeasures::evaluate(&reranker, &test).unwrap();
    assert_eq!(measures.num_instances, 100);
    assert!((0.0..=1.0).contains(&measures.subset_accuracy));
}

#[test]
fn test_degenerate_training_data_still_fits() {
    let model = common::base_model();
    let train = common::miscalibrated_dataset(50, 16);
    let vectorizer = PredictionVectorizer::builder()
        .build(&train, LabelCalibrator::Identity)
        .unwrap();
    let width = vectorizer.num_features();

    let empty = RegressionDataset::from_rows(Vec::new(), Vec::new(), width).unwrap();
    let reranker = RerankerTrainer::new(RerankerConfig::default())
        .unwrap()
        .train(&empty, Arc::clone(&model), vectorizer.clone())
        .unwrap();
    assert_eq!(reranker.calibrate(Array1::zeros(width).view()).unwrap(), 0.0);

    let negatives = RegressionDataset::from_rows(
        vec![Array1::from_elem(width, 0.2), Array1::from_elem(width, 0.8)],
        vec![0.0, 0.0],
        width,
    )
    .unwrap();
    let reranker = RerankerTrainer::new(RerankerConfig::default())
        .unwrap()
        .train(&negatives, model, vectorizer)
        .unwrap();
    assert_eq!(reranker.calibrate(Array1::from_elem(width, 0.5).view()).unwrap(), 0.0);
}
