//! Integration test: expected-F1 plug-in prediction end-to-end

use multilabel_calibrate::prelude::*;
use ndarray::{array, ArrayView1};
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::Arc;

/// Base model returning the same joint distribution for every input
struct FixedModel {
    num_classes: usize,
    distribution: Vec<(MultiLabel, f64)>,
}

impl FixedModel {
    fn new(num_classes: usize, distribution: Vec<(Vec<usize>, f64)>) -> Self {
        Self {
            num_classes,
            distribution: distribution
                .into_iter()
                .map(|(labels, p)| (MultiLabel::from_labels(labels), p))
                .collect(),
        }
    }
}

impl MultiLabelModel for FixedModel {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict_class_probs(&self, _x: ArrayView1<'_, f64>) -> Vec<f64> {
        (0..self.num_classes)
            .map(|k| {
                self.distribution
                    .iter()
                    .filter(|(set, _)| set.matches(k))
                    .map(|(_, p)| p)
                    .sum()
            })
            .collect()
    }

    fn predict_assignment_probs(
        &self,
        _x: ArrayView1<'_, f64>,
        support: &SupportSet,
        threshold: f64,
    ) -> Vec<f64> {
        support
            .iter()
            .map(|candidate| {
                let p = self
                    .distribution
                    .iter()
                    .find(|(set, _)| set == candidate)
                    .map_or(0.0, |(_, p)| *p);
                if p < threshold {
                    0.0
                } else {
                    p
                }
            })
            .collect()
    }

    fn compute_joint(&self, _x: ArrayView1<'_, f64>, threshold: f64) -> JointDistribution {
        JointDistribution::new(
            self.distribution
                .iter()
                .filter(|(_, p)| *p >= threshold)
                .cloned()
                .collect(),
        )
    }

    fn samples(
        &self,
        _x: ArrayView1<'_, f64>,
        n: usize,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Vec<MultiLabel> {
        (0..n)
            .map(|_| {
                let mut u = rng.gen::<f64>();
                for (set, p) in &self.distribution {
                    if u < *p {
                        return set.clone();
                    }
                    u -= p;
                }
                MultiLabel::empty()
            })
            .collect()
    }
}

fn set(labels: &[usize]) -> MultiLabel {
    MultiLabel::from_labels(labels.to_vec())
}

fn four_candidate_model() -> Arc<FixedModel> {
    Arc::new(FixedModel::new(
        3,
        vec![
            (vec![], 0.1),
            (vec![1], 0.5),
            (vec![2], 0.35),
            (vec![1, 2], 0.05),
        ],
    ))
}

fn four_candidate_support() -> SupportSet {
    SupportSet::new(vec![set(&[]), set(&[1]), set(&[2]), set(&[1, 2])]).unwrap()
}

#[test]
fn test_f1_conventions() {
    let sets = [set(&[]), set(&[0]), set(&[0, 2]), set(&[1, 2, 3])];
    for p in &sets {
        assert_eq!(f1(p, p), 1.0, "F1 of a set with itself is 1");
        for t in &sets {
            assert_eq!(f1(p, t), f1(t, p), "F1 must be symmetric");
        }
        if !p.is_empty() {
            assert_eq!(f1(p, &MultiLabel::empty()), 0.0);
        }
    }
}

#[test]
fn test_two_candidate_support_picks_majority() {
    let a = set(&[0, 1]);
    let b = set(&[2]);
    let p = 0.7;
    let model = Arc::new(FixedModel::new(3, vec![(vec![0, 1], p), (vec![2], 1.0 - p)]));
    let plugin = PluginF1::new(model, PluginF1Config::new(PredictionMode::Support).with_pi_threshold(0.0))
        .unwrap()
        .with_support(SupportSet::new(vec![a.clone(), b.clone()]).unwrap());

    let decision = plugin.predict_decision(array![0.0].view()).unwrap();
    assert_eq!(decision.prediction, a);
    let expected = p * f1(&a, &a) + (1.0 - p) * f1(&a, &b);
    assert!((decision.expected_f1 - expected).abs() < 1e-12);
}

#[test]
fn test_four_candidate_scenario_matches_brute_force() {
    let plugin = PluginF1::new(
        four_candidate_model(),
        PluginF1Config::new(PredictionMode::Support)
            .with_pi_threshold(0.0)
            .with_max_size(2),
    )
    .unwrap()
    .with_support(four_candidate_support());

    let decision = plugin.predict_decision(array![0.0].view()).unwrap();

    let support = four_candidate_support();
    let probs = [0.1, 0.5, 0.35, 0.05];
    let (best, best_ef1) = support
        .iter()
        .map(|c| (c.clone(), GeneralF1Predictor::expected_f1(support.as_slice(), &probs, c)))
        .fold((MultiLabel::empty(), f64::NEG_INFINITY), |acc, item| {
            if item.1 > acc.1 + 1e-12 {
                item
            } else {
                acc
            }
        });

    assert_eq!(decision.prediction, best);
    assert!((decision.expected_f1 - best_ef1).abs() < 1e-12);
    // the pair collects overlap credit from both singletons
    assert_eq!(decision.prediction, set(&[1, 2]));
    assert!((decision.expected_f1 - 0.37 / 0.6).abs() < 1e-9);
}

#[test]
fn test_sampling_is_reproducible_and_close_to_exact() {
    let config = PluginF1Config::new(PredictionMode::Sampling)
        .with_num_samples(4000)
        .with_seed(7);
    let plugin = PluginF1::new(four_candidate_model(), config).unwrap();
    let x = array![0.0];

    let first = plugin.predict_decision(x.view()).unwrap();
    let second = plugin.predict_decision(x.view()).unwrap();
    assert_eq!(first, second, "same seed must give the same decision");
    assert_eq!(first.prediction, set(&[1, 2]));
    assert!((first.expected_f1 - 0.37 / 0.6).abs() < 0.05);
}

#[test]
fn test_sampling_non_empty_never_predicts_empty() {
    let model = Arc::new(FixedModel::new(2, vec![(vec![], 0.8), (vec![0], 0.2)]));
    let plain = PluginF1::new(model.clone(), PluginF1Config::new(PredictionMode::Sampling)).unwrap();
    let non_empty =
        PluginF1::new(model, PluginF1Config::new(PredictionMode::SamplingNonEmpty)).unwrap();
    let x = array![0.0];
    assert!(plain.predict(x.view()).unwrap().is_empty());
    assert_eq!(non_empty.predict(x.view()).unwrap(), set(&[0]));
}

#[test]
fn test_mode_state_and_config_errors() {
    let model = four_candidate_model();
    let x = array![0.0];

    for mode in [PredictionMode::Support, PredictionMode::Isotonic, PredictionMode::PMatrix] {
        let plugin = PluginF1::new(model.clone(), PluginF1Config::new(mode)).unwrap();
        assert!(
            matches!(plugin.predict(x.view()), Err(CalibrateError::ModelStateError(_))),
            "{} without state must fail",
            mode
        );
    }

    let with_support = PluginF1::new(model.clone(), PluginF1Config::new(PredictionMode::Isotonic))
        .unwrap()
        .with_support(four_candidate_support());
    assert!(matches!(
        with_support.predict(x.view()),
        Err(CalibrateError::ModelStateError(_))
    ));

    assert!(PluginF1::new(
        model,
        PluginF1Config::new(PredictionMode::Support).with_pi_threshold(1.0)
    )
    .is_err());
    assert!(SupportSet::new(Vec::new()).is_err());
    assert!(matches!(
        "greedy".parse::<PredictionMode>(),
        Err(CalibrateError::ConfigError(_))
    ));
    assert_eq!(
        "samplingNonEmpty".parse::<PredictionMode>().unwrap(),
        PredictionMode::SamplingNonEmpty
    );
}

#[test]
fn test_threshold_drops_mass_without_renormalizing() {
    let plugin = PluginF1::new(
        four_candidate_model(),
        PluginF1Config::new(PredictionMode::Support).with_pi_threshold(0.2),
    )
    .unwrap()
    .with_support(four_candidate_support());

    // only {1} (0.5) and {2} (0.35) survive
    let decision = plugin.predict_decision(array![0.0].view()).unwrap();
    assert_eq!(decision.prediction, set(&[1, 2]));
    assert!((decision.expected_f1 - 0.85 * 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_analysis_against_truth() {
    let plugin = PluginF1::new(four_candidate_model(), PluginF1Config::new(PredictionMode::Support))
        .unwrap()
        .with_support(four_candidate_support());
    let truth = set(&[1]);
    let analysis = plugin
        .predict_with_analysis(array![0.0].view(), Some(&truth))
        .unwrap();

    assert_eq!(analysis.prediction, set(&[1, 2]));
    assert_eq!(analysis.truth_prob, Some(0.5));
    assert!((analysis.realized_f1.unwrap() - 2.0 / 3.0).abs() < 1e-12);
    assert!((analysis.truth_expected_f1.unwrap() - (0.5 + 0.05 * 2.0 / 3.0)).abs() < 1e-12);

    let blind = plugin.predict_with_analysis(array![0.0].view(), None).unwrap();
    assert!(blind.truth_prob.is_none());
}

#[test]
fn test_binary_relevance_batch_prediction() {
    let model = Arc::new(
        BinaryRelevanceModel::new(array![[4.0, 0.0], [0.0, 4.0]], array![0.0, 0.0]).unwrap(),
    );
    let support = SupportSet::new(vec![set(&[]), set(&[0]), set(&[1]), set(&[0, 1])]).unwrap();
    let plugin = PluginF1::new(model, PluginF1Config::new(PredictionMode::Support).with_pi_threshold(0.0))
        .unwrap()
        .with_support(support);

    let features = array![[1.0, 1.0], [1.0, -1.0], [-1.0, 1.0]];
    let predictions = plugin.predict_batch(&features).unwrap();
    assert_eq!(predictions, vec![set(&[0, 1]), set(&[0]), set(&[1])]);
}
