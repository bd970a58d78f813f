use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use multilabel_calibrate::prelude::*;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::Arc;

fn random_support(rng: &mut Xoshiro256PlusPlus, num_classes: usize, size: usize) -> Vec<MultiLabel> {
    let mut sets: Vec<MultiLabel> = Vec::with_capacity(size);
    while sets.len() < size {
        let set: MultiLabel = (0..num_classes).filter(|_| rng.gen::<f64>() < 0.2).collect();
        if !sets.contains(&set) {
            sets.push(set);
        }
    }
    sets
}

fn random_model(rng: &mut Xoshiro256PlusPlus, num_classes: usize, num_features: usize) -> BinaryRelevanceModel {
    let weights = Array2::from_shape_fn((num_classes, num_features), |_| rng.gen_range(-1.0..1.0));
    let bias = Array1::from_elem(num_classes, -1.0);
    BinaryRelevanceModel::new(weights, bias).unwrap()
}

fn bench_support_argmax(c: &mut Criterion) {
    let mut group = c.benchmark_group("support_argmax");
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
    let predictor = GeneralF1Predictor::default();

    for size in [16, 64, 256].iter() {
        let support = random_support(&mut rng, 12, *size);
        let mut probs: Vec<f64> = (0..*size).map(|_| rng.gen::<f64>()).collect();
        let total: f64 = probs.iter().sum();
        probs.iter_mut().for_each(|p| *p /= total);

        group.bench_with_input(BenchmarkId::new("predict_over_support", size), size, |b, _| {
            b.iter(|| {
                predictor
                    .predict_over_support(black_box(&support), black_box(&probs))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_gfm(c: &mut Criterion) {
    let mut group = c.benchmark_group("gfm");
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
    let predictor = GeneralF1Predictor::default();

    for num_classes in [10, 50, 200].iter() {
        let model = random_model(&mut rng, *num_classes, 8);
        let x = Array1::from_shape_fn(8, |_| rng.gen_range(-1.0..1.0));
        let samples = model.samples(x.view(), 1000, &mut rng);

        group.bench_with_input(
            BenchmarkId::new("predict_from_samples", num_classes),
            num_classes,
            |b, &k| b.iter(|| predictor.predict_from_samples(k, black_box(&samples)).unwrap()),
        );
    }

    group.finish();
}

fn bench_plugin_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("plugin_f1");
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
    let model = Arc::new(random_model(&mut rng, 12, 8));
    let support = SupportSet::new(random_support(&mut rng, 12, 128)).unwrap();
    let x = Array1::from_shape_fn(8, |_| rng.gen_range(-1.0..1.0));

    for mode in [PredictionMode::Support, PredictionMode::Sampling] {
        let plugin = PluginF1::new(Arc::clone(&model), PluginF1Config::new(mode))
            .unwrap()
            .with_support(support.clone());
        group.bench_function(BenchmarkId::new("predict", mode), |b| {
            b.iter(|| plugin.predict(black_box(x.view())).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_support_argmax, bench_gfm, bench_plugin_modes);
criterion_main!(benches);
