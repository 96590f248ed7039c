use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use traitlens::{similarity, FeatureVector, SimilarityWeights, TraitEngine};

const EMBEDDING_SIZE: usize = 1000;

fn random_vector(rng: &mut StdRng, center: &[f32], spread: f32) -> FeatureVector {
    let values: Vec<f32> = center
        .iter()
        .map(|c| c + rng.random_range(-spread..=spread))
        .collect();
    FeatureVector::normalized(values.into())
}

fn centers(rng: &mut StdRng, count: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|_| (0..EMBEDDING_SIZE).map(|_| rng.random_range(0.0..1.0)).collect())
        .collect()
}

fn setup_benchmark_engine(values: usize, exemplars: usize) -> (TraitEngine, Vec<Vec<f32>>) {
    let mut rng = StdRng::seed_from_u64(7);
    let centers = centers(&mut rng, values);
    let engine = TraitEngine::builder()
        .add_category("Background")
        .unwrap()
        .build()
        .unwrap();
    for (v, center) in centers.iter().enumerate() {
        for e in 0..exemplars {
            engine
                .add_exemplar_vector(
                    "Background",
                    &format!("value_{}", v),
                    random_vector(&mut rng, center, 0.05),
                    &format!("{}-{}.png", v, e),
                    None,
                )
                .unwrap();
        }
    }
    (engine, centers)
}

fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("Similarity");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    let mut rng = StdRng::seed_from_u64(1);
    let center = centers(&mut rng, 1).remove(0);
    let a = random_vector(&mut rng, &center, 0.1);
    let b = random_vector(&mut rng, &center, 0.1);
    let weights = SimilarityWeights::default();

    group.bench_function("composite_1000d", |bench| {
        bench.iter(|| similarity(black_box(&a), black_box(&b), &weights))
    });

    group.finish();
}

fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("Classification");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    // Trait values x exemplars per value
    for (values, exemplars) in [(2, 5), (5, 8), (10, 12)] {
        let (engine, centers) = setup_benchmark_engine(values, exemplars);
        let mut rng = StdRng::seed_from_u64(99);
        let target = random_vector(&mut rng, &centers[0], 0.05);
        group.bench_with_input(
            BenchmarkId::new("classify_vector", format!("{}x{}", values, exemplars)),
            &target,
            |bench, target| bench.iter(|| engine.classify_vector("Background", black_box(target))),
        );
    }

    group.finish();
}

fn bench_threshold_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("Training");
    group.sample_size(20);

    let (engine, centers) = setup_benchmark_engine(5, 8);
    let mut rng = StdRng::seed_from_u64(3);
    let mut n = 0usize;
    group.bench_function("add_and_remove_exemplar", |bench| {
        bench.iter(|| {
            n += 1;
            let id = format!("bench-{}", n);
            engine
                .add_exemplar_vector("Background", "value_0", random_vector(&mut rng, &centers[0], 0.05), &id, None)
                .unwrap();
            engine.remove_exemplar("Background", "value_0", &id)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_similarity, bench_classification, bench_threshold_recompute);
criterion_main!(benches);
