use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use rand::prelude::*;
use tessera::cluster::{Clustering, Kmeans};
use tessera::embed::rows_to_matrix;
use tessera::store::VectorStore;

fn random_rows(rng: &mut StdRng, n: usize, d: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|_| (0..d).map(|_| rng.random::<f32>()).collect())
        .collect()
}

fn bench_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");
    let mut rng = StdRng::seed_from_u64(42);
    let data = random_rows(&mut rng, 2000, 2);

    group.bench_function("fit_predict_n2000_d2_k10", |b| {
        b.iter(|| {
            let model = Kmeans::new(10).with_max_iter(20).with_seed(42);
            model.fit_predict(black_box(&data)).unwrap();
        })
    });

    group.finish();
}

fn bench_knn(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn");
    let mut rng = StdRng::seed_from_u64(7);
    let stored = rows_to_matrix(&random_rows(&mut rng, 5000, 384)).unwrap();
    let queries: Array2<f32> = rows_to_matrix(&random_rows(&mut rng, 32, 384)).unwrap();

    let mut store = VectorStore::new();
    store.build(stored.view()).unwrap();

    group.bench_function("query_n5000_d384_q32_k10", |b| {
        b.iter(|| store.query(black_box(queries.view()), 10).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_kmeans, bench_knn);
criterion_main!(benches);
