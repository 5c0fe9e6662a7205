use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mvtboost_cluster::{hierarchical, DistanceMatrix, DistanceMethod, Linkage};
use mvtboost_core::Matrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A non-negative `p x pairs` matrix shaped like a covex table.
fn random_covex(p: usize, pairs: usize, seed: u64) -> Matrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let values: Vec<f64> = (0..p * pairs).map(|_| rng.random::<f64>().powi(2)).collect();
    Matrix::from_row_major(values, p, pairs).unwrap()
}

fn bench_distances(c: &mut Criterion) {
    let mut group = c.benchmark_group("distances");

    let covex = random_covex(500, 21, 42);
    for method in [DistanceMethod::Manhattan, DistanceMethod::Euclidean] {
        group.bench_function(format!("500x21_{method}"), |b| {
            b.iter(|| DistanceMatrix::between_rows(black_box(&covex), method))
        });
    }

    group.finish();
}

fn bench_hierarchical(c: &mut Criterion) {
    let mut group = c.benchmark_group("hierarchical");

    let covex = random_covex(200, 10, 7);
    let distances = DistanceMatrix::between_rows(&covex, DistanceMethod::Manhattan).unwrap();

    for linkage in [Linkage::Complete, Linkage::Average, Linkage::Ward] {
        group.bench_function(format!("200_{linkage}"), |b| {
            b.iter(|| hierarchical(black_box(&distances), linkage))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_distances, bench_hierarchical);
criterion_main!(benches);
