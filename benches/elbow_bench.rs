//! Elbow selection benchmarks
//!
//! Compares single-run selection across tail sizes and the parallel batch
//! API across run counts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use subclu_fast::{select_optimal_k_batch, select_optimal_k_with, ElbowConfig};

/// Noisy, roughly exponential merge distances (ascending).
fn merge_distances(n_merges: usize, seed: u64) -> Vec<f64> {
    // Simple deterministic pseudo-random for reproducibility
    let mut s = seed;
    let mut total = 0.0;
    (0..n_merges)
        .map(|i| {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
            let jitter = ((s >> 33) as f64) / (u32::MAX as f64);
            total += jitter * 0.01 + (i as f64 / n_merges as f64).powi(4);
            total
        })
        .collect()
}

fn bench_select_optimal_k(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_optimal_k");
    let distances = merge_distances(50_000, 7);

    for n_tail in [100, 500, 5_000] {
        let config = ElbowConfig {
            n_tail,
            ..ElbowConfig::default()
        };
        let id = BenchmarkId::from_parameter(format!("tail_{n_tail}"));
        group.bench_with_input(id, &config, |b, config| {
            b.iter(|| select_optimal_k_with(black_box(&distances), config).unwrap());
        });
    }

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_optimal_k_batch");
    let config = ElbowConfig::default();

    for n_runs in [8, 64, 256] {
        let runs: Vec<Vec<f64>> = (0..n_runs).map(|i| merge_distances(10_000, i as u64)).collect();
        let id = BenchmarkId::from_parameter(format!("{n_runs}_runs"));
        group.bench_with_input(id, &runs, |b, runs| {
            b.iter(|| select_optimal_k_batch(black_box(runs), &config));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_select_optimal_k, bench_batch);
criterion_main!(benches);
