//! Partitioning hot-path benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Point2;
use vanetsim_cluster::candidate::Candidate;
use vanetsim_cluster::{dbscan, kmeans, mobility};
use vanetsim_core::config::ClusteringConfig;

fn population(n: u64) -> Vec<Candidate> {
    (0..n)
        .map(|i| Candidate {
            id: i,
            position: Point2::new((i as f64 * 83.0) % 4000.0, (i as f64 * 47.0) % 2000.0),
            speed: 18.0 + (i % 7) as f64,
            heading: (i % 4) as f64 * 0.1,
            lane: (i % 3) as u32,
            trust: 0.4 + (i % 6) as f64 * 0.1,
        })
        .collect()
}

fn bench_partitioning(c: &mut Criterion) {
    let config = ClusteringConfig::default();
    let mut group = c.benchmark_group("partition");

    for &n in &[100u64, 400, 1000] {
        let candidates = population(n);
        group.bench_with_input(BenchmarkId::new("mobility", n), &candidates, |b, cs| {
            b.iter(|| mobility::partition(black_box(cs), &config));
        });
        group.bench_with_input(BenchmarkId::new("kmeans", n), &candidates, |b, cs| {
            b.iter(|| kmeans::partition(black_box(cs), &config));
        });
        group.bench_with_input(BenchmarkId::new("dbscan", n), &candidates, |b, cs| {
            b.iter(|| dbscan::partition(black_box(cs), &config));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_partitioning);
criterion_main!(benches);
