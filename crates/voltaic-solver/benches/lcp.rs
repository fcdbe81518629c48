//! Benchmarks for the LCP pivoting solver.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nalgebra::{DMatrix, DVector};
use voltaic_solver::{LcpConfig, solve_lcp};

fn bench_lemke(c: &mut Criterion) {
    let mut group = c.benchmark_group("lemke");

    for size in [2, 4, 8, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &size,
            |bencher, &size| {
                // Diagonally dominant P-matrix, alternating forced pairs.
                let m = DMatrix::from_fn(size, size, |i, j| {
                    if i == j {
                        4.0
                    } else {
                        1.0 / ((i as f64 - j as f64).abs() + 2.0)
                    }
                });
                let q = DVector::from_fn(size, |i, _| {
                    if i % 2 == 0 { -1.0 - i as f64 } else { 0.5 }
                });
                let config = LcpConfig::default();

                bencher.iter(|| solve_lcp(black_box(&m), black_box(&q), black_box(&config)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_lemke);
criterion_main!(benches);
