//! Benchmarks for the equilibrium solvers, the hot path of every fit:
//! each objective evaluation solves the equilibrium once per data point,
//! and a bootstrap run performs thousands of such evaluations.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use protbind::equilibrium::{solve_free, BindingSites};

fn bench_solvers(c: &mut Criterion) {
    let totals: Vec<f64> = (0..50).map(|i| 0.5 * 1.15f64.powi(i)).collect();
    let one_site = [10.0, 50.0];
    let two_site = [5.0, 20.0, 80.0, 40.0];

    c.bench_function("one_site_solve_50_points", |b| {
        b.iter(|| solve_free(BindingSites::One, black_box(&one_site), black_box(&totals)))
    });

    c.bench_function("two_site_solve_50_points", |b| {
        b.iter(|| solve_free(BindingSites::Two, black_box(&two_site), black_box(&totals)))
    });
}

criterion_group!(benches, bench_solvers);
criterion_main!(benches);
