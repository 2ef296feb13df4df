//! Performance benchmarks for curve blending and the weight-grid search.
//!
//! Run with: cargo bench

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mosaic::analytics::{MetricsConfig, PerformanceMetrics};
use mosaic::data::MemoryCurveStore;
use mosaic::optimizer::{Optimizer, OptimizerConfig, WeightGrid};
use mosaic::portfolio::AlignedCurves;
use mosaic::types::{EquityCurve, StrategyRef};

/// Generate a synthetic daily equity curve for benchmarking.
fn generate_curve(days: usize, phase: f64) -> EquityCurve {
    let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let mut value = 10_000.0;
    let mut dates = Vec::with_capacity(days);
    let mut values = Vec::with_capacity(days);

    for i in 0..days {
        let noise = ((i as f64 * 0.7 + phase).sin() * 2.0 + (i as f64 * 1.3).cos()) * 0.003;
        value *= 1.0 + 0.0003 + noise;
        dates.push(base + chrono::Duration::days(i as i64));
        values.push(value);
    }
    EquityCurve::from_parts(&dates, &values).unwrap()
}

fn generate_store(strategies: usize, days: usize) -> (MemoryCurveStore, Vec<StrategyRef>) {
    let mut store = MemoryCurveStore::new();
    let mut refs = Vec::with_capacity(strategies);
    for i in 0..strategies {
        let s = StrategyRef::new(format!("T{}", i), "Aggressive").unwrap();
        store.add(s.clone(), generate_curve(days, i as f64));
        refs.push(s);
    }
    (store, refs)
}

/// Benchmark candidate generation.
fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid");

    for strategies in [2usize, 3, 4, 5].iter() {
        group.bench_with_input(
            BenchmarkId::new("candidates_step_0.1", strategies),
            strategies,
            |b, &n| {
                let grid = WeightGrid::new(n, 0.1).unwrap();
                b.iter(|| black_box(&grid).candidates())
            },
        );
    }

    group.finish();
}

/// Benchmark blending and scoring a single allocation.
fn bench_blend(c: &mut Criterion) {
    let mut group = c.benchmark_group("blend");
    let curves: Vec<EquityCurve> = (0..3).map(|i| generate_curve(1000, i as f64)).collect();
    let aligned = AlignedCurves::new(&curves).unwrap();
    let config = MetricsConfig::default();

    group.bench_function("align_3x1000", |b| {
        b.iter(|| AlignedCurves::new(black_box(&curves)))
    });

    group.bench_function("blend_and_score_3x1000", |b| {
        b.iter(|| {
            let values = aligned.blend_values(black_box(&[0.5, 0.3, 0.2]), 20_000.0);
            PerformanceMetrics::calculate(&values, 20_000.0, &config)
        })
    });

    group.finish();
}

/// Benchmark full sweeps.
fn bench_optimization(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimization");
    group.sample_size(10); // Fewer samples for slow benchmarks

    let (store, strategies) = generate_store(4, 500);

    for parallel in [false, true].iter() {
        let optimizer = Optimizer::new(
            store.clone(),
            OptimizerConfig {
                parallel: *parallel,
                ..Default::default()
            },
        );
        let label = if *parallel { "parallel" } else { "sequential" };
        group.bench_function(format!("sweep_4x500_{}", label), |b| {
            b.iter(|| optimizer.run(black_box(&strategies), None))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_grid, bench_blend, bench_optimization);

criterion_main!(benches);
