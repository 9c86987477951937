//! Sift benchmarks
//!
//! Run with: cargo bench --bench sift

use std::f64::consts::PI;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use emd_sift::{ensemble_sift, mask_sift, sift, EnsembleOptions, InterpMethod, MaskSiftOptions, SiftOptions};

fn two_tone(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64 / 1000.0;
            (2.0 * PI * 3.0 * t).sin() + 0.5 * (2.0 * PI * 41.0 * t).cos() + 0.1 * t
        })
        .collect()
}

fn bench_sift(c: &mut Criterion) {
    let mut group = c.benchmark_group("sift");

    for n in [1_000usize, 10_000] {
        let x = two_tone(n);
        group.throughput(Throughput::Elements(n as u64));

        for method in [InterpMethod::Splrep, InterpMethod::Pchip] {
            let mut opts = SiftOptions::default();
            opts.envelope_opts.interp_method = method;
            group.bench_with_input(BenchmarkId::new(format!("{method:?}"), n), &x, |b, x| {
                b.iter(|| sift(black_box(x), &opts))
            });
        }
    }

    group.finish();
}

fn bench_variants(c: &mut Criterion) {
    let mut group = c.benchmark_group("variants");
    let x = two_tone(2_000);

    let ensemble = EnsembleOptions {
        noise_seed: Some(1),
        nprocesses: 0,
        ..EnsembleOptions::default()
    };
    group.bench_function("ensemble_sift", |b| {
        b.iter(|| ensemble_sift(black_box(&x), &ensemble))
    });

    let mask = MaskSiftOptions::default();
    group.bench_function("mask_sift", |b| b.iter(|| mask_sift(black_box(&x), &mask)));

    group.finish();
}

criterion_group!(benches, bench_sift, bench_variants);
criterion_main!(benches);
