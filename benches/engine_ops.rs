//! Benchmarks for engine operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hotpath_rs::HeavyHitters;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const END_MARKER_BIT: u64 = 1 << 63;

/// Synthetic backtrace stream: a skewed call-site distribution with
/// geometric depths, the shape allocation profiles actually have.
fn generate_backtraces(n: usize, call_sites: u64, seed: u64) -> Vec<Vec<u64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let depth = 2 + rng.gen_range(0..12);
            let mut bt: Vec<u64> = (0..depth)
                // Quadratic skew: low call-site codes dominate.
                .map(|_| {
                    let r: f64 = rng.gen();
                    (r * r * call_sites as f64) as u64
                })
                .collect();
            bt.push(END_MARKER_BIT | i as u64);
            bt
        })
        .collect()
}

fn common_prefix(a: &[u64], b: &[u64]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [1_000, 10_000, 100_000] {
        let traces = generate_backtraces(size, 256, 42);

        group.bench_with_input(BenchmarkId::new("fresh", size), &traces, |b, traces| {
            b.iter(|| {
                let mut hh: HeavyHitters<u64> = HeavyHitters::new(0.01);
                for t in traces {
                    hh.insert(0, t, 1);
                }
                black_box(hh.grand_total())
            });
        });

        group.bench_with_input(BenchmarkId::new("streamed", size), &traces, |b, traces| {
            b.iter(|| {
                let mut hh: HeavyHitters<u64> = HeavyHitters::new(0.01);
                let mut prev: &[u64] = &[];
                for t in traces {
                    let cp = common_prefix(prev, t);
                    hh.insert(cp, &t[cp..], 1);
                    prev = t;
                }
                black_box(hh.grand_total())
            });
        });
    }

    group.finish();
}

fn bench_output(c: &mut Criterion) {
    let mut group = c.benchmark_group("output");

    for size in [10_000, 100_000] {
        let traces = generate_backtraces(size, 256, 7);
        let mut hh: HeavyHitters<u64> = HeavyHitters::new(0.01);
        for t in &traces {
            hh.insert(0, t, 1);
        }

        group.bench_with_input(BenchmarkId::new("frequency_0.03", size), &size, |b, _| {
            b.iter(|| black_box(hh.output(0.03).hitters.len()));
        });
    }

    group.finish();
}

fn bench_error_rates(c: &mut Criterion) {
    let mut group = c.benchmark_group("error_rates");
    let traces = generate_backtraces(50_000, 256, 99);

    for error in [0.1, 0.01, 0.001] {
        group.bench_with_input(
            BenchmarkId::new("insert_50k", format!("{error}")),
            &error,
            |b, &error| {
                b.iter(|| {
                    let mut hh: HeavyHitters<u64> = HeavyHitters::new(error);
                    for t in &traces {
                        hh.insert(0, t, 1);
                    }
                    black_box(hh.memory_stats().live_nodes)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_output, bench_error_rates);
criterion_main!(benches);
