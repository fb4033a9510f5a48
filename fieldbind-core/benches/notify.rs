//! Criterion micro-benchmarks for field writes and observer fan-out.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fieldbind_core::prelude::*;

/// Build a source field observed by `fan_out` downstream fields.
fn fan_out(fan_out: usize) -> (Field<u64>, Vec<Field<u64>>) {
    let source = Field::<u64>::new().with_value(0);
    let sinks: Vec<Field<u64>> = (0..fan_out).map(|_| Field::<u64>::new()).collect();
    for sink in &sinks {
        observe(&source, sink);
    }
    (source, sinks)
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify_fan_out");
    for size in [1usize, 16, 256] {
        let (source, sinks) = fan_out(size);
        let mut next = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                next += 1;
                source.set(black_box(next));
            })
        });
        drop(sinks);
    }
    group.finish();
}

fn bench_same_value_write(c: &mut Criterion) {
    let (source, _sinks) = fan_out(16);
    c.bench_function("same_value_write", |b| {
        b.iter(|| source.set(black_box(0)))
    });
}

fn bench_transformation_chain(c: &mut Criterion) {
    let source = Field::<u64>::new().with_value(0);
    let sink = Field::<String>::new();
    source
        .map(|v| v.map(|v| v * 2))
        .map(|v: Option<&u64>| v.map(|v| v.to_string()))
        .add_observer(&sink);

    let mut next = 0u64;
    c.bench_function("transformation_chain", |b| {
        b.iter(|| {
            next += 1;
            source.set(black_box(next));
        })
    });
}

criterion_group!(
    benches,
    bench_fan_out,
    bench_same_value_write,
    bench_transformation_chain
);
criterion_main!(benches);
