//! Track/trigger throughput.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use weft_core::reactive::{stop, EffectOptions, RawObject, Runtime};

fn bench_untracked_read(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = runtime.reactive(&RawObject::from_iter([("a", 1)]));

    c.bench_function("read_outside_effect", |b| b.iter(|| black_box(state.get("a"))));
}

fn bench_write_with_subscribers(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_fan_out");

    for subscribers in [1usize, 16, 256] {
        let runtime = Runtime::new();
        let state = runtime.reactive(&RawObject::from_iter([("a", 0)]));
        let runs = Arc::new(AtomicUsize::new(0));

        let runners: Vec<_> = (0..subscribers)
            .map(|_| {
                let reader = state.clone();
                let runs = runs.clone();
                runtime.effect(
                    move || {
                        reader.get("a");
                        runs.fetch_add(1, Ordering::Relaxed);
                    },
                    EffectOptions::default(),
                )
            })
            .collect();

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_function(format!("{subscribers}_effects"), |b| {
            let mut n = 0i64;
            b.iter(|| {
                n += 1;
                state.set("a", black_box(n));
            })
        });

        for runner in &runners {
            stop(runner);
        }
    }

    group.finish();
}

fn bench_computed_invalidate_and_read(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = runtime.reactive(&RawObject::from_iter([("a", 0)]));
    let reader = state.clone();
    let doubled = runtime.computed(move || reader.get("a").as_int().unwrap_or(0) * 2);

    c.bench_function("computed_invalidate_read", |b| {
        let mut n = 0i64;
        b.iter(|| {
            n += 1;
            state.set("a", n);
            black_box(doubled.value())
        })
    });
}

criterion_group!(
    benches,
    bench_untracked_read,
    bench_write_with_subscribers,
    bench_computed_invalidate_and_read
);
criterion_main!(benches);
