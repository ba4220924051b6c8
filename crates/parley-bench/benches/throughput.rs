//! Throughput benchmarks for Parley.
//!
//! These benchmarks measure how fast the hub fans events out and how fast
//! the history ring absorbs them.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parley_core::{Event, History, Hub, HubConfig};
use std::sync::Arc;
use std::time::Instant;

/// Benchmark hub fan-out to N subscribers.
fn bench_fanout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("fanout");

    for subscribers in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &n| {
                b.to_async(&rt).iter_custom(|iters| async move {
                    let hub = Hub::spawn_with_config(HubConfig {
                        inbox_capacity: 1024,
                        ..HubConfig::default()
                    });
                    let mut subs = Vec::with_capacity(n);
                    for _ in 0..n {
                        subs.push(hub.subscribe().await.unwrap());
                    }

                    let start = Instant::now();
                    for i in 0..iters {
                        hub.say("bench", i as i64, "hello").await.unwrap();
                        for sub in &mut subs {
                            black_box(sub.inbox.recv().await);
                        }
                    }
                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// Benchmark publishing with nobody listening.
fn bench_publish_only(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("publish");
    group.throughput(Throughput::Elements(1));

    group.bench_function("no_subscribers", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let hub = Hub::spawn();
            let start = Instant::now();
            for i in 0..iters {
                hub.say("bench", i as i64, "hello").await.unwrap();
            }
            // Barrier so every publish has been applied
            hub.stats().await.unwrap();
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmark the history ring.
fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("history");

    for capacity in [5usize, 100] {
        group.bench_with_input(
            BenchmarkId::new("push", capacity),
            &capacity,
            |b, &capacity| {
                let mut history = History::with_capacity(capacity);
                let event = Arc::new(Event::message("bench", 1, "hello"));
                b.iter(|| history.push(black_box(Arc::clone(&event))));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("snapshot", capacity),
            &capacity,
            |b, &capacity| {
                let mut history = History::with_capacity(capacity);
                for i in 0..capacity {
                    history.push(Arc::new(Event::message("bench", i as i64, "hello")));
                }
                b.iter(|| black_box(history.snapshot()));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_fanout, bench_publish_only, bench_history);
criterion_main!(benches);
