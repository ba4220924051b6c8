//! Latency benchmarks for Parley.
//!
//! These benchmarks focus on the time from publish to delivery, and on the
//! cost of a client joining the room.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parley_core::{Event, Hub};
use parley_protocol::codec;
use std::time::Instant;

/// Benchmark publish-to-deliver latency, including frame encoding.
fn bench_publish_latency(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("publish_latency");

    group.bench_function("single_subscriber", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let hub = Hub::spawn();
            let mut sub = hub.subscribe().await.unwrap();

            let start = Instant::now();
            for i in 0..iters {
                hub.say("alice", i as i64, "hello").await.unwrap();
                if let Some(event) = sub.inbox.recv().await {
                    black_box(codec::encode(&event.to_frame()).unwrap());
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmark subscribe with a full history window, then cancel.
fn bench_subscribe(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("subscribe");

    group.bench_function("with_history", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let hub = Hub::spawn();
            for i in 0..5 {
                hub.say("alice", i, "hello").await.unwrap();
            }

            let start = Instant::now();
            for _ in 0..iters {
                let sub = hub.subscribe().await.unwrap();
                black_box(sub.history.len());
                sub.cancel(&hub).await;
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmark event construction.
fn bench_event_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_creation");

    group.bench_function("message", |b| {
        b.iter(|| Event::message(black_box("alice"), black_box(1), black_box("hello")))
    });

    group.bench_function("join", |b| b.iter(|| Event::join(black_box("alice"))));

    group.finish();
}

criterion_group!(
    benches,
    bench_publish_latency,
    bench_subscribe,
    bench_event_creation
);
criterion_main!(benches);
