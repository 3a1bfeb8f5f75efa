//! Benchmarks for the hot paths: matching, queueing, dispatch
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use twinlink::link::{LinkMessage, MessageQueue};
use twinlink::routing::{topic_matches, TopicRouter};

fn bench_topic_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_matching");
    let cases = [
        ("exact", "station/sensors/042/data", "station/sensors/042/data"),
        ("single_wildcard", "station/sensors/042/data", "station/sensors/+/data"),
        ("multi_wildcard", "station/sensors/042/data", "station/#"),
        ("mismatch", "station/pumps/042/data", "station/sensors/+/data"),
    ];
    for (name, topic, pattern) in cases {
        group.bench_function(name, |b| {
            b.iter(|| topic_matches(black_box(topic), black_box(pattern)))
        });
    }
    group.finish();
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_queue");
    for size in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::new("push_drain", size),
            &size,
            |b, &size| {
                b.iter(|| {
                    let queue = MessageQueue::new(1_000);
                    for n in 0..size {
                        queue.push(LinkMessage::new(
                            "station/sensors/042/data",
                            n.to_le_bytes().to_vec(),
                        ));
                    }
                    black_box(queue.drain(usize::MAX).len())
                });
            },
        );
    }
    group.finish();
}

fn bench_router_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("router_dispatch");
    for patterns in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("patterns", patterns),
            &patterns,
            |b, &patterns| {
                let mut router = TopicRouter::new();
                for n in 0..patterns {
                    router.subscribe(
                        format!("station/area-{n}/+/data"),
                        Box::new(|topic, payload| {
                            black_box((topic.len(), payload.len()));
                        }),
                    );
                }
                let payload = br#"{"value": 7.2, "quality": 98.0}"#;
                b.iter(|| router.dispatch(black_box("station/area-0/ph-01/data"), payload));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_topic_matching, bench_queue, bench_router_dispatch);
criterion_main!(benches);
