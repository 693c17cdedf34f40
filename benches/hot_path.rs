//! Hot path benchmarks: wire parsing, window updates, queue handoff.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use metric_collector::aggregation::{fnv1a, BucketRing, MetricKind};
use metric_collector::ingestion::{parse_packet, process_packet, spsc, IngestStats};
use std::sync::Arc;
use std::thread;

const PACKET: &[u8] = b"api.requests:1|c\napi.latency:42|t\nheap.bytes:1048576|g\napi.errors:1|c";

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(PACKET.len() as u64));

    group.bench_function("packet_4_lines", |b| {
        b.iter(|| {
            let mut lines = 0u32;
            let rejected = parse_packet(black_box(PACKET), |_, _, _| lines += 1);
            black_box((lines, rejected));
        });
    });

    group.bench_function("fnv1a_name", |b| {
        b.iter(|| black_box(fnv1a(black_box(b"service.api.requests.total"))));
    });

    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    let ring = BucketRing::new(10, 16).unwrap();
    let stats = IngestStats::new();

    group.bench_function("counter_existing_key", |b| {
        b.iter(|| ring.store(MetricKind::Counter, black_box(b"api.requests"), 1));
    });

    group.bench_function("timer_existing_key", |b| {
        let mut value = 0u64;
        b.iter(|| {
            value = value.wrapping_add(7) % 1000;
            ring.store(MetricKind::Timer, black_box(b"api.latency"), value)
        });
    });

    group.bench_function("process_packet", |b| {
        b.iter(|| process_packet(&ring, &stats, black_box(PACKET)));
    });

    group.bench_function("get_metric", |b| {
        b.iter(|| black_box(ring.get_metric(MetricKind::Counter, black_box(b"api.requests"))));
    });

    group.finish();
}

fn bench_contended_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");
    group.sample_size(20);

    for threads in [2usize, 4] {
        group.bench_function(format!("counter_{}_threads", threads), |b| {
            let ring = Arc::new(BucketRing::new(10, 16).unwrap());
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let ring = Arc::clone(&ring);
                        thread::spawn(move || {
                            for _ in 0..1000 {
                                ring.increment(b"shared", 1);
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    let _ = handle.join();
                }
            });
        });
    }

    group.finish();
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc");

    group.bench_function("push_pop", |b| {
        let (mut producer, mut consumer) = spsc::channel::<Bytes>(1024);
        let packet = Bytes::from_static(PACKET);
        b.iter(|| {
            producer.push(packet.clone());
            black_box(consumer.pop());
        });
    });

    group.bench_function("push_overflow", |b| {
        let (mut producer, _consumer) = spsc::channel::<Bytes>(64);
        let packet = Bytes::from_static(PACKET);
        b.iter(|| black_box(producer.push(packet.clone())));
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_aggregate, bench_contended_counter, bench_queue);
criterion_main!(benches);
