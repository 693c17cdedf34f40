//! Full ingestion pipeline over an in-memory datagram source.

use metric_collector::aggregation::{MetricKind, MetricSnapshot, TimerSnapshot};
use metric_collector::core::ConfigBuilder;
use metric_collector::ingestion::{memory_source, MemorySender, MemorySource};
use metric_collector::Collector;
use pretty_assertions::assert_eq;
use std::thread;
use std::time::{Duration, Instant};

fn collector(workers: usize, queue_capacity: usize) -> (MemorySender, Collector<MemorySource>) {
    let config = ConfigBuilder::new()
        .workers(workers)
        .queue_capacity(queue_capacity)
        .ring_size(3)
        .shards_per_bucket(8)
        .wait_timeout(Duration::from_millis(5))
        .build()
        .unwrap();

    let (sender, source) = memory_source();
    let mut collector = Collector::with_source(config, source).unwrap();
    collector.start().unwrap();
    (sender, collector)
}

fn wait_for_received(collector: &Collector<MemorySource>, expected: u64) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while collector.stats().snapshot().datagrams_received < expected && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_all_kinds_aggregate() {
    let (sender, mut collector) = collector(2, 1024);

    sender.send(&b"requests:1|c\nmemory:512|g\nlatency:30|t"[..]);
    sender.send(&b"requests:4|c\nmemory:256|g\nlatency:10|t"[..]);
    sender.send(&b"latency:20|t"[..]);
    wait_for_received(&collector, 3);
    collector.shutdown();

    let ring = collector.ring();
    assert_eq!(ring.get_metric(MetricKind::Counter, b"requests").unwrap().counter(), Some(5));

    let memory = ring.get_metric(MetricKind::Gauge, b"memory").unwrap().gauge().unwrap();
    assert!(memory == 512 || memory == 256, "gauge holds one of the written values");

    assert_eq!(
        ring.get_metric(MetricKind::Timer, b"latency").unwrap().snapshot(),
        MetricSnapshot::Timer(TimerSnapshot {
            count: 3,
            sum: 60,
            min: 10,
            max: 30,
        })
    );
}

#[test]
fn test_bad_lines_do_not_spoil_packet() {
    let (sender, mut collector) = collector(1, 64);

    sender.send(&b"ok:1|c\ngarbage\nbad:x|c\nneg:-3|c\nunknown:1|h\nok:2|c"[..]);
    wait_for_received(&collector, 1);
    collector.shutdown();

    assert_eq!(
        collector.ring().get_metric(MetricKind::Counter, b"ok").unwrap().counter(),
        Some(3)
    );
    let stats = collector.stats().snapshot();
    assert_eq!(stats.lines_applied, 2);
    assert_eq!(stats.lines_rejected, 4);
}

#[test]
fn test_type_conflict_keeps_first_kind() {
    let (sender, mut collector) = collector(1, 64);

    sender.send(&b"mixed:7|g"[..]);
    wait_for_received(&collector, 1);
    // a single worker applies packets in arrival order
    sender.send(&b"mixed:1|c"[..]);
    wait_for_received(&collector, 2);
    collector.shutdown();

    let ring = collector.ring();
    assert_eq!(ring.get_metric(MetricKind::Gauge, b"mixed").unwrap().gauge(), Some(7));
    assert!(ring.get_metric(MetricKind::Counter, b"mixed").is_none());
    assert_eq!(collector.stats().snapshot().type_conflicts, 1);
}

#[test]
fn test_many_workers_lose_no_counts() {
    let (sender, mut collector) = collector(4, 4096);
    let senders: Vec<_> = (0..4)
        .map(|_| {
            let sender = sender.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    sender.send(&b"hits:1|c\nbytes:10|c"[..]);
                }
            })
        })
        .collect();
    for handle in senders {
        handle.join().unwrap();
    }

    wait_for_received(&collector, 4000);
    collector.shutdown();

    let stats = collector.stats().snapshot();
    assert_eq!(stats.packets_evicted, 0);
    assert_eq!(stats.packets_processed, 4000);

    let ring = collector.ring();
    assert_eq!(ring.get_metric(MetricKind::Counter, b"hits").unwrap().counter(), Some(4000));
    assert_eq!(ring.get_metric(MetricKind::Counter, b"bytes").unwrap().counter(), Some(40_000));
}

#[test]
fn test_reads_fall_back_to_older_windows() {
    let (sender, mut collector) = collector(1, 64);

    sender.send(&b"old:1|c"[..]);
    wait_for_received(&collector, 1);
    collector.shutdown();

    let ring = collector.ring();
    ring.rotate();
    assert_eq!(ring.get_metric(MetricKind::Counter, b"old").unwrap().counter(), Some(1));

    ring.rotate();
    ring.rotate();
    assert!(ring.get_metric(MetricKind::Counter, b"old").is_none());
}
