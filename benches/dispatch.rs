//! Framing, dispatch and fan-out benchmark suite.
//!
//! Measures the hot paths that do not touch the network:
//! - Outgoing framing per mode and event count
//! - Inbound classification per mode
//! - Registry broadcast over in-memory transports: 10, 100, 1000 connections
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;

use wsrelay::{Connection, MemoryConnector, MemorySession, Mode, Outgoing, Registry};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const EVENT_COUNTS: &[usize] = &[1, 4, 16];
const CONNECTION_COUNTS: &[usize] = &[10, 100, 1000];

// ============================================================================
// Benchmark: Framing
// ============================================================================

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames");
    let data = json!({ "user": "alice", "scores": [1, 2, 3], "active": true });

    for &count in EVENT_COUNTS {
        let events: Vec<String> = (0..count).map(|i| format!("event-{i}")).collect();

        group.bench_with_input(BenchmarkId::new("event_only", count), &events, |b, events| {
            b.iter(|| {
                let message = Outgoing::event(events.clone(), data.clone());
                black_box(Mode::EventOnly.frames(message))
            });
        });
    }

    group.bench_function("hybrid_text", |b| {
        b.iter(|| black_box(Mode::Hybrid.frames(Outgoing::from("plain text message"))));
    });

    group.finish();
}

// ============================================================================
// Benchmark: Inbound Classification
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let envelope = r#"{"event":"stop","data":{"cmd":"halt","msg":"bye"}}"#.to_string();
    let plain = "just some text".to_string();

    for mode in [Mode::TextOnly, Mode::EventOnly, Mode::Hybrid] {
        group.bench_with_input(
            BenchmarkId::new("envelope", format!("{mode:?}")),
            &envelope,
            |b, frame| b.iter(|| black_box(mode.decode(frame.clone()))),
        );
    }

    group.bench_with_input(BenchmarkId::new("plain", "Hybrid"), &plain, |b, frame| {
        b.iter(|| black_box(Mode::Hybrid.decode(frame.clone())));
    });

    group.finish();
}

// ============================================================================
// Benchmark: Broadcast
// ============================================================================

fn open_registry(count: usize) -> (Registry, Vec<MemorySession>) {
    let registry = Registry::new();
    let mut sessions = Vec::with_capacity(count);

    for i in 0..count {
        let connector = MemoryConnector::new();
        let conn = Connection::builder(format!("mem://{i}"))
            .mode(Mode::EventOnly)
            .connector(connector.clone())
            .build()
            .expect("memory connection");
        if let Some(session) = connector.latest() {
            session.open();
            sessions.push(session);
        }
        registry.register(&conn);
    }

    (registry, sessions)
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");
    group.sample_size(20);

    for &count in CONNECTION_COUNTS {
        let (registry, sessions) = open_registry(count);

        group.bench_with_input(BenchmarkId::new("memory", count), &registry, |b, registry| {
            // Sent frames are drained outside the timed section
            b.iter_batched(
                || sessions.iter().for_each(|s| drop(s.take_sent())),
                |()| black_box(registry.broadcast("tick", Some(json!({ "n": 1 })))),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_frames, bench_decode, bench_broadcast);
criterion_main!(benches);
