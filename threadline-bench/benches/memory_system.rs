//! Threadline Benchmark Suite
//!
//! Targets on a desktop CPU:
//!   log_append_single ................ < 5μs (in-memory)
//!   thread_route_into_50 ............. < 50μs (384-d, no persistence)
//!   build_context_500_entries ........ < 200μs (static embeddings)
//!   record_turn_random_384 ........... < 100μs (random unit vectors)

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio_util::sync::CancellationToken;

use threadline_core::config::{EmbeddingConfig, MemoryConfig, ThreadingConfig};
use threadline_core::context::{ContextAssembler, ContextSettings};
use threadline_core::embedding::{EmbeddingWorker, RandomEmbeddingProvider, StaticEmbeddingProvider};
use threadline_core::log::MemoryLog;
use threadline_core::threads::ThreadIndex;
use threadline_core::types::{Embedding, EntryId, Role};

const DIMS: usize = 384;

/// Deterministic unit-ish vector spread around `cluster`.
fn make_vector(cluster: usize, i: usize) -> Vec<f32> {
    (0..DIMS)
        .map(|d| {
            let base = if d % 50 == cluster % 50 { 1.0 } else { 0.0 };
            base + ((i * 31 + d * 7) % 97) as f32 / 970.0
        })
        .collect()
}

/// Benchmark: append into a full 500-entry window.
fn bench_log_append(c: &mut Criterion) {
    let log = MemoryLog::in_memory(&MemoryConfig {
        enabled: true,
        max_entries: 500,
    });
    for i in 0..500 {
        log.append(Role::User, &format!("warm-up message {i}"), None);
    }
    c.bench_function("log_append_single", |b| {
        b.iter(|| {
            black_box(log.append(Role::User, black_box("The dragon was seen near the mill"), Some("Ayla")));
        });
    });
}

/// Benchmark: routing one entry into an index of 50 threads.
fn bench_thread_route(c: &mut Criterion) {
    let index = ThreadIndex::in_memory(&ThreadingConfig::default());
    for cluster in 0..50 {
        index.route_entry(EntryId(cluster as u64), &Embedding(make_vector(cluster, 0)), None, "seed");
    }
    let incoming = Embedding(make_vector(17, 3));
    let mut next = 1_000u64;
    c.bench_function("thread_route_into_50", |b| {
        b.iter(|| {
            next += 1;
            black_box(index.route_entry(EntryId(next), black_box(&incoming), None, "incoming"));
        });
    });

    c.bench_function("thread_best_match_50", |b| {
        b.iter(|| black_box(index.best_match(black_box(&incoming))));
    });
}

/// Benchmark: full context assembly over a 500-entry log.
fn bench_build_context(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let mut provider = StaticEmbeddingProvider::new().with("query", make_vector(3, 999));
    for i in 0..500 {
        provider = provider.with(format!("turn {i}"), make_vector(i % 10, i));
    }

    let assembler = rt.block_on(async {
        let log = MemoryLog::in_memory(&MemoryConfig {
            enabled: true,
            max_entries: 500,
        });
        let counters = log.counters();
        let index = ThreadIndex::in_memory(&ThreadingConfig::default()).with_counters(Arc::clone(&counters));
        let worker = EmbeddingWorker::spawn(Arc::new(provider), &EmbeddingConfig::default(), counters);
        let assembler = ContextAssembler::from_parts(log, index, worker, ContextSettings::default());
        let cancel = CancellationToken::new();
        for i in 0..500 {
            assembler
                .record_turn(Role::User, &format!("turn {i}"), None, &cancel)
                .await;
        }
        assembler
    });

    let cancel = CancellationToken::new();
    c.bench_function("build_context_500_entries", |b| {
        b.iter(|| black_box(rt.block_on(assembler.build_context(black_box("query"), &cancel))));
    });
}

/// Benchmark: recording turns whose embeddings share no structure.
///
/// Random 384-d vectors are nearly orthogonal, so most turns found a new
/// thread and routing scans a steadily growing index.
fn bench_record_turn_random(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let assembler = rt.block_on(async {
        let log = MemoryLog::in_memory(&MemoryConfig {
            enabled: true,
            max_entries: 500,
        });
        let counters = log.counters();
        let index = ThreadIndex::in_memory(&ThreadingConfig::default()).with_counters(Arc::clone(&counters));
        let provider = Arc::new(RandomEmbeddingProvider::new(DIMS));
        let worker = EmbeddingWorker::spawn(provider, &EmbeddingConfig::default(), counters);
        ContextAssembler::from_parts(log, index, worker, ContextSettings::default())
    });

    let cancel = CancellationToken::new();
    c.bench_function("record_turn_random_384", |b| {
        b.iter(|| {
            black_box(rt.block_on(assembler.record_turn(
                Role::User,
                black_box("The miller swears the dragon came back"),
                None,
                &cancel,
            )))
        });
    });
}

criterion_group!(
    benches,
    bench_log_append,
    bench_thread_route,
    bench_build_context,
    bench_record_turn_random
);
criterion_main!(benches);
