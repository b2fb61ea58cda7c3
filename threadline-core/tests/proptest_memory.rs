//! Property-Based Tests for Threadline Core
//!
//! Uses `proptest` to check the memory log and thread index invariants
//! under random inputs: window bounds, similarity bounds and routing
//! determinism.

use proptest::prelude::*;

use threadline_core::config::{MemoryConfig, ThreadingConfig, MIN_MAX_ENTRIES};
use threadline_core::embedding::cosine_similarity;
use threadline_core::log::MemoryLog;
use threadline_core::threads::ThreadIndex;
use threadline_core::types::{Embedding, EntryId, Role};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_vector(dims: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-10.0..10.0f32, dims)
}

fn arb_pair() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
    (1usize..32).prop_flat_map(|d| (arb_vector(d), arb_vector(d)))
}

// ---------------------------------------------------------------------------
// Property: the window never exceeds capacity and keeps the newest entries
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn window_is_bounded_and_newest(max in 0usize..40, appends in 0usize..120) {
        let log = MemoryLog::in_memory(&MemoryConfig { enabled: true, max_entries: max });
        let capacity = max.max(MIN_MAX_ENTRIES);
        for i in 0..appends {
            log.append(Role::User, &format!("m{i}"), None);
            prop_assert!(log.len() <= capacity);
        }

        let expected: Vec<String> = (appends.saturating_sub(capacity)..appends)
            .map(|i| format!("m{i}"))
            .collect();
        let actual: Vec<String> = log.snapshot().into_iter().map(|e| e.content).collect();
        prop_assert_eq!(actual, expected);
    }
}

// ---------------------------------------------------------------------------
// Property: ids strictly increase across the window
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn ids_strictly_increase(appends in 1usize..60) {
        let log = MemoryLog::in_memory(&MemoryConfig { enabled: true, max_entries: 10 });
        for i in 0..appends {
            log.append(Role::Assistant, &format!("m{i}"), None);
        }
        let ids: Vec<EntryId> = log.snapshot_with_ids().into_iter().map(|(id, _)| id).collect();
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for (position, id) in ids.iter().enumerate() {
            prop_assert_eq!(log.position_of(*id), Some(position));
        }
    }
}

// ---------------------------------------------------------------------------
// Property: cosine similarity is symmetric and bounded
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn cosine_is_symmetric_and_bounded((a, b) in arb_pair()) {
        let a = Embedding(a);
        let b = Embedding(b);
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        prop_assert!((-1.0..=1.0).contains(&ab));
        prop_assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatch_is_zero(a in arb_vector(3), b in arb_vector(4)) {
        prop_assert_eq!(cosine_similarity(&Embedding(a.clone()), &Embedding(b)), 0.0);
        prop_assert_eq!(cosine_similarity(&Embedding(a), &Embedding::empty()), 0.0);
    }
}

// ---------------------------------------------------------------------------
// Property: routing the same sequence twice gives the same partition
// ---------------------------------------------------------------------------

fn partition(vectors: &[Vec<f32>], threshold: f32) -> Vec<Vec<EntryId>> {
    let index = ThreadIndex::in_memory(&ThreadingConfig {
        similarity_threshold: threshold,
        ..ThreadingConfig::default()
    });
    for (i, v) in vectors.iter().enumerate() {
        index.route_entry(EntryId(i as u64), &Embedding(v.clone()), None, "text");
    }
    index.threads().into_iter().map(|t| t.member_ids).collect()
}

proptest! {
    #[test]
    fn routing_is_deterministic(
        vectors in prop::collection::vec(arb_vector(4), 1..30),
        threshold in 0.0..1.0f32,
    ) {
        let first = partition(&vectors, threshold);
        let second = partition(&vectors, threshold);
        prop_assert_eq!(&first, &second);

        // Every entry lands in exactly one thread.
        let mut all: Vec<EntryId> = first.into_iter().flatten().collect();
        all.sort();
        let expected: Vec<EntryId> = (0..vectors.len() as u64).map(EntryId).collect();
        prop_assert_eq!(all, expected);
    }
}
