//! Concurrency smoke tests for the embedding index
//!
//! Readers must always observe a complete snapshot while rebuilds and
//! incremental refreshes churn underneath them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

use smriti::embeddings::{Embedder, HashEmbedder};
use smriti::index::EmbeddingIndex;
use smriti::store::{MemoryStore, RocksMemoryStore};

#[test]
fn queries_stay_consistent_during_concurrent_rebuilds() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(RocksMemoryStore::open(dir.path()).expect("Failed to open store"));
    let embedder = Arc::new(HashEmbedder::new());
    let index = Arc::new(EmbeddingIndex::new(store.clone(), embedder.clone(), 10_000));

    for i in 0..20 {
        store
            .add_memory(&format!("seed question {i}"), "seed answer", None, "general")
            .expect("seed");
    }
    index.rebuild_full().expect("initial rebuild");

    let probe = embedder.encode("seed question 7").expect("encode");
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = index.clone();
            let stop = stop.clone();
            let probe = probe.clone();
            thread::spawn(move || {
                let mut observed = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let hits = index.query(&probe, 5);
                    assert!(hits.len() <= 5);
                    for (memory, score) in &hits {
                        assert!(score.is_finite());
                        assert!(*score <= 1.0 + 1e-4);
                        assert!(*score >= -1.0 - 1e-4);
                        assert!(!memory.input_text.is_empty());
                    }
                    observed += hits.len();
                }
                observed
            })
        })
        .collect();

    // Churn the snapshot from the writer side while readers hammer query()
    for i in 0..50 {
        store
            .add_memory(&format!("churn question {i}"), "churn answer", None, "general")
            .expect("churn");
        if i % 2 == 0 {
            index.refresh_incremental().expect("incremental refresh");
        } else {
            index.rebuild_full().expect("full rebuild");
        }
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        let observed = reader.join().expect("query thread panicked");
        assert!(observed > 0);
    }

    assert_eq!(index.len(), 70);
}
