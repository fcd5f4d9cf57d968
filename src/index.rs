//! In-memory embedding index over active memories
//!
//! Holds a snapshot of (memory, vector) pairs behind a RwLock so queries
//! never block on a rebuild in progress. Rebuilds produce a fresh snapshot
//! and swap it in atomically.
//!
//! Snapshot ordering is newest-first (id as the tie-break within one
//! timestamp), which combined with the stable top-k sort makes
//! equal-similarity ties resolve toward more recent knowledge.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::similarity::top_k_indices;
use crate::store::{Memory, MemoryStore};

/// What a refresh actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildKind {
    /// Snapshot rebuilt from scratch; payload is the new index size
    Full(usize),
    /// New memories merged into the existing snapshot; payload is how many
    Incremental(usize),
}

#[derive(Default)]
struct Snapshot {
    memories: Vec<Memory>,
    vectors: Vec<Vec<f32>>,
}

/// Embedding index over the active memory set
pub struct EmbeddingIndex {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    max_memories: usize,
    snapshot: RwLock<Snapshot>,
}

impl EmbeddingIndex {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        max_memories: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            max_memories,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Rebuild the snapshot from scratch. Required after deletions, since
    /// the snapshot has no way to unmerge a removed memory.
    pub fn rebuild_full(&self) -> Result<usize> {
        let start = std::time::Instant::now();

        let result = self.try_rebuild_full();
        let outcome = if result.is_ok() { "success" } else { "failure" };
        crate::metrics::INDEX_REBUILD_TOTAL
            .with_label_values(&["full", outcome])
            .inc();
        crate::metrics::INDEX_REBUILD_DURATION
            .with_label_values(&["full"])
            .observe(start.elapsed().as_secs_f64());

        result
    }

    fn try_rebuild_full(&self) -> Result<usize> {
        let memories = self
            .store
            .get_active_memories(None, self.max_memories)
            .context("Failed to load active memories for rebuild")?;

        let texts: Vec<&str> = memories.iter().map(|m| m.input_text.as_str()).collect();
        let vectors = self
            .embedder
            .encode_batch(&texts)
            .context("Failed to embed memories for rebuild")?;

        let size = memories.len();
        *self.snapshot.write() = Snapshot { memories, vectors };
        crate::metrics::INDEX_SIZE.set(size as i64);

        tracing::debug!("Index rebuilt: {} memories", size);
        Ok(size)
    }

    /// Merge newly taught memories into the snapshot without re-embedding
    /// the existing set. Any failure falls back to a full rebuild so the
    /// index never stays stale.
    pub fn refresh_incremental(&self) -> Result<RebuildKind> {
        let start = std::time::Instant::now();

        match self.try_refresh_incremental() {
            Ok(added) => {
                crate::metrics::INDEX_REBUILD_TOTAL
                    .with_label_values(&["incremental", "success"])
                    .inc();
                crate::metrics::INDEX_REBUILD_DURATION
                    .with_label_values(&["incremental"])
                    .observe(start.elapsed().as_secs_f64());
                Ok(RebuildKind::Incremental(added))
            }
            Err(e) => {
                crate::metrics::INDEX_REBUILD_TOTAL
                    .with_label_values(&["incremental", "failure"])
                    .inc();
                tracing::warn!("Incremental index refresh failed: {e}. Falling back to full rebuild.");
                self.rebuild_full().map(RebuildKind::Full)
            }
        }
    }

    fn try_refresh_incremental(&self) -> Result<usize> {
        let known: HashSet<Uuid> = {
            let snap = self.snapshot.read();
            if snap.memories.is_empty() {
                // Nothing to merge into; a full pass is the same cost
                return Err(anyhow::anyhow!("index is empty"));
            }
            snap.memories.iter().map(|m| m.id).collect()
        };

        let active = self
            .store
            .get_active_memories(None, self.max_memories)
            .context("Failed to load active memories for refresh")?;

        let fresh: Vec<Memory> = active
            .into_iter()
            .filter(|m| !known.contains(&m.id))
            .collect();

        if fresh.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = fresh.iter().map(|m| m.input_text.as_str()).collect();
        let fresh_vectors = self
            .embedder
            .encode_batch(&texts)
            .context("Failed to embed new memories")?;

        let mut snap = self.snapshot.write();
        // Re-check under the write lock; a concurrent rebuild may have
        // already absorbed some of these.
        let mut added = 0;
        for (memory, vector) in fresh.into_iter().zip(fresh_vectors).rev() {
            if snap.memories.iter().any(|m| m.id == memory.id) {
                continue;
            }
            // Newest first, matching the full-rebuild ordering
            snap.memories.insert(0, memory);
            snap.vectors.insert(0, vector);
            added += 1;
        }
        crate::metrics::INDEX_SIZE.set(snap.memories.len() as i64);

        tracing::debug!("Index refreshed: {} new memories merged", added);
        Ok(added)
    }

    /// Score a query vector against the snapshot, best match first
    pub fn query(&self, query_vector: &[f32], k: usize) -> Vec<(Memory, f32)> {
        let snap = self.snapshot.read();
        top_k_indices(query_vector, &snap.vectors, k)
            .into_iter()
            .map(|(i, score)| (snap.memories[i].clone(), score))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.read().memories.is_empty()
    }
}
