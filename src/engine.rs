//! The knowledge engine: teach, ask, and index lifecycle
//!
//! Answering precedence is deterministic-first: rules are checked before
//! any embedding work, then the nearest-neighbor index, then the unknown
//! fallback. `ask` is infallible; internal failures surface as an error
//! answer with confidence 0.0 rather than an HTTP error.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::{ERROR_RESPONSE, UNKNOWN_RESPONSE};
use crate::embeddings::Embedder;
use crate::errors::AppError;
use crate::index::{EmbeddingIndex, RebuildKind};
use crate::metrics;
use crate::store::{Memory, MemoryStore, Rule, StoreStats};

/// Answer to a query, tagged by where it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum AskResult {
    Rule {
        response: String,
        rule_id: Uuid,
        confidence: f32,
    },
    Memory {
        response: String,
        memory_id: Uuid,
        confidence: f32,
        /// 1-based position among the top-k candidates (diagnostic only;
        /// selection is always the best candidate above threshold)
        match_rank: usize,
    },
    WebResearch {
        response: String,
        confidence: f32,
        sources: Vec<String>,
    },
    Unknown {
        response: String,
        confidence: f32,
    },
    Error {
        response: String,
        confidence: f32,
    },
}

impl AskResult {
    pub fn unknown() -> Self {
        Self::Unknown {
            response: UNKNOWN_RESPONSE.to_string(),
            confidence: 0.0,
        }
    }

    pub fn error() -> Self {
        Self::Error {
            response: ERROR_RESPONSE.to_string(),
            confidence: 0.0,
        }
    }

    /// Answer source label, matching the serialized `source` tag
    pub fn source(&self) -> &'static str {
        match self {
            Self::Rule { .. } => "rule",
            Self::Memory { .. } => "memory",
            Self::WebResearch { .. } => "web_research",
            Self::Unknown { .. } => "unknown",
            Self::Error { .. } => "error",
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Self::Rule { confidence, .. }
            | Self::Memory { confidence, .. }
            | Self::WebResearch { confidence, .. }
            | Self::Unknown { confidence, .. }
            | Self::Error { confidence, .. } => *confidence,
        }
    }

    pub fn response(&self) -> &str {
        match self {
            Self::Rule { response, .. }
            | Self::Memory { response, .. }
            | Self::WebResearch { response, .. }
            | Self::Unknown { response, .. }
            | Self::Error { response, .. } => response,
        }
    }
}

/// Result of a teach operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeachOutcome {
    pub memory_id: Uuid,
    /// Teach operations still waiting to be merged into the index
    pub pending_updates: usize,
    /// Whether this teach triggered an index refresh
    pub index_refreshed: bool,
}

/// Engine state for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineHealth {
    #[serde(flatten)]
    pub stats: StoreStats,
    pub index_size: usize,
    pub pending_updates: usize,
}

struct DebounceState {
    pending: usize,
    last_full_rebuild: Instant,
}

/// Teachable Q/A engine with debounced index maintenance
pub struct KnowledgeEngine {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    index: EmbeddingIndex,
    // Counter and timestamp move together; one lock covers both
    debounce: Mutex<DebounceState>,
    config: EngineConfig,
}

impl KnowledgeEngine {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
    ) -> Self {
        let index = EmbeddingIndex::new(store.clone(), embedder.clone(), config.max_active_memories);

        // Warm the index so the first query does not pay rebuild cost.
        // An empty or failing store is not fatal; queries flush later.
        match index.rebuild_full() {
            Ok(n) => tracing::info!("Knowledge index warmed with {} memories", n),
            Err(e) => tracing::warn!("Initial index build failed: {e}"),
        }

        Self {
            store,
            embedder,
            index,
            debounce: Mutex::new(DebounceState {
                pending: 0,
                last_full_rebuild: Instant::now(),
            }),
            config,
        }
    }

    /// Store a new Q/A pair and refresh the index when due
    pub fn teach(
        &self,
        input_text: &str,
        output_text: &str,
        context: Option<&str>,
        category: &str,
    ) -> Result<TeachOutcome, AppError> {
        let memory = match self
            .store
            .add_memory(input_text, output_text, context, category)
        {
            Ok(m) => m,
            Err(e) => {
                metrics::TEACH_TOTAL.with_label_values(&["failure"]).inc();
                return Err(AppError::StorageError(e.to_string()));
            }
        };

        let mut state = self.debounce.lock();
        state.pending += 1;

        let staleness = Duration::from_secs(self.config.rebuild_staleness_secs);
        let due = state.pending >= self.config.update_threshold
            || state.last_full_rebuild.elapsed() >= staleness;

        let index_refreshed = if due { self.refresh_locked(&mut state) } else { false };
        let pending_updates = state.pending;
        drop(state);

        metrics::TEACH_TOTAL.with_label_values(&["success"]).inc();
        tracing::debug!(
            memory_id = %memory.id,
            pending = pending_updates,
            refreshed = index_refreshed,
            "Taught new memory"
        );

        Ok(TeachOutcome {
            memory_id: memory.id,
            pending_updates,
            index_refreshed,
        })
    }

    /// Answer a query. Never fails: internal errors become an error answer.
    pub fn ask(&self, query: &str, threshold: Option<f32>) -> AskResult {
        let _timer = metrics::Timer::new(metrics::ASK_DURATION.clone());

        let result = match self.try_ask(query, threshold) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("Ask failed: {e}");
                AskResult::error()
            }
        };

        metrics::ASK_TOTAL.with_label_values(&[result.source()]).inc();
        result
    }

    fn try_ask(&self, query: &str, threshold: Option<f32>) -> Result<AskResult, AppError> {
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);

        // Answers must reflect anything taught since the last refresh
        self.flush_pending();

        // Rules win over memories regardless of similarity
        let rules = self
            .store
            .get_active_rules()
            .map_err(|e| AppError::StorageError(e.to_string()))?;

        let query_lower = query.to_lowercase();
        for rule in &rules {
            if query_lower.contains(&rule.pattern.to_lowercase()) {
                return Ok(AskResult::Rule {
                    response: rule.action.clone(),
                    rule_id: rule.id,
                    confidence: 1.0,
                });
            }
        }

        if self.index.is_empty() {
            return Ok(AskResult::unknown());
        }

        let query_vector = self
            .embedder
            .encode(query)
            .map_err(|e| AppError::EmbeddingError(e.to_string()))?;

        let hits = self.index.query(&query_vector, self.config.top_k);
        for (rank, (memory, similarity)) in hits.iter().enumerate() {
            // Hits come back best-first, so the first above threshold is
            // the best above threshold
            if *similarity >= threshold {
                return Ok(AskResult::Memory {
                    response: memory.output_text.clone(),
                    memory_id: memory.id,
                    confidence: *similarity,
                    match_rank: rank + 1,
                });
            }
        }

        Ok(AskResult::unknown())
    }

    /// Merge any pending teaches into the index before answering
    fn flush_pending(&self) {
        let mut state = self.debounce.lock();
        if state.pending > 0 {
            self.refresh_locked(&mut state);
        }
    }

    /// Run a refresh while holding the debounce lock. Returns true when a
    /// refresh happened; on failure the pending count is kept for retry.
    fn refresh_locked(&self, state: &mut DebounceState) -> bool {
        match self.index.refresh_incremental() {
            Ok(kind) => {
                state.pending = 0;
                if let RebuildKind::Full(_) = kind {
                    state.last_full_rebuild = Instant::now();
                }
                true
            }
            Err(e) => {
                tracing::error!("Index refresh failed: {e}");
                false
            }
        }
    }

    /// Force a full index rebuild, bypassing the debounce
    pub fn force_update(&self) -> Result<usize, AppError> {
        let mut state = self.debounce.lock();
        let size = self
            .index
            .rebuild_full()
            .map_err(AppError::Internal)?;
        state.pending = 0;
        state.last_full_rebuild = Instant::now();
        Ok(size)
    }

    /// Soft-delete a memory and rebuild the index
    ///
    /// Deletion always forces a full rebuild: the incremental path can only
    /// add, never remove.
    pub fn delete_memory(&self, id: Uuid) -> Result<(), AppError> {
        let deleted = self
            .store
            .delete_memory(id)
            .map_err(|e| AppError::StorageError(e.to_string()))?;

        if !deleted {
            return Err(AppError::MemoryNotFound(id.to_string()));
        }

        let mut state = self.debounce.lock();
        if let Err(e) = self.index.rebuild_full() {
            // The memory is gone from storage either way; the stale vector
            // disappears on the next successful rebuild
            tracing::error!("Post-delete rebuild failed: {e}");
        } else {
            state.pending = 0;
            state.last_full_rebuild = Instant::now();
        }

        Ok(())
    }

    pub fn add_rule(&self, pattern: &str, action: &str, priority: i32) -> Result<Rule, AppError> {
        self.store
            .add_rule(pattern, action, priority)
            .map_err(|e| AppError::StorageError(e.to_string()))
    }

    pub fn get_memories(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>, AppError> {
        self.store
            .get_active_memories(category, limit)
            .map_err(|e| AppError::StorageError(e.to_string()))
    }

    pub fn health(&self) -> Result<EngineHealth, AppError> {
        let stats = self
            .store
            .stats()
            .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(EngineHealth {
            stats,
            index_size: self.index.len(),
            pending_updates: self.pending_updates(),
        })
    }

    pub fn pending_updates(&self) -> usize {
        self.debounce.lock().pending
    }

    pub fn index_size(&self) -> usize {
        self.index.len()
    }
}
