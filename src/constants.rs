//! Documented constants for the knowledge engine
//!
//! All tunable parameters live here with justification for their values.
//! Centralizing constants prevents magic numbers and makes tuning easier.

// =============================================================================
// RETRIEVAL CONSTANTS
// =============================================================================

/// Default cosine similarity threshold for accepting a memory match
///
/// Justification:
/// - 0.7 rejects loose topical overlap while accepting paraphrases
/// - Below ~0.6 the hash embedder starts matching unrelated sentences
/// - Callers can override per request for exploratory queries
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Number of nearest-neighbor candidates scored per query
///
/// Justification:
/// - 5 candidates is enough to expose the match rank without scanning
///   the full index on every answer
/// - The best candidate above threshold wins; the rest are diagnostics
pub const TOP_K_CANDIDATES: usize = 5;

/// Upper bound on active memories loaded into the in-memory index
///
/// Justification:
/// - 10k memories at 384 dims is ~15MB of vectors, fine for one process
/// - A personal knowledge base rarely exceeds a few thousand entries
pub const MAX_ACTIVE_MEMORIES: usize = 10_000;

// =============================================================================
// INDEX REBUILD DEBOUNCING
// =============================================================================

/// Pending teach operations that force an index refresh
///
/// Justification:
/// - Batching 10 writes amortizes embedding cost during bulk teaching
/// - Queries flush pending updates anyway, so answers never go stale
pub const UPDATE_THRESHOLD: usize = 10;

/// Seconds since the last full rebuild before a refresh is forced
///
/// Justification:
/// - 5 minutes bounds staleness when teach traffic is slow and no
///   queries arrive to trigger the flush
pub const REBUILD_STALENESS_SECS: u64 = 300;

// =============================================================================
// AUTO-LEARNING SCHEDULER
// =============================================================================

/// Seconds between scheduler passes
pub const LEARNING_CADENCE_SECS: u64 = 3600;

/// Mentions required before a discovered topic is researched
///
/// Justification:
/// - 2 mentions filters one-off questions while still reacting quickly
///   to anything the user asks about twice
pub const MIN_TOPIC_MENTIONS: u32 = 2;

/// Cap on tracked discovered-topic candidates
pub const MAX_DISCOVERED_TOPICS: usize = 100;

/// Research interval assigned to promoted discovered topics (hours)
///
/// Justification:
/// - Weekly refresh keeps opportunistic topics current without letting
///   them crowd out explicitly scheduled ones
pub const PROMOTED_TOPIC_INTERVAL_HOURS: u32 = 168;

/// Maximum research sessions kept in the learning history
pub const STATS_HISTORY_CAP: usize = 200;

/// Poll interval for the shutdown flag inside the cadence sleep (ms)
///
/// Justification:
/// - 250ms keeps stop() latency well under a second without burning CPU
pub const SHUTDOWN_POLL_MS: u64 = 250;

/// Seconds to wait for the scheduler task to drain on stop
pub const SCHEDULER_STOP_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// WEB RESEARCH
// =============================================================================

/// Search results requested per query variant
pub const SEARCH_MAX_RESULTS: usize = 3;

/// Query variants tried per research session
pub const RESEARCH_QUERY_VARIANTS: usize = 2;

/// Per-request search timeout (seconds)
pub const SEARCH_TIMEOUT_SECS: u64 = 10;

/// Minimum answer length before a quick-search result is persisted
///
/// Justification:
/// - Sub-50-char snippets are usually disambiguation stubs not worth
///   teaching back into the knowledge base
pub const QUICK_ANSWER_PERSIST_MIN_LEN: usize = 50;

/// Confidence reported for answers sourced from live web research
pub const RESEARCH_CONFIDENCE: f32 = 0.7;

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Embedding dimensionality (matches all-MiniLM-L6-v2)
pub const EMBEDDING_DIMENSION: usize = 384;

// =============================================================================
// CATEGORIES AND CANNED RESPONSES
// =============================================================================

/// Category assigned when the caller does not provide one
pub const DEFAULT_CATEGORY: &str = "general";

/// Category for knowledge persisted by the researcher
pub const RESEARCH_CATEGORY: &str = "researched_knowledge";

/// Response body for queries nothing matched
pub const UNKNOWN_RESPONSE: &str = "I'm not sure how to respond to that. Could you teach me?";

/// Response body when answering failed internally
pub const ERROR_RESPONSE: &str = "I encountered an error while processing your request.";
