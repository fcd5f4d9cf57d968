//! Prometheus metrics for the knowledge engine
//!
//! Exposes operational metrics for monitoring and alerting:
//! - HTTP request rates and latencies
//! - Teach/ask outcomes and answer sources
//! - Index rebuilds and embedding generation
//! - Web research and scheduler activity
//!
//! NOTE: Labels stay low-cardinality by design; topics and query text
//! never appear as label values.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Request Metrics
    // ============================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "smriti_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Engine Metrics
    // ============================================================================

    /// Teach operations by result
    pub static ref TEACH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_teach_total", "Total teach operations"),
        &["result"]
    ).unwrap();

    /// Ask operations by answer source
    pub static ref ASK_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_ask_total", "Total ask operations by answer source"),
        &["source"]  // source: "rule", "memory", "web_research", "unknown", "error"
    ).unwrap();

    /// Ask duration
    pub static ref ASK_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "smriti_ask_duration_seconds",
            "Ask operation duration"
        )
        .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])
    ).unwrap();

    // ============================================================================
    // Index Metrics
    // ============================================================================

    /// Index rebuilds by mode and result
    pub static ref INDEX_REBUILD_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_index_rebuild_total", "Total index rebuilds"),
        &["mode", "result"]  // mode: "full" or "incremental"
    ).unwrap();

    /// Index rebuild duration
    pub static ref INDEX_REBUILD_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "smriti_index_rebuild_duration_seconds",
            "Index rebuild duration"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0]),
        &["mode"]
    ).unwrap();

    /// Number of vectors currently indexed
    pub static ref INDEX_SIZE: IntGauge = IntGauge::new(
        "smriti_index_size",
        "Number of memories in the embedding index"
    ).unwrap();

    // ============================================================================
    // Embedding Metrics
    // ============================================================================

    /// Embedding generation operations
    pub static ref EMBEDDING_GENERATE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_embedding_generate_total", "Total embedding generations"),
        &["mode", "result"]  // mode: "onnx" or "hash"
    ).unwrap();

    /// Embedding generation duration
    pub static ref EMBEDDING_GENERATE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "smriti_embedding_generate_duration_seconds",
            "Embedding generation duration"
        )
        .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["mode"]
    ).unwrap();

    // ============================================================================
    // Research and Scheduler Metrics
    // ============================================================================

    /// Outbound search requests by provider and result
    pub static ref SEARCH_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_search_requests_total", "Total outbound search requests"),
        &["provider", "result"]
    ).unwrap();

    /// Research sessions by kind and status
    pub static ref RESEARCH_SESSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_research_sessions_total", "Total research sessions"),
        &["kind", "status"]  // kind: "scheduled", "discovered", "manual"
    ).unwrap();

    /// Topics on the research schedule
    pub static ref SCHEDULED_TOPICS: IntGauge = IntGauge::new(
        "smriti_scheduled_topics",
        "Number of topics on the research schedule"
    ).unwrap();

    /// Discovered-topic candidates awaiting promotion
    pub static ref DISCOVERED_TOPICS: IntGauge = IntGauge::new(
        "smriti_discovered_topics",
        "Number of discovered-topic candidates being tracked"
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    METRICS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(TEACH_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(ASK_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(ASK_DURATION.clone()))?;

    METRICS_REGISTRY.register(Box::new(INDEX_REBUILD_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(INDEX_REBUILD_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(INDEX_SIZE.clone()))?;

    METRICS_REGISTRY.register(Box::new(EMBEDDING_GENERATE_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(EMBEDDING_GENERATE_DURATION.clone()))?;

    METRICS_REGISTRY.register(Box::new(SEARCH_REQUESTS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(RESEARCH_SESSIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(SCHEDULED_TOPICS.clone()))?;
    METRICS_REGISTRY.register(Box::new(DISCOVERED_TOPICS.clone()))?;

    Ok(())
}

/// Helper to time operations with histogram (RAII pattern)
/// Usage: let _timer = Timer::new(SOME_HISTOGRAM.clone());
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl Timer {
    /// Create timer that records duration to histogram on drop
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
