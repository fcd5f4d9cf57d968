//! Smriti - Teachable personal knowledge-base server
//!
//! REST API over a local Q/A memory: teach pairs, ask questions answered
//! by rules or embedding similarity, research unknown topics on the web.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tracing::info;
use uuid::Uuid;

use smriti::config::ServerConfig;
use smriti::constants;
use smriti::embeddings::Embedder;
use smriti::engine::{AskResult, EngineHealth, KnowledgeEngine, TeachOutcome};
use smriti::errors::{AppError, ValidationErrorExt};
use smriti::metrics;
use smriti::research::{DuckDuckGoProvider, ResearchOutcome, Researcher};
use smriti::scheduler::{AutoLearner, LearningReport, LearningTopic};
use smriti::store::{Memory, MemoryStore, RocksMemoryStore, Rule};
use smriti::topics::RegexTopicExtractor;
use smriti::{tracing_setup, validation};

// Shutdown timeouts. The scheduler gets its own stop timeout internally;
// these bound the final flush and the overall drain.
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
const DATABASE_FLUSH_TIMEOUT_SECS: u64 = 10;

/// Shared handles threaded through every route
#[derive(Clone)]
struct AppState {
    engine: Arc<KnowledgeEngine>,
    learner: Arc<AutoLearner>,
    researcher: Arc<Researcher>,
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TeachRequest {
    input_text: String,
    output_text: String,
    context: Option<String>,
    #[serde(default = "default_category")]
    category: String,
}

fn default_category() -> String {
    constants::DEFAULT_CATEGORY.to_string()
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    query: String,
    threshold: Option<f32>,
    #[serde(default)]
    enable_research: bool,
}

#[derive(Debug, Deserialize)]
struct RuleRequest {
    pattern: String,
    action: String,
    #[serde(default = "default_priority")]
    priority: i32,
}

fn default_priority() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
struct MemoriesQuery {
    category: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ResearchRequest {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct TopicRequest {
    topic: String,
    #[serde(default = "default_interval_hours")]
    interval_hours: u32,
}

fn default_interval_hours() -> u32 {
    24
}

// ============================================================================
// Handlers
// ============================================================================

/// Store a new question/answer pair
async fn teach(
    State(state): State<AppState>,
    Json(req): Json<TeachRequest>,
) -> Result<Json<TeachOutcome>, AppError> {
    validation::validate_text("input_text", &req.input_text, validation::MAX_INPUT_LENGTH)
        .map_validation_err("input_text")?;
    validation::validate_text(
        "output_text",
        &req.output_text,
        validation::MAX_OUTPUT_LENGTH,
    )
    .map_validation_err("output_text")?;
    validation::validate_optional_text(
        "context",
        req.context.as_deref(),
        validation::MAX_CONTEXT_LENGTH,
    )
    .map_validation_err("context")?;
    validation::validate_text("category", &req.category, validation::MAX_CATEGORY_LENGTH)
        .map_validation_err("category")?;

    // Embedding plus RocksDB writes can block for tens of milliseconds;
    // keep them off the async workers
    let engine = state.engine.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        engine.teach(
            &req.input_text,
            &req.output_text,
            req.context.as_deref(),
            &req.category,
        )
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Blocking task panicked: {e}")))??;

    Ok(Json(outcome))
}

/// Answer a query from rules, memories, or (optionally) web research
async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResult>, AppError> {
    validation::validate_text("query", &req.query, validation::MAX_QUERY_LENGTH)
        .map_validation_err("query")?;
    if let Some(t) = req.threshold {
        validation::validate_threshold(t).map_validation_err("threshold")?;
    }

    // Every question feeds topic discovery, whatever the answer turns out to be
    let discovered = state.learner.observe_conversation(&req.query);
    if !discovered.is_empty() {
        tracing::debug!("Discovered topic candidates: {:?}", discovered);
    }

    let result = if req.enable_research {
        state
            .researcher
            .ask_with_research(&req.query, req.threshold)
            .await
    } else {
        let engine = state.engine.clone();
        tokio::task::spawn_blocking(move || engine.ask(&req.query, req.threshold))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Blocking task panicked: {e}")))?
    };

    Ok(Json(result))
}

/// Register a pattern -> response rule
async fn add_rule(
    State(state): State<AppState>,
    Json(req): Json<RuleRequest>,
) -> Result<Json<Rule>, AppError> {
    validation::validate_text("pattern", &req.pattern, validation::MAX_RULE_PATTERN_LENGTH)
        .map_validation_err("pattern")?;
    validation::validate_text("action", &req.action, validation::MAX_RULE_ACTION_LENGTH)
        .map_validation_err("action")?;
    validation::validate_priority(req.priority).map_validation_err("priority")?;

    let rule = state.engine.add_rule(&req.pattern, &req.action, req.priority)?;
    Ok(Json(rule))
}

/// List active memories, newest first
async fn get_memories(
    State(state): State<AppState>,
    Query(params): Query<MemoriesQuery>,
) -> Result<Json<Vec<Memory>>, AppError> {
    let limit = params.limit.unwrap_or(100);
    validation::validate_limit(limit).map_validation_err("limit")?;
    if let Some(ref category) = params.category {
        validation::validate_text("category", category, validation::MAX_CATEGORY_LENGTH)
            .map_validation_err("category")?;
    }

    let memories = state.engine.get_memories(params.category.as_deref(), limit)?;
    Ok(Json(memories))
}

/// Soft-delete a memory by id
async fn delete_memory(
    State(state): State<AppState>,
    Path(memory_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    // Deletion rebuilds the whole index; off the async workers it goes
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || engine.delete_memory(memory_id))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Blocking task panicked: {e}")))??;

    Ok(StatusCode::OK)
}

/// Force a full index rebuild, bypassing the refresh debounce
async fn force_update(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let engine = state.engine.clone();
    let index_size = tokio::task::spawn_blocking(move || engine.force_update())
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Blocking task panicked: {e}")))??;

    Ok(Json(serde_json::json!({ "index_size": index_size })))
}

/// Research a topic on demand and learn the results
async fn research_topic(
    State(state): State<AppState>,
    Json(req): Json<ResearchRequest>,
) -> Result<Json<ResearchOutcome>, AppError> {
    let outcome = state.learner.research_topic_now(&req.topic).await?;
    Ok(Json(outcome))
}

/// List scheduled learning topics
async fn list_topics(State(state): State<AppState>) -> Json<Vec<LearningTopic>> {
    Json(state.learner.topics())
}

/// Add a topic to the learning schedule
async fn add_topic(
    State(state): State<AppState>,
    Json(req): Json<TopicRequest>,
) -> Result<Json<LearningTopic>, AppError> {
    validation::validate_interval_hours(req.interval_hours).map_validation_err("interval_hours")?;

    let topic = state.learner.add_topic(&req.topic, req.interval_hours)?;
    Ok(Json(topic))
}

/// Remove a topic from the learning schedule
async fn remove_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> Result<StatusCode, AppError> {
    state.learner.remove_topic(&topic)?;
    Ok(StatusCode::OK)
}

/// Learning scheduler report: topics, candidates, recent sessions
async fn learning_stats(State(state): State<AppState>) -> Json<LearningReport> {
    Json(state.learner.learning_report())
}

async fn start_learning(State(state): State<AppState>) -> Json<serde_json::Value> {
    let started = state.learner.start();
    Json(serde_json::json!({
        "running": true,
        "started": started
    }))
}

async fn stop_learning(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.learner.stop().await;
    Json(serde_json::json!({ "running": false }))
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    learning_active: bool,
    #[serde(flatten)]
    engine: EngineHealth,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let engine = state.engine.health()?;

    Ok(Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        learning_active: state.learner.is_running(),
        engine,
    }))
}

/// Prometheus metrics in text exposition format
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    use prometheus::Encoder;

    // Refresh gauges before serving
    metrics::INDEX_SIZE.set(state.engine.index_size() as i64);

    let encoder = prometheus::TextEncoder::new();
    let metric_families = metrics::METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Startup and shutdown
// ============================================================================

fn build_embedder() -> Arc<dyn Embedder> {
    #[cfg(feature = "onnx")]
    {
        use smriti::embeddings::{EmbeddingConfig, MiniLmEmbedder};
        Arc::new(MiniLmEmbedder::new(EmbeddingConfig::from_env()))
    }
    #[cfg(not(feature = "onnx"))]
    {
        use smriti::embeddings::HashEmbedder;
        info!("🔤 Using hash embedder (build with --features onnx for MiniLM)");
        Arc::new(HashEmbedder::new())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_setup::init_logging()?;

    metrics::register_metrics().map_err(|e| anyhow::anyhow!("Failed to register metrics: {e}"))?;
    info!("📊 Metrics registered at /metrics");

    info!("🧠 Starting Smriti server...");

    let config = ServerConfig::from_env();
    config.log();

    info!("📁 Storage path: {:?}", config.storage_path);
    let store = Arc::new(RocksMemoryStore::open(&config.storage_path)?);

    let embedder = build_embedder();
    let engine = Arc::new(KnowledgeEngine::new(
        store.clone() as Arc<dyn MemoryStore>,
        embedder,
        config.engine.clone(),
    ));

    let provider = Arc::new(DuckDuckGoProvider::new(config.research.search_timeout_secs)?);
    let researcher = Arc::new(Researcher::new(
        engine.clone(),
        provider,
        config.research.clone(),
    ));

    let learner = Arc::new(AutoLearner::new(
        store.clone(),
        researcher.clone(),
        Box::new(RegexTopicExtractor::new()),
        config.learner.clone(),
    ));
    learner.seed_default_topics();
    learner.start();
    info!("📚 Auto-learning scheduler started");

    // Clones for shutdown cleanup, taken before the router consumes the state
    let learner_for_shutdown = learner.clone();
    let store_for_shutdown = store.clone();

    let state = AppState {
        engine,
        learner,
        researcher,
    };

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(config.rate_limit_per_second)
        .burst_size(config.rate_limit_burst)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Failed to build rate limiter configuration"))?;

    let governor_layer = GovernorLayer::new(governor_conf);

    info!(
        "⚡ Rate limiting enabled: {} req/sec, burst of {}",
        config.rate_limit_per_second, config.rate_limit_burst
    );

    let cors = config.cors.to_layer();

    // API routes are rate limited; health and metrics stay reachable for probes
    let api_routes = Router::new()
        .route("/api/teach", post(teach))
        .route("/api/ask", post(ask))
        .route("/api/rules", post(add_rule))
        .route("/api/memories", get(get_memories))
        .route("/api/memory/{id}", delete(delete_memory))
        .route("/api/update", post(force_update))
        .route("/api/research", post(research_topic))
        .route("/api/learning/topics", get(list_topics))
        .route("/api/learning/topics", post(add_topic))
        .route("/api/learning/topics/{topic}", delete(remove_topic))
        .route("/api/learning/stats", get(learning_stats))
        .route("/api/learning/start", post(start_learning))
        .route("/api/learning/stop", post(stop_learning))
        .layer(governor_layer)
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state);

    let max_concurrent = config.max_concurrent_requests;
    info!("🔄 Concurrency limiting enabled: max_concurrent={max_concurrent}");

    let app = Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(axum::middleware::from_fn(smriti::middleware::track_metrics))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {e}"))?;
    info!("🚀 Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("🔒 Shutdown signal received, stopping background work...");

    let cleanup_future = async {
        // Scheduler first so no research session writes after the flush
        learner_for_shutdown.stop().await;
        info!("✅ Learning scheduler stopped");

        let flush_future = async { store_for_shutdown.flush() };
        match tokio::time::timeout(
            std::time::Duration::from_secs(DATABASE_FLUSH_TIMEOUT_SECS),
            flush_future,
        )
        .await
        {
            Ok(Ok(())) => info!("✅ Database flushed successfully"),
            Ok(Err(e)) => tracing::error!("❌ Failed to flush database: {e}"),
            Err(_) => tracing::error!(
                "⏱️  Database flush timed out after {}s",
                DATABASE_FLUSH_TIMEOUT_SECS
            ),
        }
    };

    match tokio::time::timeout(
        std::time::Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        cleanup_future,
    )
    .await
    {
        Ok(()) => info!("👋 Server shutdown complete"),
        Err(_) => {
            tracing::error!(
                "⏱️  Graceful shutdown timed out after {}s, forcing exit",
                GRACEFUL_SHUTDOWN_TIMEOUT_SECS
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Handle graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received, starting graceful shutdown");
}
