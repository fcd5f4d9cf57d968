//! Auto-learning scheduler tests
//!
//! Exercises topic discovery from conversation, promotion after enough
//! mentions, interval scheduling, checkpoint persistence, and the
//! start/stop lifecycle. All web access goes through a mock provider.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use smriti::config::{EngineConfig, LearnerConfig, ResearchConfig};
use smriti::embeddings::HashEmbedder;
use smriti::engine::KnowledgeEngine;
use smriti::errors::AppError;
use smriti::research::{Researcher, SearchHit, SearchProvider};
use smriti::scheduler::{AutoLearner, SessionKind};
use smriti::store::RocksMemoryStore;
use smriti::topics::RegexTopicExtractor;

// ============================================================================
// TEST INFRASTRUCTURE
// ============================================================================

/// Provider that serves canned hits (or fails) and counts calls
struct MockProvider {
    hits: Vec<SearchHit>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockProvider {
    fn with_hits(hits: Vec<SearchHit>) -> Arc<Self> {
        Arc::new(Self {
            hits,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            hits: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn search(&self, _query: &str, max_results: usize) -> anyhow::Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("network down");
        }
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

fn sample_hit(slug: &str) -> SearchHit {
    SearchHit {
        title: format!("{slug} article"),
        url: format!("https://example.com/{slug}"),
        snippet: format!("Everything worth knowing about {slug}."),
        source: "wikipedia".to_string(),
    }
}

struct Fixture {
    store: Arc<RocksMemoryStore>,
    engine: Arc<KnowledgeEngine>,
    _dir: TempDir,
}

fn create_fixture() -> Fixture {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(RocksMemoryStore::open(dir.path()).expect("Failed to open store"));
    let engine = Arc::new(KnowledgeEngine::new(
        store.clone(),
        Arc::new(HashEmbedder::new()),
        EngineConfig::default(),
    ));
    Fixture {
        store,
        engine,
        _dir: dir,
    }
}

fn create_learner(fixture: &Fixture, provider: Arc<MockProvider>) -> Arc<AutoLearner> {
    let researcher = Arc::new(Researcher::new(
        fixture.engine.clone(),
        provider,
        ResearchConfig::default(),
    ));
    Arc::new(AutoLearner::new(
        fixture.store.clone(),
        researcher,
        Box::new(RegexTopicExtractor::new()),
        LearnerConfig::default(),
    ))
}

// ============================================================================
// DISCOVERY AND PROMOTION
// ============================================================================

#[tokio::test]
async fn repeated_mentions_promote_topic_to_schedule() {
    let fixture = create_fixture();
    let provider = MockProvider::with_hits(vec![sample_hit("quantum-computing")]);
    let learner = create_learner(&fixture, provider);

    let first = learner.observe_conversation("what is quantum computing?");
    assert_eq!(first, vec!["Quantum computing".to_string()]);
    learner.observe_conversation("what is quantum computing?");

    let report = learner.learning_report();
    assert_eq!(report.discovered_topics.len(), 1);
    assert_eq!(report.discovered_topics[0].mentions, 2);
    assert!(report.scheduled_topics.is_empty());

    learner.run_cycle().await;

    let report = learner.learning_report();
    assert!(report.discovered_topics.is_empty(), "candidate should be consumed");

    let scheduled = &report.scheduled_topics;
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].topic, "Quantum computing");
    assert!(scheduled[0].discovered);
    assert_eq!(scheduled[0].interval_hours, 168);
    assert!(scheduled[0].last_researched_at.is_some());

    assert!(report.total_items_learned > 0);
    assert_eq!(report.recent_sessions[0].kind, SessionKind::Discovered);
    assert_eq!(report.recent_sessions[0].mention_count, Some(2));
}

#[tokio::test]
async fn single_mention_is_not_promoted() {
    let fixture = create_fixture();
    let provider = MockProvider::with_hits(vec![sample_hit("gene-editing")]);
    let learner = create_learner(&fixture, provider.clone());

    learner.observe_conversation("what is gene editing?");
    learner.run_cycle().await;

    let report = learner.learning_report();
    assert!(report.scheduled_topics.is_empty());
    assert_eq!(report.discovered_topics.len(), 1);
    assert_eq!(provider.call_count(), 0, "no research should run");
}

#[tokio::test]
async fn personal_chatter_is_ignored() {
    let fixture = create_fixture();
    let provider = MockProvider::with_hits(vec![sample_hit("anything")]);
    let learner = create_learner(&fixture, provider);

    assert!(learner.observe_conversation("what is your name?").is_empty());
    assert!(learner.observe_conversation("tell me about my schedule").is_empty());
    assert!(learner.learning_report().discovered_topics.is_empty());
}

#[tokio::test]
async fn failed_promotion_stays_due_for_retry() {
    let fixture = create_fixture();
    let provider = MockProvider::failing();
    let learner = create_learner(&fixture, provider.clone());

    learner.observe_conversation("what is dark matter?");
    learner.observe_conversation("what is dark matter?");
    learner.run_cycle().await;

    let report = learner.learning_report();
    assert_eq!(report.scheduled_topics.len(), 1);
    assert!(report.scheduled_topics[0].discovered);
    assert!(
        report.scheduled_topics[0].last_researched_at.is_none(),
        "failed research must not stamp the topic"
    );
    assert_eq!(report.total_items_learned, 0);

    // Still due, so the next pass retries it
    let calls_before = provider.call_count();
    learner.run_cycle().await;
    assert!(provider.call_count() > calls_before);
}

// ============================================================================
// SCHEDULED TOPICS
// ============================================================================

#[tokio::test]
async fn researched_topic_is_not_due_until_interval_elapses() {
    let fixture = create_fixture();
    let provider = MockProvider::with_hits(vec![sample_hit("rust-lang")]);
    let learner = create_learner(&fixture, provider.clone());

    let topic = learner
        .add_topic("Rust programming", 24)
        .expect("add_topic failed");
    assert!(topic.last_researched_at.is_none(), "new topics are due immediately");

    learner.run_cycle().await;
    let calls_after_first = provider.call_count();
    assert!(calls_after_first > 0);

    learner.run_cycle().await;
    assert_eq!(
        provider.call_count(),
        calls_after_first,
        "freshly researched topic must not be researched again"
    );
}

#[tokio::test]
async fn invalid_topics_are_rejected() {
    let fixture = create_fixture();
    let learner = create_learner(&fixture, MockProvider::with_hits(Vec::new()));

    assert!(matches!(
        learner.add_topic("my", 24),
        Err(AppError::InvalidTopic(_))
    ));
    assert!(matches!(
        learner.research_topic_now("hm").await,
        Err(AppError::InvalidTopic(_))
    ));
}

#[tokio::test]
async fn removing_unknown_topic_is_not_found() {
    let fixture = create_fixture();
    let learner = create_learner(&fixture, MockProvider::with_hits(Vec::new()));

    assert!(matches!(
        learner.remove_topic("never added"),
        Err(AppError::TopicNotFound(_))
    ));
}

#[tokio::test]
async fn seeding_is_idempotent() {
    let fixture = create_fixture();
    let learner = create_learner(&fixture, MockProvider::with_hits(Vec::new()));

    learner.seed_default_topics();
    assert_eq!(learner.topics().len(), 5);

    learner.seed_default_topics();
    assert_eq!(learner.topics().len(), 5);
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[tokio::test]
async fn state_survives_learner_restart() {
    let fixture = create_fixture();
    let provider = MockProvider::with_hits(vec![sample_hit("astronomy")]);

    {
        let learner = create_learner(&fixture, provider.clone());
        learner.add_topic("Astronomy", 24).expect("add_topic failed");
        learner.observe_conversation("what is plate tectonics?");
        learner.run_cycle().await;
    }

    // Same storage, fresh learner: schedule, mentions, and stats come back
    let learner = create_learner(&fixture, provider);
    let report = learner.learning_report();

    assert_eq!(report.scheduled_topics.len(), 1);
    assert_eq!(report.scheduled_topics[0].topic, "Astronomy");
    assert!(report.scheduled_topics[0].last_researched_at.is_some());

    assert_eq!(report.discovered_topics.len(), 1);
    assert_eq!(report.discovered_topics[0].mentions, 1);

    assert!(report.total_items_learned > 0);
    assert_eq!(report.recent_sessions.len(), 1);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn start_and_stop_lifecycle() {
    let fixture = create_fixture();
    let learner = create_learner(&fixture, MockProvider::with_hits(Vec::new()));

    assert!(!learner.is_running());
    assert!(learner.start());
    assert!(learner.is_running());
    assert!(!learner.start(), "double start must be rejected");

    learner.stop().await;
    assert!(!learner.is_running());

    // Restartable after a clean stop
    assert!(learner.start());
    learner.stop().await;
    assert!(!learner.is_running());
}
