//! Auto-learning scheduler
//!
//! Runs a background cadence loop that researches scheduled topics when
//! their interval elapses, and promotes conversation-discovered topics
//! once they accumulate enough mentions. Learning statistics and mention
//! counts are checkpointed to the store on every mutation so restarts
//! lose nothing.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::config::LearnerConfig;
use crate::constants::{SCHEDULER_STOP_TIMEOUT_SECS, SHUTDOWN_POLL_MS, STATS_HISTORY_CAP};
use crate::errors::AppError;
use crate::metrics;
use crate::research::{Researcher, ResearchOutcome, ResearchStatus};
use crate::store::CheckpointStore;
use crate::topics::{is_valid_topic, normalize_topic, TopicExtractor};

const CHECKPOINT_KEY: &str = "auto_learner:state";

/// A topic on the research schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningTopic {
    pub topic: String,
    pub interval_hours: u32,
    /// None means never researched, which always counts as due
    pub last_researched_at: Option<DateTime<Utc>>,
    /// True when this topic was promoted from conversation discovery
    pub discovered: bool,
}

impl LearningTopic {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_researched_at {
            None => true,
            Some(last) => now - last >= ChronoDuration::hours(i64::from(self.interval_hours)),
        }
    }
}

/// How a research session was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Scheduled,
    Discovered,
    Manual,
}

impl SessionKind {
    fn label(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Discovered => "discovered",
            Self::Manual => "manual",
        }
    }
}

/// One completed research session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSession {
    pub topic: String,
    pub kind: SessionKind,
    pub timestamp: DateTime<Utc>,
    pub items_learned: usize,
    pub sources: Vec<String>,
    /// Mention count at promotion time, for discovered topics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mention_count: Option<u32>,
}

/// Cumulative learning statistics, persisted across restarts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningStats {
    pub total_items_learned: u64,
    pub last_learning_session: Option<DateTime<Utc>>,
    /// Bounded history, newest last
    pub sessions: Vec<LearningSession>,
}

/// A discovered topic candidate with its mention count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredTopic {
    pub topic: String,
    pub mentions: u32,
}

/// Snapshot returned by the learning stats endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningReport {
    pub running: bool,
    pub scheduled_topics: Vec<LearningTopic>,
    pub discovered_topics: Vec<DiscoveredTopic>,
    pub total_items_learned: u64,
    pub last_learning_session: Option<DateTime<Utc>>,
    pub recent_sessions: Vec<LearningSession>,
}

/// The durable slice of scheduler state
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    stats: LearningStats,
    mentions: BTreeMap<String, u32>,
    topics: BTreeMap<String, LearningTopic>,
}

#[derive(Default)]
struct LearnerState {
    /// Keyed by lowercased topic for case-insensitive dedup
    topics: BTreeMap<String, LearningTopic>,
    mentions: BTreeMap<String, u32>,
    stats: LearningStats,
}

/// Background topic researcher
pub struct AutoLearner {
    state: Mutex<LearnerState>,
    checkpoint: Arc<dyn CheckpointStore>,
    extractor: Box<dyn TopicExtractor>,
    researcher: Arc<Researcher>,
    config: LearnerConfig,
    /// Loop is active
    running: AtomicBool,
    /// Stop was requested; aborts an in-flight pass between topics
    shutdown: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutoLearner {
    pub fn new(
        checkpoint: Arc<dyn CheckpointStore>,
        researcher: Arc<Researcher>,
        extractor: Box<dyn TopicExtractor>,
        config: LearnerConfig,
    ) -> Self {
        let state = Self::load_state(checkpoint.as_ref());

        let learner = Self {
            state: Mutex::new(state),
            checkpoint,
            extractor,
            researcher,
            config,
            running: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            handle: Mutex::new(None),
        };
        learner.update_gauges();
        learner
    }

    fn load_state(checkpoint: &dyn CheckpointStore) -> LearnerState {
        match checkpoint.load_checkpoint(CHECKPOINT_KEY) {
            Ok(Some(bytes)) => match rmp_serde::from_slice::<PersistedState>(&bytes) {
                Ok(persisted) => {
                    tracing::info!(
                        "Restored learner state: {} topic(s), {} candidate(s), {} session(s)",
                        persisted.topics.len(),
                        persisted.mentions.len(),
                        persisted.stats.sessions.len()
                    );
                    LearnerState {
                        topics: persisted.topics,
                        mentions: persisted.mentions,
                        stats: persisted.stats,
                    }
                }
                Err(e) => {
                    tracing::warn!("Discarding undecodable learner checkpoint: {e}");
                    LearnerState::default()
                }
            },
            Ok(None) => LearnerState::default(),
            Err(e) => {
                tracing::warn!("Failed to load learner checkpoint: {e}");
                LearnerState::default()
            }
        }
    }

    /// Best-effort checkpoint; persistence failures are logged, never raised
    fn persist(&self, state: &LearnerState) {
        let persisted = PersistedState {
            stats: state.stats.clone(),
            mentions: state.mentions.clone(),
            topics: state.topics.clone(),
        };

        match rmp_serde::to_vec(&persisted) {
            Ok(bytes) => {
                if let Err(e) = self.checkpoint.save_checkpoint(CHECKPOINT_KEY, &bytes) {
                    tracing::warn!("Failed to checkpoint learner state: {e}");
                }
            }
            Err(e) => tracing::warn!("Failed to serialize learner state: {e}"),
        }
    }

    fn update_gauges(&self) {
        let state = self.state.lock();
        metrics::SCHEDULED_TOPICS.set(state.topics.len() as i64);
        metrics::DISCOVERED_TOPICS.set(state.mentions.len() as i64);
    }

    /// Put a topic on the schedule. A repeated add updates the interval.
    pub fn add_topic(&self, topic: &str, interval_hours: u32) -> Result<LearningTopic, AppError> {
        let normalized = normalize_topic(topic);
        if !is_valid_topic(&normalized) {
            return Err(AppError::InvalidTopic(topic.to_string()));
        }

        let entry = LearningTopic {
            topic: normalized.clone(),
            interval_hours,
            last_researched_at: None,
            discovered: false,
        };

        let mut state = self.state.lock();
        state.topics.insert(normalized.to_lowercase(), entry.clone());
        // A scheduled topic no longer needs discovery tracking
        state.mentions.remove(&normalized.to_lowercase());
        self.persist(&state);
        drop(state);

        self.update_gauges();
        tracing::info!("Scheduled topic '{normalized}' every {interval_hours}h");
        Ok(entry)
    }

    pub fn remove_topic(&self, topic: &str) -> Result<(), AppError> {
        let key = normalize_topic(topic).to_lowercase();

        let mut state = self.state.lock();
        if state.topics.remove(&key).is_none() {
            return Err(AppError::TopicNotFound(topic.to_string()));
        }
        self.persist(&state);
        drop(state);

        self.update_gauges();
        Ok(())
    }

    pub fn topics(&self) -> Vec<LearningTopic> {
        self.state.lock().topics.values().cloned().collect()
    }

    /// Record topic mentions found in conversation text. Returns the
    /// topics that were counted.
    pub fn observe_conversation(&self, text: &str) -> Vec<String> {
        let candidates = self.extractor.extract(text);
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut recorded = Vec::new();
        let mut state = self.state.lock();

        for topic in candidates {
            let key = topic.to_lowercase();
            if state.topics.contains_key(&key) {
                continue;
            }

            // Bound candidate growth; existing candidates keep counting
            if !state.mentions.contains_key(&key)
                && state.mentions.len() >= self.config.max_discovered_topics
            {
                tracing::debug!("Discovered-topic cap reached; ignoring '{topic}'");
                continue;
            }

            let count = state.mentions.entry(key).or_insert(0);
            *count += 1;
            tracing::debug!("Topic '{topic}' mentioned ({} so far)", *count);
            recorded.push(topic);
        }

        if !recorded.is_empty() {
            self.persist(&state);
        }
        drop(state);

        self.update_gauges();
        recorded
    }

    pub fn learning_report(&self) -> LearningReport {
        let state = self.state.lock();

        let mut discovered: Vec<DiscoveredTopic> = state
            .mentions
            .iter()
            .map(|(topic, &mentions)| DiscoveredTopic {
                topic: topic.clone(),
                mentions,
            })
            .collect();
        discovered.sort_by(|a, b| b.mentions.cmp(&a.mentions));
        discovered.truncate(15);

        let recent_sessions: Vec<LearningSession> =
            state.stats.sessions.iter().rev().take(15).cloned().collect();

        LearningReport {
            running: self.is_running(),
            scheduled_topics: state.topics.values().cloned().collect(),
            discovered_topics: discovered,
            total_items_learned: state.stats.total_items_learned,
            last_learning_session: state.stats.last_learning_session,
            recent_sessions,
        }
    }

    /// Seed a default schedule on first run
    pub fn seed_default_topics(&self) {
        const STARTERS: &[&str] = &[
            "Artificial intelligence",
            "Space exploration",
            "Climate science",
            "Quantum computing",
            "World news",
        ];

        if !self.state.lock().topics.is_empty() {
            return;
        }

        for topic in STARTERS {
            if let Err(e) = self.add_topic(topic, 24) {
                tracing::warn!("Failed to seed topic '{topic}': {e}");
            }
        }
    }

    /// Research a topic immediately, outside the cadence
    pub async fn research_topic_now(&self, topic: &str) -> Result<ResearchOutcome, AppError> {
        let normalized = normalize_topic(topic);
        if !is_valid_topic(&normalized) {
            return Err(AppError::InvalidTopic(topic.to_string()));
        }

        let outcome = self.researcher.research_and_learn(&normalized).await;
        self.record_session(&normalized, SessionKind::Manual, None, &outcome);
        Ok(outcome)
    }

    /// Record a finished session: stats, schedule timestamps, checkpoint
    fn record_session(
        &self,
        topic: &str,
        kind: SessionKind,
        mention_count: Option<u32>,
        outcome: &ResearchOutcome,
    ) {
        let status = match outcome.status {
            ResearchStatus::Success => "success",
            ResearchStatus::NoResults => "no_results",
            ResearchStatus::Error => "error",
        };
        metrics::RESEARCH_SESSIONS_TOTAL
            .with_label_values(&[kind.label(), status])
            .inc();

        let mut state = self.state.lock();

        if outcome.status == ResearchStatus::Success {
            let now = Utc::now();
            if let Some(entry) = state.topics.get_mut(&topic.to_lowercase()) {
                entry.last_researched_at = Some(now);
            }

            state.stats.total_items_learned += outcome.learned_items as u64;
            state.stats.last_learning_session = Some(now);
            state.stats.sessions.push(LearningSession {
                topic: topic.to_string(),
                kind,
                timestamp: now,
                items_learned: outcome.learned_items,
                sources: outcome.sources.clone(),
                mention_count,
            });

            let overflow = state.stats.sessions.len().saturating_sub(STATS_HISTORY_CAP);
            if overflow > 0 {
                state.stats.sessions.drain(..overflow);
            }
        } else {
            tracing::warn!("Research for '{topic}' ended with {status}: {}", outcome.message);
        }

        self.persist(&state);
    }

    /// One scheduler pass: due scheduled topics, then ready discoveries.
    /// The background loop calls this on its cadence; tests call it directly.
    pub async fn run_cycle(&self) {
        let now = Utc::now();
        let due: Vec<String> = {
            let state = self.state.lock();
            state
                .topics
                .values()
                .filter(|t| t.is_due(now))
                .map(|t| t.topic.clone())
                .collect()
        };

        if !due.is_empty() {
            tracing::info!("Scheduler pass: {} topic(s) due", due.len());
        }

        for topic in due {
            if self.shutdown.load(Ordering::SeqCst) {
                // Shutting down mid-pass; leave the rest for next start
                return;
            }
            let outcome = self.researcher.research_and_learn(&topic).await;
            self.record_session(&topic, SessionKind::Scheduled, None, &outcome);
        }

        // Discovered candidates that crossed the mention threshold
        let ready: Vec<(String, u32)> = {
            let state = self.state.lock();
            state
                .mentions
                .iter()
                .filter(|(_, &count)| count >= self.config.min_topic_mentions)
                .map(|(topic, &count)| (topic.clone(), count))
                .collect()
        };

        for (topic, mentions) in ready {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }

            let display_topic = normalize_topic(&topic);
            tracing::info!("Promoting discovered topic '{}' ({mentions} mentions)", display_topic);
            let outcome = self.researcher.research_and_learn(&display_topic).await;

            {
                let mut state = self.state.lock();
                state.mentions.remove(&topic);
                // Promote regardless of outcome; a failed first attempt
                // stays due and is retried next cycle
                state.topics.insert(
                    topic.clone(),
                    LearningTopic {
                        topic: display_topic.clone(),
                        interval_hours: self.config.promoted_interval_hours,
                        last_researched_at: None,
                        discovered: true,
                    },
                );
            }

            self.record_session(&display_topic, SessionKind::Discovered, Some(mentions), &outcome);
        }

        self.update_gauges();
    }

    /// Start the cadence loop. Returns false if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shutdown.store(false, Ordering::SeqCst);

        let learner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tracing::info!(
                "Auto-learning scheduler started (cadence: {}s)",
                learner.config.cadence_secs
            );

            while !learner.shutdown.load(Ordering::SeqCst) {
                learner.run_cycle().await;

                // Sleep the cadence in small slices so stop() takes effect
                // within SHUTDOWN_POLL_MS, not a full cadence
                let deadline = Instant::now() + Duration::from_secs(learner.config.cadence_secs);
                while !learner.shutdown.load(Ordering::SeqCst) && Instant::now() < deadline {
                    tokio::time::sleep(Duration::from_millis(SHUTDOWN_POLL_MS)).await;
                }
            }

            learner.running.store(false, Ordering::SeqCst);
            tracing::info!("Auto-learning scheduler stopped");
        });

        *self.handle.lock() = Some(handle);
        true
    }

    /// Stop the loop and flush state. Waits briefly for the task to drain.
    pub async fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(Duration::from_secs(SCHEDULER_STOP_TIMEOUT_SECS), handle)
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Scheduler task panicked: {e}"),
                Err(_) => tracing::warn!("Scheduler task did not stop in time; detaching"),
            }
        }
        self.running.store(false, Ordering::SeqCst);

        let state = self.state.lock();
        self.persist(&state);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, ResearchConfig};
    use crate::embeddings::HashEmbedder;
    use crate::engine::KnowledgeEngine;
    use crate::research::SearchHit;
    use crate::store::RocksMemoryStore;
    use crate::topics::RegexTopicExtractor;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct IdleProvider;

    #[async_trait]
    impl crate::research::SearchProvider for IdleProvider {
        fn name(&self) -> &'static str {
            "idle"
        }

        async fn search(&self, _query: &str, _max: usize) -> anyhow::Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    fn create_learner() -> (AutoLearner, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksMemoryStore::open(dir.path()).unwrap());
        let engine = Arc::new(KnowledgeEngine::new(
            store.clone(),
            Arc::new(HashEmbedder::new()),
            EngineConfig::default(),
        ));
        let researcher = Arc::new(Researcher::new(
            engine,
            Arc::new(IdleProvider),
            ResearchConfig::default(),
        ));
        let learner = AutoLearner::new(
            store,
            researcher,
            Box::new(RegexTopicExtractor::new()),
            LearnerConfig::default(),
        );
        (learner, dir)
    }

    #[test]
    fn test_session_history_is_capped_with_oldest_evicted() {
        let (learner, _dir) = create_learner();

        let total = STATS_HISTORY_CAP + 5;
        for i in 1..=total {
            let outcome = ResearchOutcome {
                topic: format!("Topic number {i}"),
                status: ResearchStatus::Success,
                learned_items: 1,
                sources: vec![format!("https://example.com/{i}")],
                errors: 0,
                message: String::new(),
            };
            learner.record_session(&outcome.topic, SessionKind::Manual, None, &outcome);
        }

        let state = learner.state.lock();
        assert_eq!(state.stats.sessions.len(), STATS_HISTORY_CAP);
        assert_eq!(state.stats.sessions[0].topic, "Topic number 6");
        assert_eq!(
            state.stats.sessions.last().unwrap().topic,
            format!("Topic number {total}")
        );
        // Totals keep counting past the history cap
        assert_eq!(state.stats.total_items_learned, total as u64);
    }

    #[test]
    fn test_topic_due_logic() {
        let now = Utc::now();

        let never = LearningTopic {
            topic: "Rust".to_string(),
            interval_hours: 24,
            last_researched_at: None,
            discovered: false,
        };
        assert!(never.is_due(now));

        let just_over = LearningTopic {
            last_researched_at: Some(now - ChronoDuration::hours(24) - ChronoDuration::seconds(1)),
            ..never.clone()
        };
        assert!(just_over.is_due(now));

        let just_under = LearningTopic {
            last_researched_at: Some(now - ChronoDuration::hours(24) + ChronoDuration::seconds(1)),
            ..never
        };
        assert!(!just_under.is_due(now));
    }

    #[test]
    fn test_session_kind_labels() {
        assert_eq!(SessionKind::Scheduled.label(), "scheduled");
        assert_eq!(SessionKind::Discovered.label(), "discovered");
        assert_eq!(SessionKind::Manual.label(), "manual");
    }
}
