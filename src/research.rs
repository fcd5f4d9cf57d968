//! Web research: search providers and knowledge acquisition
//!
//! A research session fans a topic out into query variants, deduplicates
//! hits by URL, and teaches each formatted snippet back into the engine
//! under the researched-knowledge category. Provider failures degrade to
//! fewer results, never to a failed session by themselves.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ResearchConfig;
use crate::constants::{QUICK_ANSWER_PERSIST_MIN_LEN, RESEARCH_CATEGORY, RESEARCH_CONFIDENCE};
use crate::engine::{AskResult, KnowledgeEngine};
use crate::metrics;

const SNIPPET_MAX_LEN: usize = 250;

/// A single search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
}

/// Seam for web search backends
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logging and metrics
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// DuckDuckGo Instant Answer API provider
///
/// Keyless and rate-limit friendly; returns an abstract plus related
/// topics rather than full web results, which is plenty for snippets.
pub struct DuckDuckGoProvider {
    client: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
struct InstantAnswer {
    #[serde(default, rename = "Heading")]
    heading: String,
    #[serde(default, rename = "AbstractText")]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default, rename = "AbstractSource")]
    abstract_source: String,
    #[serde(default, rename = "RelatedTopics")]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
struct RelatedTopic {
    #[serde(default, rename = "Text")]
    text: String,
    #[serde(default, rename = "FirstURL")]
    first_url: String,
    // Category groupings nest one level deeper
    #[serde(default, rename = "Topics")]
    topics: Vec<RelatedTopic>,
}

impl DuckDuckGoProvider {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("smriti/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn flatten_related(topics: &[RelatedTopic], out: &mut Vec<SearchHit>, budget: usize) {
        for topic in topics {
            if out.len() >= budget {
                return;
            }
            if !topic.text.is_empty() && !topic.first_url.is_empty() {
                out.push(SearchHit {
                    title: truncate(&topic.text, 80),
                    url: topic.first_url.clone(),
                    snippet: truncate(&topic.text, SNIPPET_MAX_LEN),
                    source: "duckduckgo".to_string(),
                });
            }
            Self::flatten_related(&topic.topics, out, budget);
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<SearchHit>> {
        let response = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let answer: InstantAnswer = serde_json::from_str(&body)
            .map_err(|e| anyhow::anyhow!("Unexpected instant answer payload: {e}"))?;

        let mut hits = Vec::new();
        if !answer.abstract_text.is_empty() {
            hits.push(SearchHit {
                title: if answer.heading.is_empty() {
                    query.to_string()
                } else {
                    answer.heading.clone()
                },
                url: answer.abstract_url.clone(),
                snippet: truncate(&answer.abstract_text, SNIPPET_MAX_LEN),
                source: if answer.abstract_source.is_empty() {
                    "duckduckgo".to_string()
                } else {
                    answer.abstract_source.clone()
                },
            });
        }

        Self::flatten_related(&answer.related_topics, &mut hits, max_results);
        hits.truncate(max_results);
        Ok(hits)
    }
}

/// Research session outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Success,
    NoResults,
    Error,
}

/// Summary of one research session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub topic: String,
    pub status: ResearchStatus,
    pub learned_items: usize,
    pub sources: Vec<String>,
    pub errors: usize,
    pub message: String,
}

/// Answer from a quick (non-persisting by default) search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickAnswer {
    pub found: bool,
    pub answer: String,
    pub sources: Vec<String>,
}

/// Researches topics against a search provider and teaches the results
pub struct Researcher {
    engine: Arc<KnowledgeEngine>,
    provider: Arc<dyn SearchProvider>,
    config: ResearchConfig,
}

impl Researcher {
    pub fn new(
        engine: Arc<KnowledgeEngine>,
        provider: Arc<dyn SearchProvider>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            engine,
            provider,
            config,
        }
    }

    /// Query variants tried for a topic, most literal first
    fn query_variants(topic: &str) -> Vec<String> {
        vec![
            topic.to_string(),
            format!("what is {topic}"),
            format!("explain {topic}"),
            format!("{topic} overview"),
        ]
    }

    /// Gather deduplicated hits across query variants
    async fn gather_hits(&self, topic: &str) -> Vec<SearchHit> {
        let timeout = Duration::from_secs(self.config.search_timeout_secs);
        let mut seen_urls = HashSet::new();
        let mut hits = Vec::new();

        for query in Self::query_variants(topic)
            .into_iter()
            .take(self.config.query_variants)
        {
            let outcome =
                tokio::time::timeout(timeout, self.provider.search(&query, self.config.max_results))
                    .await;

            match outcome {
                Ok(Ok(batch)) => {
                    metrics::SEARCH_REQUESTS_TOTAL
                        .with_label_values(&[self.provider.name(), "success"])
                        .inc();
                    for hit in batch {
                        // URL is identity; the same page often comes back
                        // for multiple variants
                        let key = if hit.url.is_empty() {
                            hit.snippet.clone()
                        } else {
                            hit.url.clone()
                        };
                        if seen_urls.insert(key) {
                            hits.push(hit);
                        }
                    }
                }
                Ok(Err(e)) => {
                    metrics::SEARCH_REQUESTS_TOTAL
                        .with_label_values(&[self.provider.name(), "failure"])
                        .inc();
                    tracing::warn!("Search for '{query}' failed: {e}");
                }
                Err(_) => {
                    metrics::SEARCH_REQUESTS_TOTAL
                        .with_label_values(&[self.provider.name(), "timeout"])
                        .inc();
                    tracing::warn!("Search for '{query}' timed out");
                }
            }
        }

        hits
    }

    /// Format a hit as a teachable answer
    fn format_knowledge(hit: &SearchHit) -> String {
        format!(
            "Based on research from {}: {} [Source: {}]",
            hit.source, hit.snippet, hit.title
        )
    }

    /// Research a topic and teach every usable hit into the engine
    ///
    /// One failed teach does not abort the session; partial learning still
    /// counts as success.
    pub async fn research_and_learn(&self, topic: &str) -> ResearchOutcome {
        tracing::info!("Researching topic: {topic}");
        let hits = self.gather_hits(topic).await;

        if hits.is_empty() {
            return ResearchOutcome {
                topic: topic.to_string(),
                status: ResearchStatus::NoResults,
                learned_items: 0,
                sources: Vec::new(),
                errors: 0,
                message: format!("No search results found for '{topic}'"),
            };
        }

        let question = format!("What is {topic}?");
        let mut learned = 0;
        let mut errors = 0;
        let mut sources = Vec::new();

        for hit in &hits {
            let answer = Self::format_knowledge(hit);
            let context = format!("Researched from web: {} - {}", hit.source, hit.url);
            match self
                .engine
                .teach(&question, &answer, Some(&context), RESEARCH_CATEGORY)
            {
                Ok(_) => {
                    learned += 1;
                    sources.push(hit.url.clone());
                }
                Err(e) => {
                    errors += 1;
                    tracing::warn!("Failed to store researched knowledge: {e}");
                }
            }
        }

        // Make fresh knowledge queryable immediately
        if learned > 0 {
            if let Err(e) = self.engine.force_update() {
                tracing::warn!("Post-research index update failed: {e}");
            }
        }

        let status = if learned > 0 {
            ResearchStatus::Success
        } else {
            ResearchStatus::Error
        };

        ResearchOutcome {
            message: match status {
                ResearchStatus::Success => {
                    format!("Learned {learned} item(s) about '{topic}'")
                }
                _ => format!("Found {} result(s) but stored none", hits.len()),
            },
            topic: topic.to_string(),
            status,
            learned_items: learned,
            sources,
            errors,
        }
    }

    /// Search without teaching; used for on-demand answers
    pub async fn quick_search(&self, query: &str) -> QuickAnswer {
        let hits = self.gather_hits(query).await;

        match hits.first() {
            Some(hit) => QuickAnswer {
                found: true,
                answer: Self::format_knowledge(hit),
                sources: hits.iter().map(|h| h.url.clone()).collect(),
            },
            None => QuickAnswer {
                found: false,
                answer: String::new(),
                sources: Vec::new(),
            },
        }
    }

    /// Heuristic: is this query worth sending to the web?
    pub fn should_research(query: &str) -> bool {
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();

        // Personal or conversational queries stay local
        const PERSONAL: &[&str] = &["you", "your", "i", "my", "me", "we", "us"];
        if words.iter().any(|w| PERSONAL.contains(w)) {
            return false;
        }

        if lowered.len() < 5 {
            return false;
        }

        const RESEARCH_STARTS: &[&str] =
            &["what", "who", "when", "where", "why", "how", "explain", "define"];
        if words
            .first()
            .is_some_and(|w| RESEARCH_STARTS.contains(w))
        {
            return true;
        }

        lowered.ends_with('?') || words.len() > 3
    }

    /// Ask with a research fallback: if the engine comes up empty and the
    /// query looks researchable, try the web. Substantial answers are
    /// taught back so the next ask hits the index instead of the network.
    pub async fn ask_with_research(&self, query: &str, threshold: Option<f32>) -> AskResult {
        let base = self.engine.ask(query, threshold);

        if !matches!(base, AskResult::Unknown { .. }) || !Self::should_research(query) {
            return base;
        }

        let quick = self.quick_search(query).await;
        if !quick.found {
            return base;
        }

        if quick.answer.len() > QUICK_ANSWER_PERSIST_MIN_LEN {
            if let Err(e) = self
                .engine
                .teach(query, &quick.answer, None, RESEARCH_CATEGORY)
            {
                tracing::warn!("Failed to persist researched answer: {e}");
            }
        }

        AskResult::WebResearch {
            response: quick.answer,
            confidence: RESEARCH_CONFIDENCE,
            sources: quick.sources,
        }
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_len).collect();
        format!("{cut}...")
    }
}
