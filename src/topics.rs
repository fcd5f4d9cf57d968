//! Topic extraction and validation for conversation-driven discovery
//!
//! Pulls candidate learning topics out of free-form queries. Extraction is
//! pattern-based: interrogative phrasings first, then a short-phrase
//! heuristic for bare noun phrases like "quantum computing basics".

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Words that mark a phrase as personal rather than a researchable topic
const PERSONAL_WORDS: &[&str] = &[
    "you", "your", "i", "my", "me", "we", "us", "yourself", "myself",
];

/// Filler words that cannot carry a topic on their own
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

lazy_static! {
    static ref TOPIC_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)^what is (.+?)\??$").unwrap(),
        Regex::new(r"(?i)^what are (.+?)\??$").unwrap(),
        Regex::new(r"(?i)^explain (.+?)\??$").unwrap(),
        Regex::new(r"(?i)^tell me about (.+?)\??$").unwrap(),
        Regex::new(r"(?i)^how does (.+?) work\??$").unwrap(),
        Regex::new(r"(?i)^what do you know about (.+?)\??$").unwrap(),
        Regex::new(r"(?i)^information about (.+?)\??$").unwrap(),
        Regex::new(r"(?i)^define (.+?)\??$").unwrap(),
        Regex::new(r"(?i)^can you explain (.+?)\??$").unwrap(),
        Regex::new(r"(?i)^teach me (?:about )?(.+?)\??$").unwrap(),
        Regex::new(r"(?i)^learn about (.+?)\??$").unwrap(),
    ];
}

/// Seam for extracting candidate topics from conversation text
pub trait TopicExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Regex-based extractor with a short-phrase fallback
pub struct RegexTopicExtractor;

impl RegexTopicExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RegexTopicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicExtractor for RegexTopicExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        let mut seen = HashSet::new();
        let mut topics = Vec::new();

        for pattern in TOPIC_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(trimmed) {
                if let Some(m) = caps.get(1) {
                    let candidate = normalize_topic(m.as_str());
                    if is_valid_topic(&candidate) && seen.insert(candidate.to_lowercase()) {
                        topics.push(candidate);
                    }
                }
            }
        }

        // Bare noun phrases: a few words, not a question, nothing personal
        if topics.is_empty() {
            let words: Vec<&str> = trimmed.split_whitespace().collect();
            let personal = words
                .iter()
                .any(|w| PERSONAL_WORDS.contains(&w.to_lowercase().as_str()));

            if (2..=6).contains(&words.len())
                && !personal
                && trimmed.len() > 5
                && !trimmed.ends_with('?')
            {
                let candidate = normalize_topic(trimmed);
                if is_valid_topic(&candidate) && seen.insert(candidate.to_lowercase()) {
                    topics.push(candidate);
                }
            }
        }

        topics
    }
}

/// Whether a string can be scheduled as a research topic
pub fn is_valid_topic(topic: &str) -> bool {
    let trimmed = topic.trim();
    if trimmed.len() < 3 || trimmed.len() > 60 {
        return false;
    }

    let words: Vec<String> = trimmed
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.is_empty() {
        return false;
    }

    if words.iter().any(|w| PERSONAL_WORDS.contains(&w.as_str())) {
        return false;
    }

    // Reject phrases made entirely of stopwords
    if words.iter().all(|w| STOPWORDS.contains(&w.as_str())) {
        return false;
    }

    true
}

/// Canonical form for scheduling and deduplication: trimmed, no trailing
/// question mark, first letter capitalized
pub fn normalize_topic(topic: &str) -> String {
    let cleaned = topic.trim().trim_end_matches('?').trim();
    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<String> {
        RegexTopicExtractor::new().extract(text)
    }

    #[test]
    fn test_extract_what_is() {
        assert_eq!(extract("what is quantum computing?"), vec!["Quantum computing"]);
        assert_eq!(extract("What is rust"), vec!["Rust"]);
    }

    #[test]
    fn test_extract_other_patterns() {
        assert_eq!(extract("explain neural networks"), vec!["Neural networks"]);
        assert_eq!(extract("tell me about black holes"), vec!["Black holes"]);
        assert_eq!(extract("how does photosynthesis work?"), vec!["Photosynthesis"]);
        assert_eq!(extract("teach me about linear algebra"), vec!["Linear algebra"]);
    }

    #[test]
    fn test_short_phrase_fallback() {
        assert_eq!(extract("quantum computing basics"), vec!["Quantum computing basics"]);
        // Questions are not bare phrases
        assert!(extract("quantum computing basics?").is_empty());
        // Single words are too ambiguous
        assert!(extract("rust").is_empty());
    }

    #[test]
    fn test_personal_phrases_rejected() {
        assert!(extract("what is your name?").is_empty());
        assert!(extract("tell me about my schedule").is_empty());
        assert!(extract("remind me later").is_empty());
    }

    #[test]
    fn test_topic_validity() {
        assert!(is_valid_topic("Quantum computing"));
        assert!(!is_valid_topic("ab")); // too short
        assert!(!is_valid_topic(&"x".repeat(61))); // too long
        assert!(!is_valid_topic("the and of")); // all stopwords
        assert!(!is_valid_topic("my project")); // personal
    }

    #[test]
    fn test_normalize_topic() {
        assert_eq!(normalize_topic("  rust basics?  "), "Rust basics");
        assert_eq!(normalize_topic("Rust"), "Rust");
        assert_eq!(normalize_topic(""), "");
    }
}
