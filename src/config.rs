//! Configuration management for Smriti
//!
//! All configurable parameters in one place with environment variable overrides.
//! Follows the principle: sensible defaults, configurable in production.

use std::env;
use std::path::PathBuf;
use tracing::info;

use crate::constants;

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins (empty = allow all)
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache (seconds)
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(), // Empty = allow all origins
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            max_age_seconds: 86400, // 24 hours
        }
    }
}

impl CorsConfig {
    /// Load from environment variables with production safety checks
    ///
    /// In production mode (SMRITI_ENV=production), warns if CORS origins are
    /// not configured to avoid shipping a permissive default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(origins) = env::var("SMRITI_CORS_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        let is_production = env::var("SMRITI_ENV")
            .map(|v| {
                let v = v.to_lowercase();
                v == "production" || v == "prod"
            })
            .unwrap_or(false);

        if is_production && config.allowed_origins.is_empty() {
            tracing::warn!(
                "⚠️  PRODUCTION WARNING: CORS allows all origins. Set SMRITI_CORS_ORIGINS for security."
            );
        }

        config
    }

    /// Check if any origin restrictions are configured
    pub fn is_restricted(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    /// Convert to tower-http CorsLayer
    pub fn to_layer(&self) -> tower_http::cors::CorsLayer {
        use tower_http::cors::{AllowOrigin, Any, CorsLayer};

        let mut layer = CorsLayer::new();

        if self.allowed_origins.is_empty() {
            layer = layer.allow_origin(Any);
        } else {
            let mut valid_origins = Vec::new();
            for origin_str in &self.allowed_origins {
                match origin_str.parse::<axum::http::HeaderValue>() {
                    Ok(origin) => valid_origins.push(origin),
                    Err(_) => tracing::warn!("CORS: Invalid origin '{}' - skipping", origin_str),
                }
            }

            if valid_origins.is_empty() {
                // All configured origins failed to parse. Falling back to
                // permissive would be a security hole, so deny all instead.
                tracing::error!(
                    "CORS: All {} configured origin(s) failed to parse. \
                     Rejecting all cross-origin requests. Fix SMRITI_CORS_ORIGINS.",
                    self.allowed_origins.len()
                );
                layer =
                    layer.allow_origin(AllowOrigin::list(Vec::<axum::http::HeaderValue>::new()));
            } else {
                layer = layer.allow_origin(AllowOrigin::list(valid_origins));
            }
        }

        let methods: Vec<axum::http::Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        if methods.is_empty() {
            layer = layer.allow_methods(Any);
        } else {
            layer = layer.allow_methods(methods);
        }

        let headers: Vec<axum::http::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        if headers.is_empty() {
            layer = layer.allow_headers(Any);
        } else {
            layer = layer.allow_headers(headers);
        }

        layer.max_age(std::time::Duration::from_secs(self.max_age_seconds))
    }
}

/// Knowledge engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default cosine similarity threshold for accepting a match
    pub similarity_threshold: f32,

    /// Pending teach operations that force an index refresh
    pub update_threshold: usize,

    /// Seconds since the last full rebuild before a refresh is forced
    pub rebuild_staleness_secs: u64,

    /// Nearest-neighbor candidates scored per query
    pub top_k: usize,

    /// Upper bound on active memories loaded into the index
    pub max_active_memories: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: constants::DEFAULT_SIMILARITY_THRESHOLD,
            update_threshold: constants::UPDATE_THRESHOLD,
            rebuild_staleness_secs: constants::REBUILD_STALENESS_SECS,
            top_k: constants::TOP_K_CANDIDATES,
            max_active_memories: constants::MAX_ACTIVE_MEMORIES,
        }
    }
}

/// Auto-learning scheduler tunables
#[derive(Debug, Clone)]
pub struct LearnerConfig {
    /// Seconds between scheduler passes
    pub cadence_secs: u64,

    /// Mentions before a discovered topic is researched
    pub min_topic_mentions: u32,

    /// Cap on tracked discovered-topic candidates
    pub max_discovered_topics: usize,

    /// Interval assigned to promoted discovered topics (hours)
    pub promoted_interval_hours: u32,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            cadence_secs: constants::LEARNING_CADENCE_SECS,
            min_topic_mentions: constants::MIN_TOPIC_MENTIONS,
            max_discovered_topics: constants::MAX_DISCOVERED_TOPICS,
            promoted_interval_hours: constants::PROMOTED_TOPIC_INTERVAL_HOURS,
        }
    }
}

/// Web research tunables
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Search results requested per query variant
    pub max_results: usize,

    /// Query variants tried per research session
    pub query_variants: usize,

    /// Per-request search timeout (seconds)
    pub search_timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_results: constants::SEARCH_MAX_RESULTS,
            query_variants: constants::RESEARCH_QUERY_VARIANTS,
            search_timeout_secs: constants::SEARCH_TIMEOUT_SECS,
        }
    }
}

/// Server configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address (default: 127.0.0.1)
    /// Set to 0.0.0.0 for Docker or network-accessible deployments
    pub host: String,

    /// Server port (default: 3040)
    pub port: u16,

    /// Storage path for RocksDB (default: ./smriti_data)
    pub storage_path: PathBuf,

    /// Rate limit: requests per second (default: 100)
    pub rate_limit_per_second: u64,

    /// Rate limit: burst size (default: 200)
    pub rate_limit_burst: u32,

    /// Maximum concurrent requests (default: 64)
    pub max_concurrent_requests: usize,

    /// Whether running in production mode
    pub is_production: bool,

    /// CORS configuration
    pub cors: CorsConfig,

    /// Knowledge engine tunables
    pub engine: EngineConfig,

    /// Scheduler tunables
    pub learner: LearnerConfig,

    /// Web research tunables
    pub research: ResearchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3040,
            storage_path: PathBuf::from("./smriti_data"),
            rate_limit_per_second: 100,
            rate_limit_burst: 200,
            max_concurrent_requests: 64,
            is_production: false,
            cors: CorsConfig::default(),
            engine: EngineConfig::default(),
            learner: LearnerConfig::default(),
            research: ResearchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    #[allow(clippy::field_reassign_with_default)] // Environment overrides require mutable config
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.is_production = env::var("SMRITI_ENV")
            .map(|v| {
                let v = v.to_lowercase();
                v == "production" || v == "prod"
            })
            .unwrap_or(false);

        if let Ok(val) = env::var("SMRITI_HOST") {
            config.host = val;
        }

        if let Ok(val) = env::var("SMRITI_PORT") {
            if let Ok(port) = val.parse() {
                config.port = port;
            }
        }

        if let Ok(val) = env::var("SMRITI_DATA_PATH") {
            config.storage_path = PathBuf::from(val);
        }

        if let Ok(val) = env::var("SMRITI_RATE_LIMIT") {
            if let Ok(n) = val.parse() {
                config.rate_limit_per_second = n;
            }
        }

        if let Ok(val) = env::var("SMRITI_RATE_BURST") {
            if let Ok(n) = val.parse() {
                config.rate_limit_burst = n;
            }
        }

        if let Ok(val) = env::var("SMRITI_MAX_CONCURRENT") {
            if let Ok(n) = val.parse() {
                config.max_concurrent_requests = n;
            }
        }

        // Engine tunables
        if let Ok(val) = env::var("SMRITI_SIMILARITY_THRESHOLD") {
            if let Ok(n) = val.parse::<f32>() {
                config.engine.similarity_threshold = n.clamp(0.0, 1.0);
            }
        }

        if let Ok(val) = env::var("SMRITI_UPDATE_THRESHOLD") {
            if let Ok(n) = val.parse::<usize>() {
                config.engine.update_threshold = n.max(1);
            }
        }

        if let Ok(val) = env::var("SMRITI_REBUILD_STALENESS") {
            if let Ok(n) = val.parse() {
                config.engine.rebuild_staleness_secs = n;
            }
        }

        // Scheduler tunables
        if let Ok(val) = env::var("SMRITI_LEARNING_CADENCE") {
            if let Ok(n) = val.parse() {
                config.learner.cadence_secs = n;
            }
        }

        if let Ok(val) = env::var("SMRITI_MIN_TOPIC_MENTIONS") {
            if let Ok(n) = val.parse::<u32>() {
                config.learner.min_topic_mentions = n.max(1);
            }
        }

        // Research tunables
        if let Ok(val) = env::var("SMRITI_SEARCH_TIMEOUT") {
            if let Ok(n) = val.parse() {
                config.research.search_timeout_secs = n;
            }
        }

        if let Ok(val) = env::var("SMRITI_SEARCH_MAX_RESULTS") {
            if let Ok(n) = val.parse::<usize>() {
                config.research.max_results = n.clamp(1, 10);
            }
        }

        config.cors = CorsConfig::from_env();

        config
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("📋 Configuration:");
        info!(
            "   Mode: {}",
            if self.is_production {
                "PRODUCTION"
            } else {
                "Development"
            }
        );
        info!("   Port: {}", self.port);
        info!("   Storage: {:?}", self.storage_path);
        if self.rate_limit_per_second > 0 {
            info!(
                "   Rate limit: {} req/sec (burst: {})",
                self.rate_limit_per_second, self.rate_limit_burst
            );
        } else {
            info!("   Rate limit: disabled");
        }
        info!("   Max concurrent: {}", self.max_concurrent_requests);
        info!(
            "   Similarity threshold: {:.2} (top-{})",
            self.engine.similarity_threshold, self.engine.top_k
        );
        info!(
            "   Index refresh: every {} updates or {}s",
            self.engine.update_threshold, self.engine.rebuild_staleness_secs
        );
        info!(
            "   Auto-learning: every {}s (min mentions: {})",
            self.learner.cadence_secs, self.learner.min_topic_mentions
        );
        if self.cors.is_restricted() {
            info!("   CORS origins: {:?}", self.cors.allowed_origins);
        } else {
            info!("   CORS: Permissive (all origins allowed)");
        }
    }
}

/// Environment variable documentation
#[allow(unused)] // Public API - available for CLI help output
pub fn print_env_help() {
    println!("Smriti Configuration Environment Variables:");
    println!();
    println!("  SMRITI_ENV                  - Set to 'production' or 'prod' for production mode");
    println!("  SMRITI_HOST                 - Bind address (default: 127.0.0.1)");
    println!("  SMRITI_PORT                 - Server port (default: 3040)");
    println!("  SMRITI_DATA_PATH            - Storage directory (default: ./smriti_data)");
    println!("  SMRITI_RATE_LIMIT           - Requests per second (default: 100)");
    println!("  SMRITI_RATE_BURST           - Burst size (default: 200)");
    println!("  SMRITI_MAX_CONCURRENT       - Max concurrent requests (default: 64)");
    println!("  SMRITI_SIMILARITY_THRESHOLD - Default match threshold (default: 0.7)");
    println!("  SMRITI_UPDATE_THRESHOLD     - Teaches before index refresh (default: 10)");
    println!("  SMRITI_REBUILD_STALENESS    - Max staleness seconds (default: 300)");
    println!("  SMRITI_LEARNING_CADENCE     - Scheduler pass interval seconds (default: 3600)");
    println!("  SMRITI_MIN_TOPIC_MENTIONS   - Mentions before topic research (default: 2)");
    println!("  SMRITI_SEARCH_TIMEOUT       - Search timeout seconds (default: 10)");
    println!("  SMRITI_SEARCH_MAX_RESULTS   - Results per search query (default: 3)");
    println!("  SMRITI_CORS_ORIGINS         - Comma-separated allowed origins (default: all)");
    println!();
    println!("  RUST_LOG                    - Log level (e.g., info, debug, trace)");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3040);
        assert_eq!(config.engine.update_threshold, 10);
        assert!(!config.is_production);
    }

    #[test]
    fn test_cors_default_is_permissive() {
        let cors = CorsConfig::default();
        assert!(!cors.is_restricted());
        assert!(cors.allowed_origins.is_empty());
        assert!(!cors.allowed_methods.is_empty());
    }

    #[test]
    fn test_cors_to_layer_restricted() {
        let cors = CorsConfig {
            allowed_origins: vec!["https://example.com".to_string()],
            ..Default::default()
        };
        assert!(cors.is_restricted());
        let _layer = cors.to_layer(); // Should not panic
    }
}
