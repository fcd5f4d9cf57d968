//! Smriti Library
//!
//! Teachable knowledge-base assistant: store Q/A pairs, answer queries by
//! rule matching or nearest-neighbor retrieval over local embeddings, and
//! optionally keep itself current with scheduled web research.
//!
//! # Key Features
//! - Deterministic rules checked before any semantic matching
//! - Incremental embedding index with debounced refresh
//! - Local embeddings (hash-based, or MiniLM-L6 via ONNX with `onnx`)
//! - Auto-learning scheduler with conversation-driven topic discovery
//! - RocksDB embedded storage (no external database)

pub mod config;
pub mod constants;
pub mod embeddings;
pub mod engine;
pub mod errors;
pub mod index;
pub mod metrics;
pub mod middleware;
pub mod research;
pub mod scheduler;
pub mod similarity;
pub mod store;
pub mod topics;
pub mod tracing_setup;
pub mod validation;

// Re-export dependencies to ensure tests use the same version
pub use chrono;
pub use parking_lot;
pub use uuid;
