//! Embedding generation for semantic retrieval
//!
//! The hash embedder is always available and fully deterministic; the
//! ONNX MiniLM backend (feature `onnx`) produces real sentence embeddings
//! and falls back to hashing when model files are missing.

pub mod hash;
#[cfg(feature = "onnx")]
pub mod minilm;

use anyhow::Result;

pub use hash::HashEmbedder;
#[cfg(feature = "onnx")]
pub use minilm::{EmbeddingConfig, MiniLmEmbedder};

/// Trait for embedding generation
pub trait Embedder: Send + Sync {
    /// Generate embedding for text
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Batch encode multiple texts (default: sequential)
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}
