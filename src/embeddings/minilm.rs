//! MiniLM-L6-v2 embedding model using ONNX Runtime
//!
//! Generates 384-dimensional sentence embeddings optimized for semantic
//! similarity. Model: sentence-transformers/all-MiniLM-L6-v2.
//!
//! Edge behavior:
//! - Lazy model loading: the model is only loaded on the first encode call
//! - Falls back to hash-based embeddings when model files are missing or
//!   inference fails, so retrieval keeps working in degraded mode
//!
//! Configuration via environment variables:
//! - SMRITI_MODEL_PATH: Base path to model files (default: ./models/minilm-l6)
//! - SMRITI_ONNX_THREADS: Number of ONNX threads (default: 2)

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokenizers::Tokenizer;

use super::{Embedder, HashEmbedder};
use crate::constants::EMBEDDING_DIMENSION;

/// Lazily initialized ONNX session and tokenizer
struct LazyModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl LazyModel {
    fn new(config: &EmbeddingConfig) -> Result<Self> {
        let num_threads = std::env::var("SMRITI_ONNX_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);

        tracing::info!(
            "Loading MiniLM-L6-v2 model from {:?} with {} threads",
            config.model_path,
            num_threads
        );

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .with_intra_threads(num_threads)
            .context("Failed to set intra threads")?
            .commit_from_file(&config.model_path)
            .context("Failed to load ONNX model")?;

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {e}"))?;

        tracing::info!("MiniLM-L6-v2 model loaded successfully");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }
}

/// Configuration for the MiniLM embedder
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,

    /// Path to tokenizer file
    pub tokenizer_path: PathBuf,

    /// Maximum sequence length (MiniLM default: 256)
    pub max_length: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl EmbeddingConfig {
    /// Create configuration from environment variables with sensible defaults
    ///
    /// Search order for model files:
    /// 1. SMRITI_MODEL_PATH environment variable
    /// 2. ./models/minilm-l6 (local)
    /// 3. ~/.local/share/smriti/models/minilm-l6
    pub fn from_env() -> Self {
        let base_path = std::env::var("SMRITI_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let candidates = [
                    PathBuf::from("./models/minilm-l6"),
                    dirs::data_dir()
                        .map(|p| p.join("smriti/models/minilm-l6"))
                        .unwrap_or_default(),
                ];

                candidates
                    .into_iter()
                    .find(|p| p.join("model.onnx").exists())
                    .unwrap_or_else(|| PathBuf::from("./models/minilm-l6"))
            });

        Self {
            model_path: base_path.join("model.onnx"),
            tokenizer_path: base_path.join("tokenizer.json"),
            max_length: 256,
        }
    }

    /// Create configuration with explicit paths (for testing or programmatic use)
    pub fn with_paths(model_path: PathBuf, tokenizer_path: PathBuf) -> Self {
        Self {
            model_path,
            tokenizer_path,
            max_length: 256,
        }
    }
}

/// MiniLM-L6-v2 embedder with ONNX Runtime
///
/// The model is only loaded on the first encode() call, keeping startup
/// under 100ms and idle RAM low until the index actually needs vectors.
pub struct MiniLmEmbedder {
    config: EmbeddingConfig,
    /// Lazily initialized model (OnceLock for thread-safe init)
    lazy_model: OnceLock<std::result::Result<Arc<LazyModel>, String>>,
    /// Fallback when ONNX is unavailable or fails
    fallback: HashEmbedder,
    /// True when model files were missing at construction
    degraded: bool,
    dimension: usize,
}

impl MiniLmEmbedder {
    /// Create a new MiniLM embedder with lazy loading
    ///
    /// If the model or tokenizer files are missing, the embedder starts in
    /// degraded mode and serves hash-based embeddings instead of failing.
    pub fn new(config: EmbeddingConfig) -> Self {
        let model_available = config.model_path.exists() && config.tokenizer_path.exists();

        if !model_available {
            tracing::warn!(
                "MiniLM model files not found. Using hash-based embeddings; semantic search will be limited."
            );
            tracing::warn!("    Model: {:?}", config.model_path);
            tracing::warn!("    Tokenizer: {:?}", config.tokenizer_path);
        } else {
            tracing::info!("Lazy loading enabled - model will load on first encode()");
        }

        Self {
            config,
            lazy_model: OnceLock::new(),
            fallback: HashEmbedder::new(),
            degraded: !model_available,
            dimension: EMBEDDING_DIMENSION,
        }
    }

    /// Ensure the model is loaded (thread-safe, idempotent)
    fn ensure_model_loaded(&self) -> Result<&Arc<LazyModel>> {
        let result = self.lazy_model.get_or_init(|| {
            LazyModel::new(&self.config)
                .map(Arc::new)
                .map_err(|e| e.to_string())
        });

        match result {
            Ok(model) => Ok(model),
            Err(e) => Err(anyhow::anyhow!("Failed to load model: {e}")),
        }
    }

    /// Check if model is currently loaded (for diagnostics)
    pub fn is_model_loaded(&self) -> bool {
        self.lazy_model.get().is_some()
    }

    /// Generate embedding using ONNX Runtime
    fn generate_embedding_onnx(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.ensure_model_loaded()?;

        let mut session = model.session.lock();

        let encoding = model
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {e}"))?;

        let tokens = encoding.get_ids();
        let attention_mask = encoding.get_attention_mask();
        let max_length = self.config.max_length;

        // Truncate or pad to max_length
        let mut input_ids = vec![0i64; max_length];
        let mut attention = vec![0i64; max_length];
        let token_type_ids = vec![0i64; max_length];

        for (i, &token) in tokens.iter().take(max_length).enumerate() {
            input_ids[i] = token as i64;
        }
        for (i, &mask) in attention_mask.iter().take(max_length).enumerate() {
            attention[i] = mask as i64;
        }

        let input_ids_value = Value::from_array((vec![1, max_length], input_ids))?;
        let attention_mask_value = Value::from_array((vec![1, max_length], attention.clone()))?;
        let token_type_ids_value = Value::from_array((vec![1, max_length], token_type_ids))?;

        let outputs = session.run(ort::inputs![
            "input_ids" => &input_ids_value,
            "attention_mask" => &attention_mask_value,
            "token_type_ids" => &token_type_ids_value,
        ])?;

        let output_tensor = outputs[0].try_extract_tensor::<f32>()?;
        let (_shape, output_data) = output_tensor;

        // Mean pooling over sequence dimension
        let mut pooled = vec![0.0; self.dimension];
        let mut mask_sum = 0.0;

        for (seq_idx, &att) in attention.iter().enumerate() {
            if att == 1 {
                for (dim_idx, pooled_val) in pooled.iter_mut().enumerate() {
                    let idx = seq_idx * self.dimension + dim_idx;
                    *pooled_val += output_data[idx];
                }
                mask_sum += 1.0;
            }
        }

        if mask_sum > 0.0 {
            for val in &mut pooled {
                *val /= mask_sum;
            }
        }

        // L2 normalize
        let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut pooled {
                *val /= norm;
            }
        }

        Ok(pooled)
    }
}

impl Embedder for MiniLmEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        if self.degraded {
            return self.fallback.encode(text);
        }

        let start = std::time::Instant::now();
        match self.generate_embedding_onnx(text) {
            Ok(embedding) => {
                crate::metrics::EMBEDDING_GENERATE_DURATION
                    .with_label_values(&["onnx"])
                    .observe(start.elapsed().as_secs_f64());
                crate::metrics::EMBEDDING_GENERATE_TOTAL
                    .with_label_values(&["onnx", "success"])
                    .inc();
                Ok(embedding)
            }
            Err(e) => {
                crate::metrics::EMBEDDING_GENERATE_TOTAL
                    .with_label_values(&["onnx", "failure"])
                    .inc();
                tracing::warn!("ONNX inference failed: {}. Falling back to hash embeddings.", e);
                self.fallback.encode(text)
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_degrades_to_hash() {
        let config = EmbeddingConfig::with_paths(
            PathBuf::from("nonexistent/model.onnx"),
            PathBuf::from("nonexistent/tokenizer.json"),
        );
        let embedder = MiniLmEmbedder::new(config);

        assert!(!embedder.is_model_loaded());
        let embedding = embedder.encode("Hello world").unwrap();
        assert_eq!(embedding.len(), 384);

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
