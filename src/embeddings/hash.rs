//! Hash-based embeddings
//!
//! Deterministic bag-of-features embedder: each word contributes signed
//! bits of its hash across the vector, plus character bigram features for
//! partial-word overlap. Identical texts always produce identical vectors
//! (cosine 1.0), texts with no shared words score near zero.
//!
//! Less semantic than a sentence transformer, but dependency-free and fast
//! enough for devices that cannot run ONNX inference.

use anyhow::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::Embedder;
use crate::constants::EMBEDDING_DIMENSION;

const WORD_WEIGHT: f32 = 0.1;
const BIGRAM_WEIGHT: f32 = 0.05;

/// Hash-based feature embedder
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIMENSION,
        }
    }

    fn hash_feature(feature: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        hasher.finish()
    }

    /// Scatter the signed bits of a feature hash across the vector
    fn scatter(vector: &mut [f32], hash: u64, bits: usize, weight: f32) {
        let dim = vector.len();
        for j in 0..bits {
            let index = (hash.rotate_left(j as u32) as usize) % dim;
            let sign = if (hash >> (j % 64)) & 1 == 1 { 1.0 } else { -1.0 };
            vector[index] += sign * weight;
        }
    }

    fn normalize(vector: &mut [f32]) {
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in vector {
                *val /= norm;
            }
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let start = std::time::Instant::now();
        let mut embedding = vec![0.0; self.dimension];

        let lowered = text.to_lowercase();

        for word in lowered.split_whitespace() {
            let hash = Self::hash_feature(word);
            Self::scatter(&mut embedding, hash, 64, WORD_WEIGHT);
        }

        // Character bigrams catch overlap between inflected forms
        let chars: Vec<char> = lowered.chars().collect();
        for pair in chars.windows(2) {
            let bigram: String = pair.iter().collect();
            let hash = Self::hash_feature(&bigram);
            Self::scatter(&mut embedding, hash, 32, BIGRAM_WEIGHT);
        }

        Self::normalize(&mut embedding);

        crate::metrics::EMBEDDING_GENERATE_DURATION
            .with_label_values(&["hash"])
            .observe(start.elapsed().as_secs_f64());
        crate::metrics::EMBEDDING_GENERATE_TOTAL
            .with_label_values(&["hash", "success"])
            .inc();

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[test]
    fn test_dimension_and_normalization() {
        let embedder = HashEmbedder::new();
        let embedding = embedder.encode("Hello world").unwrap();

        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "Embedding should be normalized");
    }

    #[test]
    fn test_deterministic_self_similarity() {
        let embedder = HashEmbedder::new();
        let a = embedder.encode("What is 2+2?").unwrap();
        let b = embedder.encode("What is 2+2?").unwrap();

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_case_insensitive() {
        let embedder = HashEmbedder::new();
        let a = embedder.encode("Hello World").unwrap();
        let b = embedder.encode("hello world").unwrap();

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unrelated_texts_score_low() {
        let embedder = HashEmbedder::new();
        let a = embedder.encode("What is 2+2?").unwrap();
        let b = embedder.encode("zygote umbra fjord kelp").unwrap();

        assert!(cosine_similarity(&a, &b) < 0.5);
    }

    #[test]
    fn test_empty_text() {
        let embedder = HashEmbedder::new();
        let embedding = embedder.encode("").unwrap();
        assert_eq!(embedding.len(), 384);
        assert!(embedding.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_batch_encoding() {
        let embedder = HashEmbedder::new();
        let embeddings = embedder.encode_batch(&["Hello", "World", "Test"]).unwrap();

        assert_eq!(embeddings.len(), 3);
        for emb in embeddings {
            assert_eq!(emb.len(), 384);
        }
    }
}
