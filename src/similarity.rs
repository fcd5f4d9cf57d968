//! Cosine similarity and top-k selection for semantic retrieval

use ordered_float::OrderedFloat;

/// Compute cosine similarity between two vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score a query against candidate vectors and return the top-k
/// `(index, similarity)` pairs, best first.
///
/// The sort is stable, so equal scores keep candidate order. Callers that
/// want newest-wins tie-breaking should order candidates newest first.
pub fn top_k_indices(query: &[f32], candidates: &[Vec<f32>], k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(OrderedFloat<f32>, usize)> = candidates
        .iter()
        .enumerate()
        .map(|(i, vec)| (OrderedFloat(cosine_similarity(query, vec)), i))
        .collect();

    // Stable sort, score descending
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(k)
        .map(|(score, i)| (i, score.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);

        let a = vec![1.0, 1.0];
        let b = vec![1.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_top_k_order_and_truncation() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];

        let top = top_k_indices(&query, &candidates, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, 1);
        assert!((top[0].1 - 1.0).abs() < 0.001);
        assert_eq!(top[1].0, 2);
    }

    #[test]
    fn test_top_k_ties_keep_candidate_order() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![0.0, 1.0]];

        let top = top_k_indices(&query, &candidates, 3);
        // Both unit-direction matches score 1.0; the earlier candidate wins.
        assert_eq!(top[0].0, 0);
        assert_eq!(top[1].0, 1);
    }
}
