//! Deterministic hash-based embedding fallback.
//!
//! A real embedding provider is out of scope (equivalent to the excluded LLM
//! provider HTTP clients); this gives nearest-neighbor case retrieval a stable,
//! dependency-free vector without a model download or network round trip.

use sha2::{Digest, Sha256};

use crate::types::DEFAULT_EMBEDDING_DIMENSION;

/// Hashes overlapping word shingles into a fixed-size vector, then L2-normalizes it.
/// Same input always produces the same vector; similar inputs sharing shingles
/// produce vectors with nonzero cosine similarity.
pub fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0f32; DEFAULT_EMBEDDING_DIMENSION];
    let normalized = text.to_lowercase();
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    if tokens.is_empty() {
        return vector;
    }

    for window in tokens.windows(2.min(tokens.len())) {
        let shingle = window.join(" ");
        let mut hasher = Sha256::new();
        hasher.update(shingle.as_bytes());
        let digest = hasher.finalize();
        for (i, byte) in digest.iter().enumerate() {
            let slot = (*byte as usize + i) % vector.len();
            let sign = if byte % 2 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    vector
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_embeds_identically() {
        assert_eq!(embed("retry the failing task with backoff"), embed("retry the failing task with backoff"));
    }

    #[test]
    fn similar_text_scores_higher_than_unrelated_text() {
        let query = embed("retry the failing task with exponential backoff");
        let similar = embed("retry a failing task with exponential backoff delay");
        let unrelated = embed("summarize quarterly revenue figures for the board");
        assert!(cosine_similarity(&query, &similar) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let v = embed("");
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
