//! Deterministic local embeddings for semantic recall.
//!
//! Feature-hashing keeps recall fully offline and reproducible: each token
//! is hashed into a fixed-dimension vector with a hash-derived sign, then
//! the vector is L2-normalized so cosine similarity is a plain dot product.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Dimension of hashed embedding vectors.
pub const EMBEDDING_DIM: usize = 256;

/// Produces an embedding vector for a piece of text.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Feature-hashing embedder. Deterministic across runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; EMBEDDING_DIM];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let digest = hasher.finish();
            let index = (digest % EMBEDDING_DIM as u64) as usize;
            let sign = if digest & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        l2_normalize(vector)
    }
}

/// Lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// L2-normalize a vector. Returns the normalized copy; zero stays zero.
pub fn l2_normalize(vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vec.into_iter().map(|v| v / norm).collect()
    } else {
        vec
    }
}

/// Cosine similarity between two L2-normalized vectors (= dot product).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
