//! Embedding providers for knowledge bases.
//!
//! Two interchangeable strategies sit behind [`EmbeddingProvider`]: a learned
//! semantic model served by Ollama, and a deterministic hashed bag-of-tokens
//! fallback that needs no external model.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};

/// Scale a vector to unit L2 norm in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Inner product of two equal-length vectors.
///
/// For unit vectors this is their cosine similarity.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
