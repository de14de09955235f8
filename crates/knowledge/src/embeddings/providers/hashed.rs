//! Hashed bag-of-tokens embedding provider.

use crate::embeddings::l2_normalize;
use crate::embeddings::provider::EmbeddingProvider;
use panelkb_core::AppResult;

/// Seed of the polynomial token hash.
const HASH_SEED: u64 = 7;

/// Multiplier of the polynomial token hash.
const HASH_BASE: u64 = 31;

/// Deterministic embedding provider for local, offline operation.
///
/// Text is lower-cased and split into tokens made of ASCII letters, digits,
/// `_`, `-` and `/`. Every token adds 1.0 to the bucket picked by a fixed
/// polynomial hash of its bytes, and the resulting vector is L2-normalized.
/// There is no randomness and no process state, so vectors are identical
/// across runs and machines.
#[derive(Debug)]
pub struct HashedProvider {
    dimensions: usize,
}

impl HashedProvider {
    /// Create a new hashed provider with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];
        if self.dimensions == 0 {
            return embedding;
        }

        for token in tokenize(text) {
            let bucket = (token_hash(&token) % self.dimensions as u64) as usize;
            embedding[bucket] += 1.0;
        }

        l2_normalize(&mut embedding);
        embedding
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '/')
}

/// Split text into lower-case tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !is_token_char(c))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Stable polynomial hash over the UTF-8 bytes of a token.
pub fn token_hash(token: &str) -> u64 {
    token.bytes().fold(HASH_SEED, |acc, b| {
        acc.wrapping_mul(HASH_BASE).wrapping_add(b as u64)
    })
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashedProvider {
    fn provider_name(&self) -> &str {
        "hashed"
    }

    fn model_name(&self) -> &str {
        "hashed-bow-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
