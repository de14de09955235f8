//! Vector index abstraction for knowledge chunks.
//!
//! Defines a backend-agnostic trait for chunk storage and similarity search,
//! and the factory that picks a backend at construction time.

use crate::embeddings::EmbeddingProvider;
use crate::flat_index::FlatIndex;
use crate::lancedb_index::LanceDbIndex;
use crate::types::{Chunk, RetrievedChunk};
use panelkb_core::{AppError, AppResult};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Trait for vector index backends.
///
/// Both backends embed text themselves through the same provider, so stored
/// vectors and query vectors always come from one model. `search` may run
/// concurrently from many tasks; `add` is serialized by the backend.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend identifier ("flat" or "lancedb").
    fn backend_name(&self) -> &str;

    /// Dimension of the stored vectors.
    fn dimensions(&self) -> usize;

    /// Embed and append chunks. An empty slice is a no-op.
    async fn add(&self, chunks: &[Chunk]) -> AppResult<()>;

    /// Return at most `k` chunks ordered by descending score.
    ///
    /// Returns an empty vector when the index holds no chunks. Equal scores
    /// are ordered by insertion.
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<RetrievedChunk>>;

    /// Number of stored chunks.
    async fn count(&self) -> AppResult<usize>;
}

/// Available index backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    /// In-memory vectors with brute-force search, persisted as two files
    Flat,
    /// LanceDB table doing its own vector search
    LanceDb,
}

impl IndexBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::LanceDb => "lancedb",
        }
    }
}

impl fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "lancedb" => Ok(Self::LanceDb),
            other => Err(AppError::Config(format!(
                "Unknown index backend: '{}'. Supported: flat, lancedb",
                other
            ))),
        }
    }
}

/// Open (or create) the index for a collection.
///
/// `dir` is the persist directory. The flat backend keeps its files in
/// `<dir>/<collection>/`; LanceDB keeps one database at `<dir>/lancedb` with a
/// table per collection.
pub async fn open_index(
    backend: IndexBackend,
    dir: &Path,
    collection: &str,
    provider: Arc<dyn EmbeddingProvider>,
) -> AppResult<Arc<dyn VectorIndex>> {
    if provider.dimensions() == 0 {
        return Err(AppError::Config(
            "Embedding dimensions must be greater than zero".to_string(),
        ));
    }

    let index: Arc<dyn VectorIndex> = match backend {
        IndexBackend::Flat => Arc::new(FlatIndex::open(&dir.join(collection), provider)?),
        IndexBackend::LanceDb => {
            Arc::new(LanceDbIndex::open(&dir.join("lancedb"), collection, provider).await?)
        }
    };
    Ok(index)
}

/// Reject invalid search arguments before touching the index.
pub fn validate_search(query: &str, k: usize) -> AppResult<()> {
    if k < 1 {
        return Err(AppError::Query(format!("k must be at least 1, got {}", k)));
    }
    if query.trim().is_empty() {
        return Err(AppError::Query("Query string is empty".to_string()));
    }
    Ok(())
}

/// Convert a backend distance (smaller is closer) into a [0, 1] score.
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Embed texts and check the provider honoured the index dimension.
pub(crate) async fn embed_checked(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    dimensions: usize,
) -> AppResult<Vec<Vec<f32>>> {
    let vectors = provider.embed_batch(texts).await?;

    if vectors.len() != texts.len() {
        return Err(AppError::Embedding(format!(
            "Provider returned {} embeddings for {} texts",
            vectors.len(),
            texts.len()
        )));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(AppError::Config(format!(
            "Embedding dimension mismatch: index expects {}, provider produced {}",
            dimensions,
            bad.len()
        )));
    }

    Ok(vectors)
}
