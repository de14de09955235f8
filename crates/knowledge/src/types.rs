//! Knowledge system type definitions.

use serde::{Deserialize, Serialize};

/// A raw source document handed to ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Full document text
    pub text: String,

    /// Source identifier (the file name for on-disk documents)
    pub source: String,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Provenance of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source document identifier
    pub source: String,

    /// Position of the chunk within its source (0-indexed)
    pub chunk_index: u32,
}

/// A bounded slice of a source document, the unit of storage and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text content
    pub text: String,

    /// Source and position
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>, chunk_index: u32) -> Self {
        Self {
            text: text.into(),
            metadata: ChunkMetadata {
                source: source.into(),
                chunk_index,
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.metadata.source
    }
}

/// A chunk returned by a similarity search.
///
/// Lives for one request and is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Text content, unchanged from ingestion
    pub text: String,

    /// Relevance score in [0, 1], higher is more relevant
    pub score: f32,

    /// Source and position
    pub metadata: ChunkMetadata,
}

impl RetrievedChunk {
    pub fn from_chunk(chunk: Chunk, score: f32) -> Self {
        Self {
            text: chunk.text,
            score,
            metadata: chunk.metadata,
        }
    }

    pub fn source(&self) -> &str {
        &self.metadata.source
    }
}

/// Statistics for a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Collection name
    pub collection: String,

    /// Backend name ("flat" or "lancedb")
    pub backend: String,

    /// Number of stored chunks
    pub chunks: usize,

    /// Embedding vector dimension
    pub dimensions: usize,

    /// Embedding provider name
    pub provider: String,

    /// Embedding model name
    pub model: String,
}
