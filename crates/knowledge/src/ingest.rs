//! Ingestion of documents into a vector index.

use crate::chunker::{chunk_text, ChunkParams};
use crate::parser::load_documents;
use crate::types::{Chunk, Document};
use crate::vector_index::VectorIndex;
use panelkb_core::{AppError, AppResult};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

/// Result of the ingestion guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The index already held chunks; nothing was read.
    AlreadyPopulated { chunks: usize },

    /// Documents were loaded and stored.
    Ingested { documents: usize, chunks: usize },
}

impl IngestOutcome {
    /// Chunks in the index after the guard ran.
    pub fn total_chunks(&self) -> usize {
        match self {
            Self::AlreadyPopulated { chunks } | Self::Ingested { chunks, .. } => *chunks,
        }
    }
}

/// Split documents into chunks tagged with `{source, chunk_index}`.
pub fn chunk_documents(documents: &[Document], params: &ChunkParams) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| {
            chunk_text(&doc.text, params.chunk_size, params.chunk_overlap)
                .into_iter()
                .enumerate()
                .map(move |(i, text)| Chunk::new(text, doc.source.clone(), i as u32))
        })
        .collect()
}

/// Chunk documents and store them in one `add` call.
///
/// Returns the number of chunks stored.
pub async fn ingest(
    index: &dyn VectorIndex,
    documents: &[Document],
    params: &ChunkParams,
) -> AppResult<usize> {
    params.validate()?;

    let chunks = chunk_documents(documents, params);
    if chunks.is_empty() {
        tracing::debug!("No chunks produced from {} documents", documents.len());
        return Ok(0);
    }

    index.add(&chunks).await?;
    Ok(chunks.len())
}

/// Ingest a single text under the given source name.
pub async fn ingest_text(
    index: &dyn VectorIndex,
    text: &str,
    source: &str,
    params: &ChunkParams,
) -> AppResult<usize> {
    ingest(index, &[Document::new(text, source)], params).await
}

/// Populate the index from `knowledge_dir` unless it already holds chunks.
///
/// The guard checks only emptiness, not freshness: edits to the knowledge
/// directory are not picked up once the index is populated.
///
/// # Errors
/// * `AppError::Config` - The directory is missing or has no readable documents,
///   or the index is still empty after ingestion
pub async fn ensure_ingested(
    index: &dyn VectorIndex,
    knowledge_dir: &Path,
    params: &ChunkParams,
) -> AppResult<IngestOutcome> {
    let existing = index.count().await?;
    if existing > 0 {
        tracing::info!(
            "Knowledge base already holds {} chunks, skipping ingestion",
            existing
        );
        return Ok(IngestOutcome::AlreadyPopulated { chunks: existing });
    }

    let start = Instant::now();
    tracing::info!("Ingesting knowledge documents from {:?}", knowledge_dir);

    let documents = load_documents(knowledge_dir)?;
    let stored = ingest(index, &documents, params).await?;

    let chunks = index.count().await?;
    if chunks == 0 {
        return Err(AppError::Config(format!(
            "Knowledge base is still empty after ingesting {:?}",
            knowledge_dir
        )));
    }

    tracing::info!(
        "Ingestion completed: {} documents, {} chunks in {:.2}s",
        documents.len(),
        stored,
        start.elapsed().as_secs_f64()
    );

    Ok(IngestOutcome::Ingested {
        documents: documents.len(),
        chunks,
    })
}
