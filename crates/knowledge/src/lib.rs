//! Knowledge retrieval engine for solar panel defect verdicts.
//!
//! Documents are chunked, embedded and stored in a vector index once; each
//! classifier verdict is then turned into a query whose nearest chunks are
//! rendered as an annotated context block for a downstream generator.
//!
//! The [`KnowledgeBase`] handle owns the provider and index for one
//! collection and is shared by reference between concurrent requests.

pub mod chunker;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod flat_index;
pub mod ingest;
pub mod lancedb_index;
pub mod parser;
pub mod query;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use chunker::ChunkParams;
pub use context::{format_context, RelevanceBands, NO_KNOWLEDGE_SENTINEL};
pub use embeddings::{EmbeddingConfig, EmbeddingProvider};
pub use ingest::IngestOutcome;
pub use query::{build_query, Prediction, QueryTemplate, Verdict};
pub use types::{Chunk, ChunkMetadata, Document, IndexStats, RetrievedChunk};
pub use vector_index::{IndexBackend, VectorIndex};

use config::KnowledgeBaseManifest;
use panelkb_core::{AppConfig, AppResult};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything needed to open a knowledge base.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseOptions {
    /// Collection name
    pub collection: String,

    /// Directory holding the manifest and index files
    pub persist_dir: PathBuf,

    /// Directory of source documents read by the ingestion guard
    pub knowledge_dir: PathBuf,

    pub backend: IndexBackend,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkParams,
    pub relevance: RelevanceBands,
    pub query_template: QueryTemplate,
}

impl KnowledgeBaseOptions {
    /// Options with default collection, backend and embedding settings.
    pub fn new(persist_dir: impl Into<PathBuf>, knowledge_dir: impl Into<PathBuf>) -> Self {
        Self {
            collection: "solar_panel_knowledge".to_string(),
            persist_dir: persist_dir.into(),
            knowledge_dir: knowledge_dir.into(),
            backend: IndexBackend::Flat,
            embedding: EmbeddingConfig::default(),
            chunking: ChunkParams::default(),
            relevance: RelevanceBands::default(),
            query_template: QueryTemplate::default(),
        }
    }

    /// Build options from the application configuration.
    pub fn from_app_config(config: &AppConfig) -> AppResult<Self> {
        let chunking = ChunkParams::new(config.chunk_size, config.chunk_overlap);
        chunking.validate()?;

        Ok(Self {
            collection: config.collection.clone(),
            persist_dir: config.persist_dir(),
            knowledge_dir: config.knowledge_dir(),
            backend: config.backend.parse()?,
            embedding: EmbeddingConfig::from_app_config(config),
            chunking,
            relevance: RelevanceBands::new(config.relevance_high, config.relevance_relevant)?,
            query_template: QueryTemplate::default(),
        })
    }
}

/// Query and formatted context for one verdict.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    /// The query string sent to the index
    pub query: String,

    /// Retrieved chunks, best first
    pub chunks: Vec<RetrievedChunk>,

    /// Rendered context block
    pub context: String,
}

/// Handle to an opened knowledge base.
pub struct KnowledgeBase {
    options: KnowledgeBaseOptions,
    manifest: KnowledgeBaseManifest,
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    /// Makes the check-then-ingest guard atomic within the process.
    ingest_lock: Mutex<()>,
}

impl KnowledgeBase {
    /// Open (or create) the knowledge base described by `options`.
    ///
    /// # Errors
    /// * `AppError::Config` - The manifest or stored vectors disagree with the
    ///   configured backend or embedding model
    /// * `AppError::Embedding` - The embedding provider is unavailable
    pub async fn open(options: KnowledgeBaseOptions) -> AppResult<Self> {
        let provider = embeddings::create_provider(&options.embedding).await?;
        Self::with_provider(options, provider).await
    }

    /// Open with an explicit embedding provider.
    ///
    /// The provider's own name, model and dimension are what the manifest is
    /// checked against; `options.embedding` is not consulted.
    pub async fn with_provider(
        options: KnowledgeBaseOptions,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        let embedding = EmbeddingConfig {
            provider: provider.provider_name().to_string(),
            model: provider.model_name().to_string(),
            dimensions: provider.dimensions(),
            endpoint: None,
        };

        let manifest = config::open_manifest(
            &options.persist_dir,
            &options.collection,
            options.backend,
            &embedding,
        )?;

        let index = vector_index::open_index(
            options.backend,
            &options.persist_dir,
            &options.collection,
            provider.clone(),
        )
        .await?;

        Ok(Self {
            options,
            manifest,
            provider,
            index,
            ingest_lock: Mutex::new(()),
        })
    }

    /// Ingest the knowledge directory unless the index already holds chunks.
    pub async fn ensure_ingested(&self) -> AppResult<IngestOutcome> {
        let _guard = self.ingest_lock.lock().await;
        ingest::ensure_ingested(
            self.index.as_ref(),
            &self.options.knowledge_dir,
            &self.options.chunking,
        )
        .await
    }

    /// Raw similarity search.
    pub async fn search(&self, query: &str, k: usize) -> AppResult<Vec<RetrievedChunk>> {
        self.index.search(query, k).await
    }

    /// Build a query from the verdict, search, and render the context.
    pub async fn retrieve(&self, verdict: &Verdict, k: usize) -> AppResult<Retrieval> {
        verdict.validate()?;

        let query = self.options.query_template.build(verdict);
        let chunks = self.index.search(&query, k).await?;
        let context = format_context(&chunks, &self.options.relevance);

        tracing::debug!(
            label = %verdict.label,
            retrieved = chunks.len(),
            "Retrieved context for verdict"
        );

        Ok(Retrieval {
            query,
            chunks,
            context,
        })
    }

    /// Retrieve for a bare fault label and confidence.
    pub async fn retrieve_for_fault(
        &self,
        fault: &str,
        confidence: f64,
        k: usize,
    ) -> AppResult<Retrieval> {
        self.retrieve(&Verdict::from_label(fault, confidence), k).await
    }

    pub async fn stats(&self) -> AppResult<IndexStats> {
        Ok(IndexStats {
            collection: self.manifest.name.clone(),
            backend: self.index.backend_name().to_string(),
            chunks: self.index.count().await?,
            dimensions: self.index.dimensions(),
            provider: self.provider.provider_name().to_string(),
            model: self.provider.model_name().to_string(),
        })
    }

    /// Shared handle to the underlying index.
    pub fn index(&self) -> Arc<dyn VectorIndex> {
        self.index.clone()
    }

    pub fn options(&self) -> &KnowledgeBaseOptions {
        &self.options
    }

    pub fn manifest(&self) -> &KnowledgeBaseManifest {
        &self.manifest
    }
}
