//! LanceDB-backed vector index implementation.

use crate::embeddings::EmbeddingProvider;
use crate::types::{Chunk, ChunkMetadata, RetrievedChunk};
use crate::vector_index::{distance_to_score, embed_checked, validate_search, VectorIndex};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;
use panelkb_core::{AppError, AppResult};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const VECTOR_COLUMN: &str = "vector";
const DISTANCE_COLUMN: &str = "_distance";

/// LanceDB-backed vector index for knowledge chunks.
///
/// One table per collection. Rows carry a monotonically increasing `seq`
/// so equal-distance hits can be returned in insertion order.
pub struct LanceDbIndex {
    table: Table,
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
    /// Next `seq` value; the lock also serializes writers.
    writer: Mutex<u64>,
}

impl LanceDbIndex {
    /// Create or open a LanceDB table for `collection` under `db_path`.
    ///
    /// # Errors
    /// * `AppError::Config` - The existing table stores vectors of another dimension
    /// * `AppError::Index` - LanceDB could not be opened
    pub async fn open(
        db_path: &Path,
        collection: &str,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        std::fs::create_dir_all(db_path).map_err(|e| {
            AppError::Index(format!("Failed to create index directory: {}", e))
        })?;

        let dimensions = provider.dimensions();

        let uri = db_path.to_string_lossy().to_string();
        let conn = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| AppError::Index(format!("Failed to connect to LanceDB: {}", e)))?;

        let table_names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::Index(format!("Failed to list tables: {}", e)))?;

        let table = if table_names.iter().any(|name| name == collection) {
            let table = conn
                .open_table(collection)
                .execute()
                .await
                .map_err(|e| AppError::Index(format!("Failed to open table: {}", e)))?;
            Self::check_dimensions(&table, dimensions).await?;
            table
        } else {
            let schema = Self::create_schema(dimensions);
            let empty_batch = RecordBatch::new_empty(schema.clone());

            conn.create_table(
                collection,
                RecordBatchIterator::new(vec![Ok(empty_batch)], schema),
            )
            .execute()
            .await
            .map_err(|e| AppError::Index(format!("Failed to create table: {}", e)))?
        };

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| AppError::Index(format!("Failed to count rows: {}", e)))?;

        info!(
            "Opened LanceDB table '{}' at {:?} ({} chunks, {} dims)",
            collection, db_path, rows, dimensions
        );

        Ok(Self {
            table,
            provider,
            dimensions,
            writer: Mutex::new(rows as u64),
        })
    }

    fn create_schema(dimensions: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("seq", DataType::UInt64, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                VECTOR_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimensions as i32,
                ),
                false,
            ),
        ]))
    }

    async fn check_dimensions(table: &Table, dimensions: usize) -> AppResult<()> {
        let schema = table
            .schema()
            .await
            .map_err(|e| AppError::Index(format!("Failed to read table schema: {}", e)))?;

        let stored = match schema.field_with_name(VECTOR_COLUMN).map(|f| f.data_type()) {
            Ok(DataType::FixedSizeList(_, size)) => *size as usize,
            _ => {
                return Err(AppError::Index(format!(
                    "Table '{}' has no '{}' column",
                    table.name(),
                    VECTOR_COLUMN
                )))
            }
        };

        if stored != dimensions {
            return Err(AppError::Config(format!(
                "Dimension mismatch: table '{}' stores {}-dim vectors, provider produces {}",
                table.name(),
                stored,
                dimensions
            )));
        }
        Ok(())
    }

    fn chunks_to_batch(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        first_seq: u64,
    ) -> AppResult<RecordBatch> {
        let schema = Self::create_schema(self.dimensions);

        let ids: Vec<String> = chunks
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();
        let seqs: Vec<u64> = (first_seq..first_seq + chunks.len() as u64).collect();
        let sources: Vec<&str> = chunks.iter().map(|c| c.source()).collect();
        let positions: Vec<u32> = chunks.iter().map(|c| c.metadata.chunk_index).collect();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();

        let values: Vec<f32> = vectors.iter().flatten().copied().collect();
        let vector_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimensions as i32,
            Arc::new(Float32Array::from(values)),
            None,
        )
        .map_err(|e| AppError::Index(format!("Failed to build vector column: {}", e)))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(UInt64Array::from(seqs)),
                Arc::new(StringArray::from(sources)),
                Arc::new(UInt32Array::from(positions)),
                Arc::new(StringArray::from(texts)),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| AppError::Index(format!("Failed to create RecordBatch: {}", e)))
    }

    /// Extract `(seq, distance, chunk)` rows from a search result batch.
    fn batch_to_hits(batch: &RecordBatch) -> AppResult<Vec<(u64, f32, Chunk)>> {
        let seqs = column::<UInt64Array>(batch, "seq")?;
        let sources = column::<StringArray>(batch, "source")?;
        let positions = column::<UInt32Array>(batch, "chunk_index")?;
        let texts = column::<StringArray>(batch, "text")?;
        let distances = column::<Float32Array>(batch, DISTANCE_COLUMN)?;

        Ok((0..batch.num_rows())
            .map(|row| {
                let chunk = Chunk {
                    text: texts.value(row).to_string(),
                    metadata: ChunkMetadata {
                        source: sources.value(row).to_string(),
                        chunk_index: positions.value(row),
                    },
                };
                (seqs.value(row), distances.value(row), chunk)
            })
            .collect())
    }

    /// The `limit` rows closest to `vector`, as `(seq, distance, chunk)`.
    async fn nearest(&self, vector: &[f32], limit: usize) -> AppResult<Vec<(u64, f32, Chunk)>> {
        let batches = self
            .table
            .query()
            .nearest_to(vector.to_vec())
            .map_err(|e| AppError::Index(format!("Failed to create query: {}", e)))?
            .limit(limit)
            .execute()
            .await
            .map_err(|e| AppError::Index(format!("Failed to execute search: {}", e)))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| AppError::Index(format!("Failed to collect results: {}", e)))?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(Self::batch_to_hits(batch)?);
        }
        Ok(hits)
    }
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<T>())
        .ok_or_else(|| AppError::Index(format!("Invalid '{}' column in search results", name)))
}

#[async_trait::async_trait]
impl VectorIndex for LanceDbIndex {
    fn backend_name(&self) -> &str {
        "lancedb"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn add(&self, chunks: &[Chunk]) -> AppResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut next_seq = self.writer.lock().await;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_checked(self.provider.as_ref(), &texts, self.dimensions).await?;

        let batch = self.chunks_to_batch(chunks, &vectors, *next_seq)?;
        let schema = batch.schema();

        self.table
            .add(RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await
            .map_err(|e| AppError::Index(format!("Failed to add chunks batch: {}", e)))?;

        *next_seq += chunks.len() as u64;

        debug!("Inserted {} chunks into LanceDB", chunks.len());
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<RetrievedChunk>> {
        validate_search(query, k)?;

        let total = self.count().await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let query_texts = [query.to_string()];
        let mut embedded =
            embed_checked(self.provider.as_ref(), &query_texts, self.dimensions).await?;
        let query_vector = embedded.pop().unwrap_or_default();

        // Lance picks arbitrarily among rows tied at the cut-off, so widen the
        // fetch until every row tied with the k-th hit has been seen.
        let mut limit = (k + 1).min(total);
        let hits = loop {
            let mut hits = self.nearest(&query_vector, limit).await?;
            hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

            let settled = limit >= total
                || hits.len() < limit
                || hits.len() <= k
                || hits[k - 1].1 < hits[hits.len() - 1].1;
            if settled {
                hits.truncate(k);
                break hits;
            }

            debug!("Tie at top-{} boundary, widening fetch beyond {}", k, limit);
            limit = limit.saturating_mul(2).min(total);
        };

        debug!("Retrieved {} chunks (requested top-{})", hits.len(), k);

        Ok(hits
            .into_iter()
            .map(|(_, distance, chunk)| {
                RetrievedChunk::from_chunk(chunk, distance_to_score(distance))
            })
            .collect())
    }

    async fn count(&self) -> AppResult<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| AppError::Index(format!("Failed to count rows: {}", e)))
    }
}
