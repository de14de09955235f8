//! Flat vector index persisted as two files.
//!
//! Vectors live in memory and are scanned exhaustively on every search.
//! After each successful `add` the whole index is rewritten:
//!
//! * `docs.jsonl` - one `{"text", "metadata"}` record per chunk, in insertion order
//! * `vectors.bin` - a fixed header followed by `count * dim` little-endian f32 values
//!
//! Both files are written to `*.tmp` siblings and renamed into place, docs
//! first. The header carries the SHA-256 of `docs.jsonl`, so a pair of files
//! left out of step by an interrupted write is detected on load. If the
//! matching `vectors.bin.tmp` is still on disk the write is completed instead.

use crate::embeddings::{inner_product, EmbeddingProvider};
use crate::types::{Chunk, RetrievedChunk};
use crate::vector_index::{embed_checked, validate_search, VectorIndex};
use panelkb_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const VECTORS_FILE: &str = "vectors.bin";
const DOCS_FILE: &str = "docs.jsonl";

const MAGIC: &[u8; 4] = b"PKBV";
const FORMAT_VERSION: u32 = 1;

/// magic + version + dim + count + sha256(docs.jsonl)
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 32;

#[derive(Debug, Default)]
struct FlatState {
    chunks: Vec<Chunk>,
    /// Row-major, `chunks.len() * dimensions` values
    vectors: Vec<f32>,
}

/// Brute-force inner-product index over unit vectors.
pub struct FlatIndex {
    dir: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
    state: RwLock<FlatState>,
}

impl FlatIndex {
    /// Open the index stored in `dir`, creating the directory if needed.
    ///
    /// # Errors
    /// * `AppError::Config` - Stored vectors have a different dimension than the provider
    /// * `AppError::Index` - Files are unreadable, truncated or out of step
    pub fn open(dir: &Path, provider: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            AppError::Index(format!("Failed to create index directory {:?}: {}", dir, e))
        })?;

        let dimensions = provider.dimensions();
        let state = load_state(dir, dimensions)?;

        info!(
            "Opened flat index at {:?} ({} chunks, {} dims)",
            dir,
            state.chunks.len(),
            dimensions
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            provider,
            dimensions,
            state: RwLock::new(state),
        })
    }
}

#[async_trait::async_trait]
impl VectorIndex for FlatIndex {
    fn backend_name(&self) -> &str {
        "flat"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn add(&self, chunks: &[Chunk]) -> AppResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        // Held across embedding so concurrent adds cannot interleave.
        let mut state = self.state.write().await;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_checked(self.provider.as_ref(), &texts, self.dimensions).await?;

        let prev_chunks = state.chunks.len();
        let prev_values = state.vectors.len();

        state.chunks.extend_from_slice(chunks);
        for vector in &vectors {
            state.vectors.extend_from_slice(vector);
        }

        if let Err(e) = persist_state(&self.dir, self.dimensions, &state) {
            state.chunks.truncate(prev_chunks);
            state.vectors.truncate(prev_values);
            return Err(e);
        }

        debug!(
            "Added {} chunks to flat index ({} total)",
            chunks.len(),
            state.chunks.len()
        );
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<RetrievedChunk>> {
        validate_search(query, k)?;

        if self.state.read().await.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_texts = [query.to_string()];
        let mut embedded =
            embed_checked(self.provider.as_ref(), &query_texts, self.dimensions).await?;
        let query_vector = embedded.pop().unwrap_or_default();

        let state = self.state.read().await;

        let mut scored: Vec<(usize, f32)> = state
            .vectors
            .chunks_exact(self.dimensions)
            .map(|row| inner_product(&query_vector, row))
            .enumerate()
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(idx, score)| {
                RetrievedChunk::from_chunk(state.chunks[idx].clone(), score.clamp(0.0, 1.0))
            })
            .collect())
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.state.read().await.chunks.len())
    }
}

fn load_state(dir: &Path, dimensions: usize) -> AppResult<FlatState> {
    let vectors_path = dir.join(VECTORS_FILE);
    let docs_path = dir.join(DOCS_FILE);

    recover_interrupted_write(dir)?;

    match (vectors_path.exists(), docs_path.exists()) {
        (false, false) => return Ok(FlatState::default()),
        (true, true) => {}
        _ => {
            return Err(AppError::Index(format!(
                "Corrupt flat index at {:?}: expected both {} and {}",
                dir, VECTORS_FILE, DOCS_FILE
            )))
        }
    }

    let docs_bytes = fs::read(&docs_path)?;
    let vector_bytes = fs::read(&vectors_path)?;

    if vector_bytes.len() < HEADER_LEN || &vector_bytes[0..4] != MAGIC {
        return Err(AppError::Index(format!(
            "Corrupt flat index: {:?} has no valid header",
            vectors_path
        )));
    }

    let version = read_u32(&vector_bytes, 4);
    if version != FORMAT_VERSION {
        return Err(AppError::Index(format!(
            "Unsupported flat index version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let stored_dim = read_u32(&vector_bytes, 8) as usize;
    if stored_dim != dimensions {
        return Err(AppError::Config(format!(
            "Dimension mismatch: index at {:?} stores {}-dim vectors, provider produces {}",
            dir, stored_dim, dimensions
        )));
    }

    let count = usize::try_from(read_u64(&vector_bytes, 12)).map_err(|_| {
        AppError::Index(format!("Corrupt flat index: {:?} has an invalid row count", vectors_path))
    })?;
    let digest = Sha256::digest(&docs_bytes);
    if digest.as_slice() != &vector_bytes[20..HEADER_LEN] {
        return Err(AppError::Index(format!(
            "Corrupt flat index: {} does not match {}",
            DOCS_FILE, VECTORS_FILE
        )));
    }

    let body = &vector_bytes[HEADER_LEN..];
    let expected_len = count
        .checked_mul(dimensions)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| {
            AppError::Index(format!(
                "Corrupt flat index: {:?} claims {} vectors",
                vectors_path, count
            ))
        })?;
    if body.len() != expected_len {
        return Err(AppError::Index(format!(
            "Corrupt flat index: expected {} vectors, found {} bytes of vector data",
            count,
            body.len()
        )));
    }

    let vectors: Vec<f32> = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let docs_text = String::from_utf8(docs_bytes)
        .map_err(|e| AppError::Index(format!("Corrupt flat index: {} is not UTF-8: {}", DOCS_FILE, e)))?;

    let chunks = docs_text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<Chunk>(line))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Index(format!("Corrupt flat index: bad {} record: {}", DOCS_FILE, e)))?;

    if chunks.len() != count {
        return Err(AppError::Index(format!(
            "Corrupt flat index: {} has {} records, {} has {} vectors",
            DOCS_FILE,
            chunks.len(),
            VECTORS_FILE,
            count
        )));
    }

    Ok(FlatState { chunks, vectors })
}

/// Finish or discard a write cut short between the two renames.
///
/// `persist_state` renames `docs.jsonl` before `vectors.bin`. When the new
/// docs are in place but `vectors.bin.tmp` was never renamed, its header
/// digest matches `docs.jsonl` and the rename is completed. Any other
/// leftover `*.tmp` file belongs to a write that never committed and is removed.
fn recover_interrupted_write(dir: &Path) -> AppResult<()> {
    let docs_path = dir.join(DOCS_FILE);
    let vectors_path = dir.join(VECTORS_FILE);
    let vectors_tmp = temp_path(dir, VECTORS_FILE);

    if vectors_tmp.exists() && docs_path.exists() {
        let docs_digest = Sha256::digest(fs::read(&docs_path)?);
        let pending = fs::read(&vectors_tmp)?;
        let committed = if vectors_path.exists() {
            fs::read(&vectors_path)?
        } else {
            Vec::new()
        };

        let pending_matches = header_digest(&pending) == Some(docs_digest.as_slice());
        let committed_matches = header_digest(&committed) == Some(docs_digest.as_slice());

        if pending_matches && !committed_matches {
            fs::rename(&vectors_tmp, &vectors_path).map_err(|e| {
                AppError::Index(format!("Failed to complete {} update: {}", VECTORS_FILE, e))
            })?;
            warn!("Completed interrupted flat index write in {:?}", dir);
        }
    }

    for name in [DOCS_FILE, VECTORS_FILE] {
        let stale = temp_path(dir, name);
        if stale.exists() {
            fs::remove_file(&stale).map_err(|e| {
                AppError::Index(format!("Failed to remove stale {:?}: {}", stale, e))
            })?;
            debug!("Removed stale {:?}", stale);
        }
    }

    Ok(())
}

fn header_digest(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
        return None;
    }
    Some(&bytes[20..HEADER_LEN])
}

fn temp_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.tmp", name))
}

fn persist_state(dir: &Path, dimensions: usize, state: &FlatState) -> AppResult<()> {
    let mut docs = Vec::new();
    for chunk in &state.chunks {
        serde_json::to_writer(&mut docs, chunk)?;
        docs.push(b'\n');
    }

    let mut vectors = Vec::with_capacity(HEADER_LEN + state.vectors.len() * 4);
    vectors.extend_from_slice(MAGIC);
    vectors.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    vectors.extend_from_slice(&(dimensions as u32).to_le_bytes());
    vectors.extend_from_slice(&(state.chunks.len() as u64).to_le_bytes());
    vectors.extend_from_slice(&Sha256::digest(&docs));
    for value in &state.vectors {
        vectors.extend_from_slice(&value.to_le_bytes());
    }

    let docs_tmp = write_temp(dir, DOCS_FILE, &docs)?;
    let vectors_tmp = write_temp(dir, VECTORS_FILE, &vectors)?;

    fs::rename(&docs_tmp, dir.join(DOCS_FILE))
        .map_err(|e| AppError::Index(format!("Failed to replace {}: {}", DOCS_FILE, e)))?;
    fs::rename(&vectors_tmp, dir.join(VECTORS_FILE))
        .map_err(|e| AppError::Index(format!("Failed to replace {}: {}", VECTORS_FILE, e)))?;

    Ok(())
}

fn write_temp(dir: &Path, name: &str, bytes: &[u8]) -> AppResult<PathBuf> {
    let path = temp_path(dir, name);
    let mut file = File::create(&path)
        .map_err(|e| AppError::Index(format!("Failed to create {:?}: {}", path, e)))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| AppError::Index(format!("Failed to write {:?}: {}", path, e)))?;
    Ok(path)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::hashed::HashedProvider;
    use tempfile::TempDir;

    fn provider(dims: usize) -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashedProvider::new(dims))
    }

    fn sample_chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("dust and soiling reduce output, schedule cleaning", "sop_clean.txt", 0),
            Chunk::new("electrical damage requires isolation of the string", "sop_electrical.txt", 0),
            Chunk::new("bird droppings cause hot spots", "sop_clean.txt", 1),
        ]
    }

    #[tokio::test]
    async fn test_empty_index_search_returns_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();

        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.search("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_search() {
        let temp_dir = TempDir::new().unwrap();
        let index = FlatIndex::open(temp_dir.path(), provider(384)).unwrap();
        index.add(&sample_chunks()).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 3);

        let results = index.search("electrical damage isolation", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source(), "sop_electrical.txt");
        assert!(results[0].score >= results[1].score);
        for result in &results {
            assert!((0.0..=1.0).contains(&result.score));
        }
    }

    #[tokio::test]
    async fn test_k_larger_than_index() {
        let temp_dir = TempDir::new().unwrap();
        let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
        index.add(&sample_chunks()).await.unwrap();

        let results = index.search("cleaning", 10).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_equal_scores_keep_insertion_order() {
        let temp_dir = TempDir::new().unwrap();
        let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
        index
            .add(&[
                Chunk::new("same words here", "a.txt", 0),
                Chunk::new("same words here", "b.txt", 0),
                Chunk::new("same words here", "c.txt", 0),
            ])
            .await
            .unwrap();

        let results = index.search("same words here", 3).await.unwrap();
        let sources: Vec<&str> = results.iter().map(|r| r.source()).collect();
        assert_eq!(sources, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn test_invalid_search_arguments() {
        let temp_dir = TempDir::new().unwrap();
        let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
        index.add(&sample_chunks()).await.unwrap();

        assert!(matches!(index.search("dust", 0).await, Err(AppError::Query(_))));
        assert!(matches!(index.search("   ", 3).await, Err(AppError::Query(_))));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let temp_dir = TempDir::new().unwrap();

        let before = {
            let index = FlatIndex::open(temp_dir.path(), provider(128)).unwrap();
            index.add(&sample_chunks()).await.unwrap();
            index.search("bird droppings", 3).await.unwrap()
        };

        assert!(temp_dir.path().join(VECTORS_FILE).exists());
        assert!(temp_dir.path().join(DOCS_FILE).exists());
        assert!(!temp_dir.path().join("vectors.bin.tmp").exists());

        let reopened = FlatIndex::open(temp_dir.path(), provider(128)).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 3);

        let after = reopened.search("bird droppings", 3).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_incremental_adds_append() {
        let temp_dir = TempDir::new().unwrap();
        let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();

        let chunks = sample_chunks();
        index.add(&chunks[..1]).await.unwrap();
        index.add(&chunks[1..]).await.unwrap();
        index.add(&[]).await.unwrap();

        let reopened = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_on_open() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
            index.add(&sample_chunks()).await.unwrap();
        }

        let result = FlatIndex::open(temp_dir.path(), provider(128));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_out_of_step_files_detected() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
            index.add(&sample_chunks()).await.unwrap();
        }

        let docs_path = temp_dir.path().join(DOCS_FILE);
        let mut docs = fs::read_to_string(&docs_path).unwrap();
        docs.push_str("{\"text\":\"extra\",\"metadata\":{\"source\":\"x\",\"chunk_index\":0}}\n");
        fs::write(&docs_path, docs).unwrap();

        let result = FlatIndex::open(temp_dir.path(), provider(64));
        assert!(matches!(result, Err(AppError::Index(_))));
    }

    #[tokio::test]
    async fn test_missing_artifact_detected() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
            index.add(&sample_chunks()).await.unwrap();
        }

        fs::remove_file(temp_dir.path().join(VECTORS_FILE)).unwrap();

        let result = FlatIndex::open(temp_dir.path(), provider(64));
        assert!(matches!(result, Err(AppError::Index(_))));
    }

    #[tokio::test]
    async fn test_truncated_vectors_detected() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
            index.add(&sample_chunks()).await.unwrap();
        }

        let vectors_path = temp_dir.path().join(VECTORS_FILE);
        let bytes = fs::read(&vectors_path).unwrap();
        fs::write(&vectors_path, &bytes[..bytes.len() - 4]).unwrap();

        let result = FlatIndex::open(temp_dir.path(), provider(64));
        assert!(matches!(result, Err(AppError::Index(_))));
    }

    #[tokio::test]
    async fn test_interrupted_write_rolls_forward() {
        let temp_dir = TempDir::new().unwrap();
        let chunks = sample_chunks();
        let vectors_path = temp_dir.path().join(VECTORS_FILE);

        let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
        index.add(&chunks[..1]).await.unwrap();
        let old_vectors = fs::read(&vectors_path).unwrap();
        index.add(&chunks[1..]).await.unwrap();
        drop(index);

        // New docs.jsonl renamed into place, vectors.bin still the old one.
        let new_vectors = fs::read(&vectors_path).unwrap();
        fs::write(temp_dir.path().join("vectors.bin.tmp"), &new_vectors).unwrap();
        fs::write(&vectors_path, &old_vectors).unwrap();

        let reopened = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 3);
        assert!(!temp_dir.path().join("vectors.bin.tmp").exists());
        assert_eq!(fs::read(&vectors_path).unwrap(), new_vectors);

        let results = reopened.search("electrical damage isolation", 1).await.unwrap();
        assert_eq!(results[0].source(), "sop_electrical.txt");
    }

    #[tokio::test]
    async fn test_interrupted_first_write_rolls_forward() {
        let temp_dir = TempDir::new().unwrap();
        let vectors_path = temp_dir.path().join(VECTORS_FILE);
        {
            let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
            index.add(&sample_chunks()).await.unwrap();
        }

        fs::rename(&vectors_path, temp_dir.path().join("vectors.bin.tmp")).unwrap();

        let reopened = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 3);
        assert!(vectors_path.exists());
    }

    #[tokio::test]
    async fn test_uncommitted_temp_files_discarded() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
            index.add(&sample_chunks()).await.unwrap();
        }

        // Crash before either rename: temp files belong to the unfinished write.
        fs::write(temp_dir.path().join("docs.jsonl.tmp"), "partial").unwrap();
        fs::write(temp_dir.path().join("vectors.bin.tmp"), b"PKBV").unwrap();

        let reopened = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 3);
        assert!(!temp_dir.path().join("docs.jsonl.tmp").exists());
        assert!(!temp_dir.path().join("vectors.bin.tmp").exists());
    }

    #[tokio::test]
    async fn test_oversized_row_count_detected() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = FlatIndex::open(temp_dir.path(), provider(64)).unwrap();
            index.add(&sample_chunks()).await.unwrap();
        }

        let vectors_path = temp_dir.path().join(VECTORS_FILE);
        let mut bytes = fs::read(&vectors_path).unwrap();
        bytes[12..20].copy_from_slice(&(u64::MAX / 2).to_le_bytes());
        fs::write(&vectors_path, &bytes).unwrap();

        let result = FlatIndex::open(temp_dir.path(), provider(64));
        assert!(matches!(result, Err(AppError::Index(_))));
    }
}
