//! Text chunking with configurable size and overlap.
//!
//! Chunking is character-based rather than token-based so the stored chunks do
//! not depend on any particular tokenizer.

use panelkb_core::{AppError, AppResult};

/// Chunk window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    /// Window size in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive windows
    pub chunk_overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 200,
        }
    }
}

impl ChunkParams {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Check `chunk_size > chunk_overlap >= 0`.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 || self.chunk_size <= self.chunk_overlap {
            return Err(AppError::Config(format!(
                "chunk_size ({}) must be greater than chunk_overlap ({})",
                self.chunk_size, self.chunk_overlap
            )));
        }
        Ok(())
    }
}

/// Normalize line endings, strip trailing whitespace per line and trim the whole text.
pub fn clean_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    normalized
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Chunk text into overlapping windows.
///
/// Returns an empty vector when the cleaned text is empty. Each window holds
/// `chunk_size` characters (the last one may be shorter), consecutive windows
/// share `overlap` characters, and whitespace-only windows are dropped.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return vec![];
    }

    let chunk_size = chunk_size.max(1);

    // Byte offset of every char boundary, including the end of the string.
    let bounds: Vec<usize> = cleaned
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(cleaned.len()))
        .collect();
    let total = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(total);
        let window = cleaned[bounds[start]..bounds[end]].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }

        if end == total {
            break;
        }

        // Always move forward, even if overlap would stall the window.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    tracing::debug!(
        "Chunked {} chars into {} chunks (size: {}, overlap: {})",
        total,
        chunks.len(),
        chunk_size,
        overlap
    );

    chunks
}
