//! Command handlers for the panelkb CLI.
//!
//! Every command opens the knowledge base itself; `retrieve` and `search`
//! run the ingestion guard first so nothing is served from an empty index.

pub mod ingest;
pub mod retrieve;
pub mod search;
pub mod stats;

// Re-export command types for convenience
pub use ingest::IngestCommand;
pub use retrieve::RetrieveCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;

use panelkb_core::{config::AppConfig, AppResult};
use panelkb_knowledge::{KnowledgeBase, KnowledgeBaseOptions};
use std::path::PathBuf;

/// Open the configured knowledge base, optionally reading documents from `knowledge_dir`.
pub(crate) async fn open_knowledge_base(
    config: &AppConfig,
    knowledge_dir: Option<PathBuf>,
) -> AppResult<KnowledgeBase> {
    let mut options = KnowledgeBaseOptions::from_app_config(config)?;
    if let Some(dir) = knowledge_dir {
        options.knowledge_dir = dir;
    }

    tracing::debug!(
        "Opening knowledge base '{}' ({} backend) at {:?}",
        options.collection,
        options.backend,
        options.persist_dir
    );

    KnowledgeBase::open(options).await
}

/// Open the knowledge base and make sure it holds chunks.
pub(crate) async fn open_populated(config: &AppConfig) -> AppResult<KnowledgeBase> {
    let kb = open_knowledge_base(config, None).await?;
    kb.ensure_ingested().await?;
    Ok(kb)
}

/// First line of a chunk, shortened for terminal output.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max_chars {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview() {
        assert_eq!(preview("short line\nsecond", 20), "short line");
        assert_eq!(preview("abcdefghij", 4), "abcd...");
        assert_eq!(preview("", 4), "");
    }
}
