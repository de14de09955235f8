//! Ingest command handler.

use anyhow::Result;
use clap::Args;
use panelkb_core::config::AppConfig;
use panelkb_knowledge::IngestOutcome;
use std::path::PathBuf;

/// Build the knowledge base from the knowledge directory (skipped if already populated)
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Directory of knowledge documents (default: configured knowledge directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> Result<()> {
        tracing::info!("Executing ingest command");

        let kb = super::open_knowledge_base(config, self.dir.clone()).await?;
        let outcome = kb.ensure_ingested().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            return Ok(());
        }

        match outcome {
            IngestOutcome::AlreadyPopulated { chunks } => {
                println!(
                    "Knowledge base '{}' already holds {} chunks; nothing ingested",
                    kb.options().collection,
                    chunks
                );
            }
            IngestOutcome::Ingested { documents, chunks } => {
                println!(
                    "Ingested {} documents ({} chunks) into '{}'",
                    documents,
                    chunks,
                    kb.options().collection
                );
            }
        }

        Ok(())
    }
}
