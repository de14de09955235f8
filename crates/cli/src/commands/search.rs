//! Search command handler.

use anyhow::Result;
use clap::Args;
use panelkb_core::config::AppConfig;

/// Raw similarity search over the knowledge base
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of chunks to retrieve (default: configured top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> Result<()> {
        tracing::info!("Executing search command");

        let kb = super::open_populated(config).await?;
        let k = self.top_k.unwrap_or(config.top_k);
        let results = kb.search(&self.query, k).await?;

        tracing::debug!("Search returned {} chunks", results.len());

        if self.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
            return Ok(());
        }

        if results.is_empty() {
            println!("No results.");
            return Ok(());
        }

        for (i, chunk) in results.iter().enumerate() {
            println!(
                "{}. [{:.4}] {}#{}",
                i + 1,
                chunk.score,
                chunk.source(),
                chunk.metadata.chunk_index
            );
            println!("   {}", super::preview(&chunk.text, 100));
        }

        Ok(())
    }
}
