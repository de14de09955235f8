//! Stats command handler.

use anyhow::Result;
use clap::Args;
use panelkb_core::config::AppConfig;

/// Show knowledge base statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> Result<()> {
        tracing::info!("Executing stats command");

        let kb = super::open_knowledge_base(config, None).await?;
        let stats = kb.stats().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        println!("Collection: {}", stats.collection);
        println!("Backend:    {}", stats.backend);
        println!("Chunks:     {}", stats.chunks);
        println!("Embedding:  {} / {} ({} dims)", stats.provider, stats.model, stats.dimensions);
        println!("Created:    {}", kb.manifest().created_at.to_rfc3339());

        Ok(())
    }
}
