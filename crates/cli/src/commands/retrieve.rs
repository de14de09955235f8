//! Retrieve command handler.
//!
//! Reads a classifier verdict as JSON and prints the formatted context.

use anyhow::{Context, Result};
use clap::Args;
use panelkb_core::config::AppConfig;
use panelkb_knowledge::Verdict;
use std::io::Read;
use std::path::Path;

/// Retrieve knowledge context for a classifier verdict
#[derive(Args, Debug)]
pub struct RetrieveCommand {
    /// Verdict JSON file, or "-" to read from stdin
    pub verdict: String,

    /// Number of chunks to retrieve (default: configured top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Print the generated query before the context
    #[arg(long)]
    pub show_query: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RetrieveCommand {
    pub async fn execute(&self, config: &AppConfig) -> Result<()> {
        tracing::info!("Executing retrieve command");

        let raw = self.read_verdict().await?;
        let verdict = Verdict::from_json(&raw)?;

        let kb = super::open_populated(config).await?;
        let k = self.top_k.unwrap_or(config.top_k);
        let retrieval = kb.retrieve(&verdict, k).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&retrieval)?);
            return Ok(());
        }

        if self.show_query {
            println!("Query:\n{}\n", retrieval.query);
        }
        println!("{}", retrieval.context);

        Ok(())
    }

    async fn read_verdict(&self) -> Result<String> {
        if self.verdict == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read verdict from stdin")?;
            return Ok(buf);
        }

        let path = Path::new(&self.verdict);
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read verdict file {:?}", path))
    }
}
