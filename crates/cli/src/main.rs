//! panelkb CLI
//!
//! Main entry point for the panelkb command-line tool.
//! Builds a solar panel defect knowledge base once and serves retrieval
//! context for classifier verdicts.

mod commands;

use clap::{Parser, Subcommand};
use commands::{IngestCommand, RetrieveCommand, SearchCommand, StatsCommand};
use panelkb_core::{
    config::AppConfig,
    logging::{self, LogFormat},
};
use std::path::PathBuf;
use tracing::Instrument;

/// panelkb - retrieval context for solar panel defect verdicts
#[derive(Parser, Debug)]
#[command(name = "panelkb")]
#[command(about = "Knowledge retrieval for solar panel defect verdicts", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "PANELKB_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "PANELKB_CONFIG")]
    config: Option<PathBuf>,

    /// Index backend (flat, lancedb)
    #[arg(short, long, global = true, env = "PANELKB_BACKEND")]
    backend: Option<String>,

    /// Embedding provider (hashed, ollama)
    #[arg(short, long, global = true, env = "PANELKB_EMBEDDING_PROVIDER")]
    provider: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the knowledge base from the knowledge directory
    Ingest(IngestCommand),

    /// Retrieve context for a classifier verdict
    Retrieve(RetrieveCommand),

    /// Raw similarity search
    Search(SearchCommand),

    /// Show knowledge base statistics
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Workspace and config file decide which YAML is read
    let config = AppConfig::load_from(cli.workspace, cli.config)?;

    // Apply CLI overrides
    let config = config.with_overrides(
        None,
        None,
        cli.backend,
        cli.provider,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    let log_format = LogFormat::parse(&config.log_format)?;
    logging::init_logging(config.log_level.as_deref(), log_format, config.no_color)?;

    config.validate()?;

    tracing::info!("panelkb starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Backend: {}", config.backend);
    tracing::debug!(
        "Embedding: {} / {} ({} dims)",
        config.embedding_provider,
        config.embedding_model,
        config.embedding_dimensions
    );

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Retrieve(_) => "retrieve",
        Commands::Search(_) => "search",
        Commands::Stats(_) => "stats",
    };

    // Route to command handlers
    let result = async {
        match cli.command {
            Commands::Ingest(cmd) => cmd.execute(&config).await,
            Commands::Retrieve(cmd) => cmd.execute(&config).await,
            Commands::Search(cmd) => cmd.execute(&config).await,
            Commands::Stats(cmd) => cmd.execute(&config).await,
        }
    }
    .instrument(tracing::info_span!("command", name = command_name))
    .await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {:#}", e),
    }

    result
}
