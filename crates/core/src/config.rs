//! Configuration management for panelkb.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Defaults
//! - Config file (`.panelkb/config.yaml` or `PANELKB_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! Paths that are not absolute are resolved against the workspace root.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Supported index backends.
pub const KNOWN_BACKENDS: [&str; 2] = ["flat", "lancedb"];

/// Supported embedding providers.
pub const KNOWN_PROVIDERS: [&str; 2] = ["hashed", "ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .panelkb/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Directory holding the knowledge documents to ingest
    pub knowledge_dir: Option<PathBuf>,

    /// Directory where the index is persisted
    pub persist_dir: Option<PathBuf>,

    /// Knowledge base (collection) name
    pub collection: String,

    /// Index backend: "flat" or "lancedb"
    pub backend: String,

    /// Embedding provider: "hashed" or "ollama"
    pub embedding_provider: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Embedding vector dimension
    pub embedding_dimensions: usize,

    /// Provider endpoint override (Ollama base URL)
    pub embedding_endpoint: Option<String>,

    /// Chunk window size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,

    /// Default number of chunks to retrieve
    pub top_k: usize,

    /// Score above which a chunk is labelled "Highly Relevant"
    pub relevance_high: f32,

    /// Score above which a chunk is labelled "Relevant"
    pub relevance_relevant: f32,

    /// Log level override
    pub log_level: Option<String>,

    /// Log format: "pretty" or "json"
    pub log_format: String,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    workspace: Option<WorkspaceSection>,
    knowledge: Option<KnowledgeSection>,
    embedding: Option<EmbeddingSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkspaceSection {
    path: Option<PathBuf>,
    #[serde(rename = "knowledgeDir")]
    knowledge_dir: Option<PathBuf>,
    #[serde(rename = "persistDir")]
    persist_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct KnowledgeSection {
    collection: Option<String>,
    backend: Option<String>,
    #[serde(rename = "topK")]
    top_k: Option<usize>,
    #[serde(rename = "chunkSize")]
    chunk_size: Option<usize>,
    #[serde(rename = "chunkOverlap")]
    chunk_overlap: Option<usize>,
    relevance: Option<RelevanceSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RelevanceSection {
    high: Option<f32>,
    relevant: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EmbeddingSection {
    provider: Option<String>,
    model: Option<String>,
    dimensions: Option<usize>,
    endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingSection {
    level: Option<String>,
    format: Option<String>,
    color: Option<bool>,
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name).ok().map(PathBuf::from)
}

/// Default model and dimension for an embedding provider.
pub fn provider_defaults(provider: &str) -> (&'static str, usize) {
    match provider {
        "ollama" => ("nomic-embed-text", 768),
        _ => ("hashed-bow-v1", 384),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let (model, dimensions) = provider_defaults("hashed");
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            knowledge_dir: None,
            persist_dir: None,
            collection: "solar_panel_knowledge".to_string(),
            backend: "flat".to_string(),
            embedding_provider: "hashed".to_string(),
            embedding_model: model.to_string(),
            embedding_dimensions: dimensions,
            embedding_endpoint: None,
            chunk_size: 1200,
            chunk_overlap: 200,
            top_k: 3,
            relevance_high: 0.7,
            relevance_relevant: 0.5,
            log_level: None,
            log_format: "pretty".to_string(),
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML config file and environment variables.
    ///
    /// Environment variables:
    /// - `PANELKB_WORKSPACE`: Override workspace path
    /// - `PANELKB_CONFIG`: Path to config file
    /// - `PANELKB_KNOWLEDGE_DIR`: Knowledge documents directory
    /// - `PANELKB_PERSIST_DIR`: Index persistence directory
    /// - `PANELKB_BACKEND`: Index backend
    /// - `PANELKB_EMBEDDING_PROVIDER`: Embedding provider
    /// - `PANELKB_EMBEDDING_MODEL`: Embedding model
    /// - `OLLAMA_URL`: Ollama endpoint
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`AppConfig::load`], with an explicit workspace and config file
    /// taking precedence over `PANELKB_WORKSPACE` and `PANELKB_CONFIG`.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        let workspace = workspace.or_else(|| env_path("PANELKB_WORKSPACE"));
        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }

        config.config_file = config_file.or_else(|| env_path("PANELKB_CONFIG"));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.workspace.join(".panelkb/config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env();

        Ok(config)
    }

    /// Apply environment variable overrides on top of file configuration.
    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("PANELKB_KNOWLEDGE_DIR") {
            self.knowledge_dir = Some(PathBuf::from(dir));
        }

        if let Ok(dir) = std::env::var("PANELKB_PERSIST_DIR") {
            self.persist_dir = Some(PathBuf::from(dir));
        }

        if let Ok(backend) = std::env::var("PANELKB_BACKEND") {
            self.backend = backend;
        }

        if let Ok(provider) = std::env::var("PANELKB_EMBEDDING_PROVIDER") {
            self.set_provider(provider);
        }

        if let Ok(model) = std::env::var("PANELKB_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }

        if let Ok(endpoint) = std::env::var("OLLAMA_URL") {
            self.embedding_endpoint = Some(endpoint);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> Result<Self, serde_yaml::Error> {
        let file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(ws) = file.workspace {
            if let Some(path) = ws.path {
                result.workspace = path;
            }
            if ws.knowledge_dir.is_some() {
                result.knowledge_dir = ws.knowledge_dir;
            }
            if ws.persist_dir.is_some() {
                result.persist_dir = ws.persist_dir;
            }
        }

        if let Some(embedding) = file.embedding {
            if let Some(provider) = embedding.provider {
                result.set_provider(provider);
            }
            if let Some(model) = embedding.model {
                result.embedding_model = model;
            }
            if let Some(dimensions) = embedding.dimensions {
                result.embedding_dimensions = dimensions;
            }
            if embedding.endpoint.is_some() {
                result.embedding_endpoint = embedding.endpoint;
            }
        }

        if let Some(knowledge) = file.knowledge {
            if let Some(collection) = knowledge.collection {
                result.collection = collection;
            }
            if let Some(backend) = knowledge.backend {
                result.backend = backend;
            }
            if let Some(top_k) = knowledge.top_k {
                result.top_k = top_k;
            }
            if let Some(size) = knowledge.chunk_size {
                result.chunk_size = size;
            }
            if let Some(overlap) = knowledge.chunk_overlap {
                result.chunk_overlap = overlap;
            }
            if let Some(relevance) = knowledge.relevance {
                if let Some(high) = relevance.high {
                    result.relevance_high = high;
                }
                if let Some(relevant) = relevance.relevant {
                    result.relevance_relevant = relevant;
                }
            }
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(format) = logging.format {
                result.log_format = format;
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        Ok(result)
    }

    /// Switch embedding provider, resetting model and dimension to that provider's defaults.
    fn set_provider(&mut self, provider: String) {
        if provider != self.embedding_provider {
            let (model, dimensions) = provider_defaults(&provider);
            self.embedding_model = model.to_string();
            self.embedding_dimensions = dimensions;
        }
        self.embedding_provider = provider;
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        backend: Option<String>,
        provider: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(backend) = backend {
            self.backend = backend;
        }

        if let Some(provider) = provider {
            self.set_provider(provider);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .panelkb directory.
    pub fn panelkb_dir(&self) -> PathBuf {
        self.workspace.join(".panelkb")
    }

    /// Directory holding the knowledge documents.
    pub fn knowledge_dir(&self) -> PathBuf {
        self.resolve(self.knowledge_dir.as_deref(), "knowledge_base")
    }

    /// Directory where the index is persisted.
    pub fn persist_dir(&self) -> PathBuf {
        match self.persist_dir.as_deref() {
            Some(dir) => self.resolve(Some(dir), ""),
            None => self.panelkb_dir().join("index"),
        }
    }

    fn resolve(&self, path: Option<&Path>, default: &str) -> PathBuf {
        match path {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => self.workspace.join(p),
            None => self.workspace.join(default),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_BACKENDS.contains(&self.backend.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown backend: {}. Supported: {}",
                self.backend,
                KNOWN_BACKENDS.join(", ")
            )));
        }

        if !KNOWN_PROVIDERS.contains(&self.embedding_provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding_provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.embedding_dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if self.chunk_size == 0 || self.chunk_size <= self.chunk_overlap {
            return Err(AppError::Config(format!(
                "chunk_size ({}) must be greater than chunk_overlap ({})",
                self.chunk_size, self.chunk_overlap
            )));
        }

        if self.top_k < 1 {
            return Err(AppError::Config("top_k must be at least 1".to_string()));
        }

        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(self.relevance_high)
            || !in_unit(self.relevance_relevant)
            || self.relevance_relevant > self.relevance_high
        {
            return Err(AppError::Config(format!(
                "Relevance thresholds must satisfy 0 <= relevant ({}) <= high ({}) <= 1",
                self.relevance_relevant, self.relevance_high
            )));
        }

        Ok(())
    }
}
