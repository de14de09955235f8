//! Embedding configuration types.

use panelkb_core::{AppConfig, AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Embedding configuration for a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Provider name: "hashed" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Endpoint override for network providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashed".to_string(),
            model: "hashed-bow-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

impl EmbeddingConfig {
    /// Build from the application configuration.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            provider: config.embedding_provider.clone(),
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
            endpoint: config.embedding_endpoint.clone(),
        }
    }

    /// Validate that another config can read and write the same index.
    ///
    /// The endpoint is deployment detail and may differ.
    pub fn validate_consistency(&self, other: &Self) -> AppResult<()> {
        if self.dimensions != other.dimensions {
            return Err(AppError::Config(format!(
                "Dimension mismatch: knowledge base uses {}, provider produces {}",
                self.dimensions, other.dimensions
            )));
        }

        if self.provider != other.provider {
            return Err(AppError::Config(format!(
                "Provider mismatch: knowledge base uses '{}', got '{}'",
                self.provider, other.provider
            )));
        }

        if self.model != other.model {
            return Err(AppError::Config(format!(
                "Model mismatch: knowledge base uses '{}', got '{}'",
                self.model, other.model
            )));
        }

        Ok(())
    }
}
