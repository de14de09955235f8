//! Knowledge base manifest management.
//!
//! Every persist directory holds one knowledge base, described by
//! `<persist_dir>/manifest.yaml`. The manifest pins the collection name,
//! backend and embedding model so a later run cannot silently read the
//! index with incompatible vectors.

use crate::embeddings::EmbeddingConfig;
use crate::vector_index::IndexBackend;
use chrono::{DateTime, Utc};
use panelkb_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "manifest.yaml";

/// Persisted description of a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBaseManifest {
    /// Collection name
    pub name: String,

    /// Index backend ("flat" or "lancedb")
    pub backend: String,

    /// Embedding model the stored vectors were produced with
    pub embedding: EmbeddingConfig,

    /// When the knowledge base was first created
    pub created_at: DateTime<Utc>,
}

impl KnowledgeBaseManifest {
    pub fn new(name: &str, backend: IndexBackend, embedding: &EmbeddingConfig) -> Self {
        Self {
            name: name.to_string(),
            backend: backend.as_str().to_string(),
            embedding: EmbeddingConfig {
                endpoint: None,
                ..embedding.clone()
            },
            created_at: Utc::now(),
        }
    }

    /// Check that the active settings can use this knowledge base.
    pub fn validate(
        &self,
        name: &str,
        backend: IndexBackend,
        embedding: &EmbeddingConfig,
    ) -> AppResult<()> {
        if self.name != name {
            return Err(AppError::Config(format!(
                "Persist directory holds collection '{}', not '{}'",
                self.name, name
            )));
        }

        if self.backend != backend.as_str() {
            return Err(AppError::Config(format!(
                "Backend mismatch: knowledge base '{}' uses '{}', configured '{}'",
                self.name, self.backend, backend
            )));
        }

        self.embedding.validate_consistency(embedding)
    }
}

/// Reject collection names that cannot double as a directory and table name.
pub fn validate_collection_name(name: &str) -> AppResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if !valid {
        return Err(AppError::Config(format!(
            "Invalid collection name '{}': use ASCII letters, digits, '_' or '-'",
            name
        )));
    }
    Ok(())
}

/// Get the manifest path for a persist directory.
pub fn get_manifest_path(persist_dir: &Path) -> PathBuf {
    persist_dir.join(MANIFEST_FILE)
}

/// Load the manifest, if the knowledge base has been created.
pub fn load_manifest(persist_dir: &Path) -> AppResult<Option<KnowledgeBaseManifest>> {
    let path = get_manifest_path(persist_dir);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        AppError::Config(format!("Failed to read manifest at {:?}: {}", path, e))
    })?;

    let manifest = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Config(format!("Failed to parse manifest at {:?}: {}", path, e))
    })?;

    Ok(Some(manifest))
}

/// Save the manifest, creating the persist directory if needed.
pub fn save_manifest(persist_dir: &Path, manifest: &KnowledgeBaseManifest) -> AppResult<()> {
    fs::create_dir_all(persist_dir).map_err(|e| {
        AppError::Config(format!("Failed to create persist directory {:?}: {}", persist_dir, e))
    })?;

    let path = get_manifest_path(persist_dir);
    let yaml = serde_yaml::to_string(manifest)?;

    fs::write(&path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write manifest to {:?}: {}", path, e))
    })?;

    tracing::debug!("Saved manifest for knowledge base '{}'", manifest.name);
    Ok(())
}

/// Load and validate the manifest, or write a fresh one.
pub fn open_manifest(
    persist_dir: &Path,
    name: &str,
    backend: IndexBackend,
    embedding: &EmbeddingConfig,
) -> AppResult<KnowledgeBaseManifest> {
    validate_collection_name(name)?;

    match load_manifest(persist_dir)? {
        Some(manifest) => {
            manifest.validate(name, backend, embedding)?;
            tracing::debug!("Loaded manifest for knowledge base '{}'", name);
            Ok(manifest)
        }
        None => {
            let manifest = KnowledgeBaseManifest::new(name, backend, embedding);
            save_manifest(persist_dir, &manifest)?;
            tracing::info!(
                "Created knowledge base '{}' ({} backend, {} / {})",
                name,
                backend,
                embedding.provider,
                embedding.model
            );
            Ok(manifest)
        }
    }
}
