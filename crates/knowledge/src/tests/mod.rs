//! Cross-module scenarios run against both index backends.

mod guard;
mod retrieval;

use crate::{IndexBackend, KnowledgeBase, KnowledgeBaseOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub(crate) const BACKENDS: [IndexBackend; 2] = [IndexBackend::Flat, IndexBackend::LanceDb];

pub(crate) const SOP_CLEAN: (&str, &str) = ("sop_clean.txt", "Clean panels require no action.");
pub(crate) const SOP_ELECTRICAL: (&str, &str) =
    ("sop_electrical.txt", "Electrical damage requires isolation.");

/// Write `files` into `<root>/knowledge` and return that directory.
pub(crate) fn write_knowledge_dir(root: &Path, files: &[(&str, &str)]) -> PathBuf {
    let dir = root.join("knowledge");
    fs::create_dir_all(&dir).unwrap();
    for (name, text) in files {
        fs::write(dir.join(name), text).unwrap();
    }
    dir
}

pub(crate) fn options(temp: &TempDir, backend: IndexBackend) -> KnowledgeBaseOptions {
    KnowledgeBaseOptions {
        backend,
        ..KnowledgeBaseOptions::new(temp.path().join("index"), temp.path().join("knowledge"))
    }
}

/// Knowledge base over the two SOP documents, already ingested.
pub(crate) async fn sop_knowledge_base(temp: &TempDir, backend: IndexBackend) -> KnowledgeBase {
    write_knowledge_dir(temp.path(), &[SOP_CLEAN, SOP_ELECTRICAL]);
    let kb = KnowledgeBase::open(options(temp, backend)).await.unwrap();
    kb.ensure_ingested().await.unwrap();
    kb
}
