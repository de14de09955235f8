//! Ingestion guard and startup failure modes.

use super::*;
use crate::embeddings::providers::hashed::HashedProvider;
use crate::{EmbeddingConfig, IngestOutcome};
use panelkb_core::AppError;
use std::sync::Arc;

#[tokio::test]
async fn test_guard_is_idempotent() {
    for backend in BACKENDS {
        let temp = TempDir::new().unwrap();
        write_knowledge_dir(temp.path(), &[SOP_CLEAN, SOP_ELECTRICAL]);
        let kb = KnowledgeBase::open(options(&temp, backend)).await.unwrap();

        let first = kb.ensure_ingested().await.unwrap();
        let second = kb.ensure_ingested().await.unwrap();

        assert_eq!(first, IngestOutcome::Ingested { documents: 2, chunks: 2 });
        assert_eq!(second, IngestOutcome::AlreadyPopulated { chunks: 2 });
        assert_eq!(kb.stats().await.unwrap().chunks, 2);
    }
}

#[tokio::test]
async fn test_guard_skips_after_restart() {
    for backend in BACKENDS {
        let temp = TempDir::new().unwrap();
        drop(sop_knowledge_base(&temp, backend).await);

        let kb = KnowledgeBase::open(options(&temp, backend)).await.unwrap();
        let outcome = kb.ensure_ingested().await.unwrap();
        assert_eq!(outcome, IngestOutcome::AlreadyPopulated { chunks: 2 });
    }
}

#[tokio::test]
async fn test_missing_knowledge_dir_is_fatal() {
    let temp = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(options(&temp, IndexBackend::Flat)).await.unwrap();

    let err = kb.ensure_ingested().await.unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_unreadable_documents_are_fatal() {
    let temp = TempDir::new().unwrap();
    let dir = write_knowledge_dir(temp.path(), &[]);
    fs::write(dir.join("broken.txt"), [0xc3, 0x28]).unwrap();

    let kb = KnowledgeBase::open(options(&temp, IndexBackend::Flat)).await.unwrap();
    let err = kb.ensure_ingested().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(kb.stats().await.unwrap().chunks, 0);
}

#[tokio::test]
async fn test_one_bad_document_is_skipped() {
    let temp = TempDir::new().unwrap();
    let dir = write_knowledge_dir(temp.path(), &[SOP_ELECTRICAL]);
    fs::write(dir.join("broken.txt"), [0xc3, 0x28]).unwrap();

    let kb = KnowledgeBase::open(options(&temp, IndexBackend::Flat)).await.unwrap();
    let outcome = kb.ensure_ingested().await.unwrap();
    assert_eq!(outcome, IngestOutcome::Ingested { documents: 1, chunks: 1 });
}

#[tokio::test]
async fn test_dimension_change_is_fatal_on_open() {
    for backend in BACKENDS {
        let temp = TempDir::new().unwrap();
        drop(sop_knowledge_base(&temp, backend).await);

        let mut changed = options(&temp, backend);
        changed.embedding = EmbeddingConfig {
            dimensions: 128,
            ..EmbeddingConfig::default()
        };

        let err = match KnowledgeBase::open(changed).await {
            Ok(_) => panic!("opened knowledge base with a different dimension"),
            Err(e) => e,
        };
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.is_fatal());
    }
}

#[tokio::test]
async fn test_injected_provider_checked_against_manifest() {
    let temp = TempDir::new().unwrap();
    write_knowledge_dir(temp.path(), &[SOP_CLEAN]);

    let kb = KnowledgeBase::with_provider(
        options(&temp, IndexBackend::Flat),
        Arc::new(HashedProvider::new(32)),
    )
    .await
    .unwrap();
    kb.ensure_ingested().await.unwrap();
    assert_eq!(kb.manifest().embedding.dimensions, 32);
    drop(kb);

    let result = KnowledgeBase::with_provider(
        options(&temp, IndexBackend::Flat),
        Arc::new(HashedProvider::new(64)),
    )
    .await;
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[tokio::test]
async fn test_backend_switch_is_rejected() {
    let temp = TempDir::new().unwrap();
    drop(sop_knowledge_base(&temp, IndexBackend::Flat).await);

    let result = KnowledgeBase::open(options(&temp, IndexBackend::LanceDb)).await;
    assert!(matches!(result, Err(AppError::Config(_))));
}
