//! Verdict to context, end to end.

use super::*;
use crate::{Verdict, NO_KNOWLEDGE_SENTINEL};

#[tokio::test]
async fn test_electrical_verdict_ranks_electrical_sop_first() {
    for backend in BACKENDS {
        let temp = TempDir::new().unwrap();
        let kb = sop_knowledge_base(&temp, backend).await;

        let verdict = Verdict::from_json(
            r#"{
                "label": "Electrical-damage",
                "confidence": 0.92,
                "top_k_predictions": [{"label": "Electrical-damage", "score": 0.92}]
            }"#,
        )
        .unwrap();

        let retrieval = kb.retrieve(&verdict, 2).await.unwrap();

        assert_eq!(retrieval.chunks.len(), 2, "backend {}", backend);
        assert_eq!(retrieval.chunks[0].source(), "sop_electrical.txt", "backend {}", backend);
        assert_eq!(retrieval.chunks[1].source(), "sop_clean.txt", "backend {}", backend);
        assert!(retrieval.chunks[0].score > retrieval.chunks[1].score);
        assert!(retrieval.context.contains("sop_electrical.txt"));
        assert!(retrieval.query.starts_with("solar panel defect knowledge\n"));
    }
}

#[tokio::test]
async fn test_retrieve_for_fault_matches_full_verdict() {
    let temp = TempDir::new().unwrap();
    let kb = sop_knowledge_base(&temp, IndexBackend::Flat).await;

    let by_fault = kb.retrieve_for_fault("Electrical-damage", 0.92, 3).await.unwrap();
    let by_verdict = kb
        .retrieve(&Verdict::from_label("Electrical-damage", 0.92), 3)
        .await
        .unwrap();

    assert_eq!(by_fault.query, by_verdict.query);
    assert_eq!(by_fault.context, by_verdict.context);
}

#[tokio::test]
async fn test_round_trip_single_document() {
    for backend in BACKENDS {
        let temp = TempDir::new().unwrap();
        let kb = KnowledgeBase::open(options(&temp, backend)).await.unwrap();
        crate::ingest::ingest_text(kb.index().as_ref(), "A B C", "x", &Default::default())
            .await
            .unwrap();

        let results = kb.search("A B C", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source(), "x");
        assert_eq!(results[0].text, "A B C");
    }
}

#[tokio::test]
async fn test_scores_descend() {
    for backend in BACKENDS {
        let temp = TempDir::new().unwrap();
        write_knowledge_dir(
            temp.path(),
            &[
                ("a.txt", "Bird droppings cause hot spots on cells."),
                ("b.txt", "Snow cover blocks irradiance until it melts."),
                ("c.txt", "Cracked glass lets moisture reach the cells."),
                ("d.txt", "Dust accumulation reduces yield; schedule cleaning."),
            ],
        );
        let kb = KnowledgeBase::open(options(&temp, backend)).await.unwrap();
        kb.ensure_ingested().await.unwrap();

        let results = kb.search("hot spots on cracked cells", 4).await.unwrap();
        assert_eq!(results.len(), 4);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score, "backend {}", backend);
        }
        for result in &results {
            assert!((0.0..=1.0).contains(&result.score));
        }
    }
}

#[tokio::test]
async fn test_empty_index_formats_sentinel() {
    let temp = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(options(&temp, IndexBackend::Flat)).await.unwrap();

    let retrieval = kb.retrieve_for_fault("Dusty", 0.4, 3).await.unwrap();
    assert!(retrieval.chunks.is_empty());
    assert_eq!(retrieval.context, NO_KNOWLEDGE_SENTINEL);
}

#[tokio::test]
async fn test_retrieval_survives_restart() {
    for backend in BACKENDS {
        let temp = TempDir::new().unwrap();
        let before = {
            let kb = sop_knowledge_base(&temp, backend).await;
            kb.retrieve_for_fault("Electrical-damage", 0.92, 2).await.unwrap()
        };

        let kb = KnowledgeBase::open(options(&temp, backend)).await.unwrap();
        let after = kb.retrieve_for_fault("Electrical-damage", 0.92, 2).await.unwrap();

        assert_eq!(before.query, after.query);
        assert_eq!(before.context, after.context);
    }
}

#[tokio::test]
async fn test_invalid_query_arguments() {
    let temp = TempDir::new().unwrap();
    let kb = sop_knowledge_base(&temp, IndexBackend::Flat).await;

    assert!(matches!(
        kb.search("isolation", 0).await,
        Err(panelkb_core::AppError::Query(_))
    ));
    assert!(matches!(
        kb.retrieve(&Verdict::from_label("", 0.5), 3).await,
        Err(panelkb_core::AppError::Query(_))
    ));
}

#[tokio::test]
async fn test_stats_reflect_backend_and_provider() {
    for backend in BACKENDS {
        let temp = TempDir::new().unwrap();
        let kb = sop_knowledge_base(&temp, backend).await;

        let stats = kb.stats().await.unwrap();
        assert_eq!(stats.collection, "solar_panel_knowledge");
        assert_eq!(stats.backend, backend.as_str());
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.dimensions, 384);
        assert_eq!(stats.provider, "hashed");
        assert_eq!(stats.model, "hashed-bow-v1");
    }
}
