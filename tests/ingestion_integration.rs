//! Ingestion into the SQLite store and retrieval from it

mod common;

use common::{HashEmbedder, ScriptedGenerator};
use ragline::config::{ChunkingConfig, RerankConfig, RetrievalConfig};
use ragline::embedding::{Ingestor, SourceDocument};
use ragline::retrieval::HybridSearcher;
use ragline::segment::{RowDocument, Segmenter};
use ragline::storage::{SqliteVectorStore, VectorStore};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 64;

const BACKUPS: &str = "Backups are written nightly to object storage. Each backup is encrypted \
                       before upload and verified after the copy completes.\n\nSnapshots are \
                       retained for thirty days and replicated to a second region for recovery.";

const DEPLOYS: &str = "Deployments roll out through three canary stages. Each stage waits for \
                       healthy metrics before promotion, and a failed check triggers rollback.";

fn retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        query_expansion: false,
        ..Default::default()
    }
}

fn open(path: &std::path::Path) -> Arc<SqliteVectorStore> {
    Arc::new(SqliteVectorStore::open(path, DIM, "hash-bow", &retrieval_config()).unwrap())
}

#[tokio::test]
async fn test_ingest_search_and_reopen() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("ragline.db");
    let embedder = Arc::new(HashEmbedder::new(DIM));

    let stored = {
        let store = open(&db_path);
        let ingestor = Ingestor::new(Segmenter::new(&ChunkingConfig::default()), embedder.clone(), store.clone());

        let report = ingestor
            .ingest_documents(&[
                SourceDocument::new("backups.md", BACKUPS),
                SourceDocument::new("deploys.md", DEPLOYS),
            ])
            .await;

        assert_eq!(report.sources, 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.chunks, store.len().unwrap());
        report.chunks
    };

    // vectors and the index survive a reopen
    let store = open(&db_path);
    assert_eq!(store.len().unwrap(), stored);

    let searcher = HybridSearcher::new(embedder, store.clone(), &retrieval_config(), &RerankConfig::default()).unwrap();
    let results = searcher.search("nightly backups object storage", 3, 0.0).await.unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].source_id, "backups.md");
    assert_eq!(results[0].metadata["strategy"], "fixed");
    assert_eq!(results[0].metadata["kind"], "prose");
    assert_eq!(results[0].metadata["content_hash"].as_str().map(str::len), Some(64));
}

#[tokio::test]
async fn test_failed_source_does_not_stop_batch() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("ragline.db"));
    let embedder = Arc::new(HashEmbedder::new(DIM).with_poison("poison"));
    let ingestor = Ingestor::new(Segmenter::new(&ChunkingConfig::default()), embedder, store.clone());

    let report = ingestor
        .ingest_documents(&[
            SourceDocument::new("backups.md", BACKUPS),
            SourceDocument::new("bad.md", "This document contains poison and cannot be embedded at all."),
            SourceDocument::new("deploys.md", DEPLOYS),
        ])
        .await;

    assert_eq!(report.sources, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "bad.md");
    assert!(report.failed[0].1.contains("bad.md"));
    assert!(store.get_by_range("bad.md", 0..=10).unwrap().is_empty());
    assert!(!store.get_by_range("deploys.md", 0..=10).unwrap().is_empty());
}

#[tokio::test]
async fn test_generated_intents_are_stored() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("ragline.db"));
    let generator = Arc::new(ScriptedGenerator::new(&["What runs nightly?\nWhere are backups stored?"]));
    let ingestor = Ingestor::new(
        Segmenter::new(&ChunkingConfig::default()),
        Arc::new(HashEmbedder::new(DIM)),
        store.clone(),
    )
    .with_generator(generator, 2);

    let report = ingestor.ingest_documents(&[SourceDocument::new("backups.md", BACKUPS)]).await;
    assert_eq!(report.chunks, 1);

    let chunks = store.get_by_range("backups.md", 0..=0).unwrap();
    assert_eq!(chunks[0].intent_vectors.len(), 2);
    assert_eq!(chunks[0].metadata["intents"][1], "Where are backups stored?");
}

#[tokio::test]
async fn test_row_question_becomes_intent() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("ragline.db"));
    let ingestor = Ingestor::new(
        Segmenter::new(&ChunkingConfig::default()),
        Arc::new(HashEmbedder::new(DIM)),
        store.clone(),
    );

    let value = json!({
        "id": "faq-7",
        "q": "How often are encryption keys rotated?",
        "answer": "Encryption keys are rotated every ninety days from the security console.",
    });
    let row = RowDocument::from_json("faq.jsonl", 6, &value, Some("id"), Some("q")).unwrap();

    let report = ingestor.ingest_rows(&[row]).await;
    assert_eq!(report.sources, 1);

    let chunks = store.get_by_range("faq-7", 0..=0).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].intent_vectors.len(), 1);
    assert_eq!(chunks[0].metadata["row"], 6);
    assert_eq!(chunks[0].metadata["columns"], json!(["answer"]));
    assert!(!chunks[0].text.contains("How often"));
}

#[tokio::test]
async fn test_clear_empties_store() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("ragline.db"));
    let ingestor = Ingestor::new(
        Segmenter::new(&ChunkingConfig::default()),
        Arc::new(HashEmbedder::new(DIM)),
        store.clone(),
    );
    ingestor.ingest_documents(&[SourceDocument::new("deploys.md", DEPLOYS)]).await;
    assert!(!store.is_empty().unwrap());

    store.clear().unwrap();
    assert!(store.is_empty().unwrap());
    assert!(store.knn(&vec![1.0; DIM], 5).unwrap().is_empty());
}
