//! End-to-end behaviour of the query pipeline over in-memory stores

mod common;

use common::{chunk, paragraph, MappedEmbedder, ScriptedGenerator};
use futures_util::StreamExt;
use ragline::config::{Config, RerankConfig, RetrievalConfig};
use ragline::generation::GenerationProvider;
use ragline::rag::{AskRequest, RagEngine, StreamEvent, INSUFFICIENT_INFORMATION};
use ragline::retrieval::{reciprocal_rank_fusion, FusionConfig, HybridSearcher};
use ragline::segment::{segment, SegmentStrategy};
use ragline::storage::{MemoryStore, VectorStore};
use ragline::RaglineError;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const QUERY: &str = "When do backups run?";

fn retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        query_expansion: false,
        ..Default::default()
    }
}

#[test]
fn test_chunking_two_paragraphs() {
    let first = paragraph("Alpha", 1000);
    let second = paragraph("Beta", 1000);
    let text = format!("{}\n\n{}", first, second);

    let chunks = segment(&text, 1800, 400, SegmentStrategy::Fixed);

    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.chars().count() <= 1800));

    // the second chunk opens with the first one's closing sentences
    let seed = chunks[1].strip_suffix(second.as_str()).unwrap().trim_end();
    assert!(!seed.is_empty());
    assert!(seed.chars().count() <= 400);
    assert!(first.ends_with(seed));
    assert!(seed.starts_with("Alpha sentence number"));
}

#[tokio::test]
async fn test_hybrid_threshold_excludes_blended_score() {
    let store = MemoryStore::new(3);
    store
        .insert(chunk("doc1.md", 0, "Backups run nightly at two.", vec![1.0, 0.0, 0.0], vec![vec![1.0, 0.0, 0.0]]))
        .unwrap();
    store
        .insert(chunk(
            "doc2.md",
            0,
            "Snapshots are copied to a second region.",
            vec![0.5, 0.0, 0.75f32.sqrt()],
            vec![vec![0.9, 0.19f32.sqrt(), 0.0]],
        ))
        .unwrap();
    store
        .insert(chunk("doc3.md", 0, "The cafeteria opens at noon.", vec![0.0, 1.0, 0.0], vec![vec![0.0, 1.0, 0.0]]))
        .unwrap();

    let embedder = MappedEmbedder::new(vec![0.0, 0.0, 1.0]).with(QUERY, vec![1.0, 0.0, 0.0]);
    let config = RetrievalConfig {
        rerank_enabled: false,
        ..retrieval_config()
    };
    let searcher = HybridSearcher::new(Arc::new(embedder), Arc::new(store), &config, &RerankConfig::default()).unwrap();

    let strict = searcher.search(QUERY, 5, 0.8).await.unwrap();
    let sources: Vec<&str> = strict.iter().map(|c| c.source_id.as_str()).collect();
    assert_eq!(sources, vec!["doc1.md"]);

    let loose = searcher.search(QUERY, 5, 0.7).await.unwrap();
    assert_eq!(loose.len(), 2);
    assert_eq!(loose[1].source_id, "doc2.md");
    assert!((loose[1].hybrid_score - 0.78).abs() < 1e-4);
    assert!((loose[1].intent_similarity - 0.9).abs() < 1e-4);
    assert!((loose[1].content_similarity - 0.5).abs() < 1e-4);
}

const WORDS: &str = "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima mike \
                     november oscar papa quebec romeo sierra tango uniform victor whiskey xray yankee";

fn near_duplicate_store() -> MemoryStore {
    let shorter = WORDS.trim_end_matches(" yankee");
    let store = MemoryStore::new(3);
    store
        .insert(chunk("manual.md", 4, WORDS, vec![1.0, 0.0, 0.0], vec![vec![1.0, 0.0, 0.0]]))
        .unwrap();
    store
        .insert(chunk(
            "manual.md",
            5,
            shorter,
            vec![0.9, 0.19f32.sqrt(), 0.0],
            vec![vec![0.9, 0.19f32.sqrt(), 0.0]],
        ))
        .unwrap();
    store
}

#[tokio::test]
async fn test_adjacent_near_duplicates_collapse() {
    let embedder = Arc::new(MappedEmbedder::new(vec![0.0, 0.0, 1.0]).with(QUERY, vec![1.0, 0.0, 0.0]));

    let searcher = HybridSearcher::new(
        embedder.clone(),
        Arc::new(near_duplicate_store()),
        &retrieval_config(),
        &RerankConfig::default(),
    )
    .unwrap();
    let results = searcher.search(QUERY, 5, 0.0).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].position, 4);

    let without_dedup = RetrievalConfig {
        dedup_enabled: false,
        ..retrieval_config()
    };
    let searcher = HybridSearcher::new(
        embedder,
        Arc::new(near_duplicate_store()),
        &without_dedup,
        &RerankConfig::default(),
    )
    .unwrap();
    assert_eq!(searcher.search(QUERY, 5, 0.0).await.unwrap().len(), 2);
}

#[test]
fn test_rank_fusion_ties() {
    let lists = vec![vec!["A", "B", "C"], vec!["B", "A", "D"]];
    let fused = reciprocal_rank_fusion(&lists, &FusionConfig::default());

    let order: Vec<&str> = fused.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec!["A", "B", "C", "D"]);
    assert_eq!(fused[0].1, fused[1].1);
    assert_eq!(fused[2].1, fused[3].1);
    assert!(fused[1].1 > fused[2].1);
}

fn engine(generator: Arc<ScriptedGenerator>) -> RagEngine {
    let mut config = Config::default();
    config.retrieval.query_expansion = false;
    config.retrieval.default_min_similarity = 0.5;

    let store = MemoryStore::new(3);
    store
        .insert(chunk(
            "ops.md",
            0,
            "Backups are written nightly to object storage.",
            vec![1.0, 0.0, 0.0],
            vec![vec![1.0, 0.0, 0.0]],
        ))
        .unwrap();
    let embedder = MappedEmbedder::new(vec![0.0, 1.0, 0.0]).with(QUERY, vec![1.0, 0.0, 0.0]);

    RagEngine::from_config(&config, Arc::new(embedder), Arc::new(store), generator).unwrap()
}

async fn collect(engine: &RagEngine, question: &str) -> Vec<StreamEvent> {
    engine.ask_stream(AskRequest::new(question)).collect().await
}

#[tokio::test]
async fn test_stream_without_candidates_is_fallback_then_done() {
    let generator = Arc::new(ScriptedGenerator::new(&["never sent"]));
    let engine = engine(generator.clone());

    let events = collect(&engine, "Who repaints the lobby?").await;

    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        StreamEvent::Chunk {
            text: INSUFFICIENT_INFORMATION.to_string()
        }
    );
    assert!(matches!(events[1], StreamEvent::Done { .. }));
    assert!(generator.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stream_sources_before_chunks() {
    let generator = Arc::new(ScriptedGenerator::new(&["Backups run ", "nightly."]));
    let engine = engine(generator.clone());

    let events = collect(&engine, QUERY).await;

    assert_eq!(events.len(), 4);
    match &events[0] {
        StreamEvent::Sources { sources } => {
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].source_id, "ops.md");
            assert_eq!(sources[0].ordinal, 1);
        }
        other => panic!("expected sources first, got {:?}", other),
    }
    assert_eq!(events[1], StreamEvent::Chunk { text: "Backups run ".into() });
    assert_eq!(events[2], StreamEvent::Chunk { text: "nightly.".into() });
    assert!(matches!(events[3], StreamEvent::Done { .. }));

    let requests = generator.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].context.starts_with("[ops.md #1]\n"));
    assert_eq!(requests[0].question, QUERY);
}

#[tokio::test]
async fn test_stream_failure_ends_with_single_error() {
    let generator = Arc::new(ScriptedGenerator::new(&["Backups "]).failing_after("connection reset"));
    let engine = engine(generator);

    let events = collect(&engine, QUERY).await;

    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], StreamEvent::Sources { .. }));
    assert_eq!(events[1], StreamEvent::Chunk { text: "Backups ".into() });
    match &events[2] {
        StreamEvent::Error { message } => assert!(message.contains("connection reset")),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_dropping_stream_releases_generator() {
    let generator = Arc::new(ScriptedGenerator::new(&["one ", "two "]).hanging());
    let engine = engine(generator.clone());

    let mut events = engine.ask_stream(AskRequest::new(QUERY));
    assert!(matches!(events.next().await, Some(StreamEvent::Sources { .. })));
    assert_eq!(events.next().await, Some(StreamEvent::Chunk { text: "one ".into() }));
    assert!(!generator.dropped.load(Ordering::SeqCst));

    drop(events);
    assert!(generator.dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_sync_ask_paths() {
    let generator = Arc::new(ScriptedGenerator::new(&["Backups are written nightly."]));
    let engine = engine(generator.clone());

    let answered = engine.ask(AskRequest::new(QUERY).with_max_answer_length(200)).await.unwrap();
    assert_eq!(answered.answer, "Backups are written nightly.");
    assert_eq!(answered.sources.len(), 1);
    assert_eq!(generator.requests.lock().unwrap()[0].max_answer_length, Some(200));

    let fallback = engine.ask(AskRequest::new("Who repaints the lobby?")).await.unwrap();
    assert_eq!(fallback.answer, INSUFFICIENT_INFORMATION);
    assert!(fallback.sources.is_empty());

    let custom = engine
        .ask(AskRequest::new(QUERY).with_system_prompt("Answer in French."))
        .await
        .unwrap();
    assert!(!custom.answer.is_empty());
    assert_eq!(
        generator.requests.lock().unwrap().last().map(|r| r.system_prompt.clone()),
        Some("Answer in French.".to_string())
    );
}

#[tokio::test]
async fn test_sync_ask_propagates_generation_failure() {
    let generator = Arc::new(ScriptedGenerator::new(&[]).failing_after("model crashed"));
    let engine = engine(generator.clone());

    let result = engine.ask(AskRequest::new(QUERY)).await;
    assert!(matches!(result, Err(RaglineError::Generation(_))));
    assert_eq!(generator.model_name(), "scripted");
}

#[tokio::test]
async fn test_search_validation() {
    let engine = engine(Arc::new(ScriptedGenerator::new(&[])));

    assert!(matches!(engine.search("", None, None).await, Err(RaglineError::Validation(_))));
    assert!(matches!(
        engine.search(QUERY, Some(0), None).await,
        Err(RaglineError::Validation(_))
    ));
    assert!(matches!(
        engine.search(QUERY, None, Some(-0.1)).await,
        Err(RaglineError::Validation(_))
    ));

    let response = engine.search(QUERY, None, None).await.unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].source_id, "ops.md");
}
