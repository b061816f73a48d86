/// Batch ingestion: segment, generate intents, embed, store
use super::provider::check_batch;
use super::EmbeddingProvider;
use crate::error::{RaglineError, Result};
use crate::generation::{hypothetical_questions, GenerationProvider};
use crate::segment::{RowDocument, Segment, Segmenter};
use crate::storage::{NewChunk, VectorStore};
use crate::vector::normalize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Plain-text document to ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_id: String,
    pub text: String,
}

impl SourceDocument {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

/// Result of one ingestion batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Sources ingested without error
    pub sources: usize,
    /// Chunks stored
    pub chunks: usize,
    /// `(source_id, message)` for every source that failed
    pub failed: Vec<(String, String)>,
    pub duration_ms: u64,
}

/// Chunk waiting for vectors
struct PendingChunk {
    segment: Segment,
    intents: Option<Vec<String>>,
    extra: Value,
}

/// Drives chunk -> embed -> store for batches of documents.
///
/// Sources are processed one at a time; a failure is recorded against its
/// source and the batch moves on. Chunks already stored for a failed source
/// are kept.
pub struct Ingestor {
    segmenter: Segmenter,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    generator: Option<Arc<dyn GenerationProvider>>,
    intents_per_chunk: usize,
}

impl Ingestor {
    pub fn new(segmenter: Segmenter, embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            segmenter,
            embedder,
            store,
            generator: None,
            intents_per_chunk: 0,
        }
    }

    /// Generate `intents_per_chunk` hypothetical questions per chunk
    pub fn with_generator(mut self, generator: Arc<dyn GenerationProvider>, intents_per_chunk: usize) -> Self {
        self.generator = Some(generator);
        self.intents_per_chunk = intents_per_chunk;
        self
    }

    pub async fn ingest_documents(&self, documents: &[SourceDocument]) -> IngestReport {
        let start = Instant::now();
        let mut report = IngestReport::default();

        info!("Starting ingestion of {} documents", documents.len());

        for document in documents {
            record(&mut report, &document.source_id, self.ingest_document(document).await);
        }

        finish(report, start)
    }

    /// Read and ingest files; an unreadable file is recorded as a failed
    /// source and the remaining files are still ingested
    pub async fn ingest_files(&self, paths: &[PathBuf]) -> IngestReport {
        let start = Instant::now();
        let mut report = IngestReport::default();

        info!("Starting ingestion of {} files", paths.len());

        for path in paths {
            let source_id = path.display().to_string();
            let result = match std::fs::read_to_string(path) {
                Ok(text) => self.ingest_document(&SourceDocument::new(source_id.as_str(), text)).await,
                Err(e) => Err(RaglineError::ingestion(source_id.as_str(), format!("failed to read file: {}", e))),
            };
            record(&mut report, &source_id, result);
        }

        finish(report, start)
    }

    pub async fn ingest_rows(&self, rows: &[RowDocument]) -> IngestReport {
        let start = Instant::now();
        let mut report = IngestReport::default();

        info!("Starting ingestion of {} rows", rows.len());

        for row in rows {
            record(&mut report, &row.source_id, self.ingest_row(row).await);
        }

        finish(report, start)
    }

    /// Ingest one document, returning the number of chunks stored
    pub async fn ingest_document(&self, document: &SourceDocument) -> Result<usize> {
        let pending = self
            .segmenter
            .segment(&document.text)
            .into_iter()
            .map(|segment| PendingChunk {
                segment,
                intents: None,
                extra: Value::Null,
            })
            .collect();

        self.store_chunks(&document.source_id, pending)
            .await
            .map_err(|e| RaglineError::ingestion(&document.source_id, e))
    }

    /// Ingest one row; an explicit row question replaces generated intents
    pub async fn ingest_row(&self, row: &RowDocument) -> Result<usize> {
        let pending = self
            .segmenter
            .segment_row(row)
            .into_iter()
            .map(|row_segment| PendingChunk {
                segment: row_segment.segment,
                intents: row_segment.intents,
                extra: json!({
                    "row": row_segment.row,
                    "columns": row_segment.columns,
                }),
            })
            .collect();

        self.store_chunks(&row.source_id, pending)
            .await
            .map_err(|e| RaglineError::ingestion(&row.source_id, e))
    }

    async fn store_chunks(&self, source_id: &str, pending: Vec<PendingChunk>) -> Result<usize> {
        if pending.is_empty() {
            debug!(source_id, "No chunks above the minimum size");
            return Ok(0);
        }

        let mut intents = Vec::with_capacity(pending.len());
        for chunk in &pending {
            intents.push(self.intents_for(source_id, chunk).await);
        }

        let texts: Vec<String> = pending.iter().map(|c| c.segment.text.clone()).collect();
        let dimension = self.embedder.dimension();
        let content_vectors = self.embedder.embed_batch(&texts).await?;
        check_batch(&content_vectors, texts.len(), dimension)?;

        let flat_intents: Vec<String> = intents.iter().flatten().cloned().collect();
        let flat_vectors = if flat_intents.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&flat_intents).await?
        };
        check_batch(&flat_vectors, flat_intents.len(), dimension)?;
        let mut intent_vectors = flat_vectors.into_iter();

        let ingested_at = chrono::Utc::now().to_rfc3339();
        let strategy = self.segmenter.strategy().as_str();

        for (position, ((chunk, content), chunk_intents)) in
            pending.into_iter().zip(content_vectors).zip(&intents).enumerate()
        {
            let vectors: Vec<Vec<f32>> = intent_vectors
                .by_ref()
                .take(chunk_intents.len())
                .map(|v| normalize(&v))
                .collect();

            let mut metadata = json!({
                "strategy": strategy,
                "kind": chunk.segment.kind.as_str(),
                "ingested_at": ingested_at,
                "content_hash": blake3::hash(chunk.segment.text.as_bytes()).to_hex().to_string(),
                "intents": chunk_intents,
            });
            if let (Some(target), Value::Object(extra)) = (metadata.as_object_mut(), chunk.extra) {
                target.extend(extra);
            }

            self.store.insert(NewChunk {
                source_id: source_id.to_string(),
                position,
                text: chunk.segment.text,
                kind: chunk.segment.kind,
                metadata,
                content_vector: normalize(&content),
                intent_vectors: vectors,
            })?;
        }

        debug!(source_id, chunks = texts.len(), intents = flat_intents.len(), "Stored source");
        Ok(texts.len())
    }

    async fn intents_for(&self, source_id: &str, chunk: &PendingChunk) -> Vec<String> {
        if let Some(explicit) = &chunk.intents {
            return explicit.clone();
        }

        let generator = match &self.generator {
            Some(generator) if self.intents_per_chunk > 0 => generator,
            _ => return Vec::new(),
        };

        match hypothetical_questions(generator.as_ref(), &chunk.segment.text, self.intents_per_chunk).await {
            Ok(questions) => questions,
            Err(e) => {
                warn!(source_id, error = %e, "Question generation failed, storing chunk without intents");
                Vec::new()
            }
        }
    }
}

fn record(report: &mut IngestReport, source_id: &str, result: Result<usize>) {
    match result {
        Ok(chunks) => {
            report.sources += 1;
            report.chunks += chunks;
        }
        Err(e) => {
            warn!("{}", e);
            report.failed.push((source_id.to_string(), e.to_string()));
        }
    }
}

fn finish(mut report: IngestReport, start: Instant) -> IngestReport {
    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Ingestion complete: {} sources, {} chunks, {} failed, {}ms",
        report.sources,
        report.chunks,
        report.failed.len(),
        report.duration_ms
    );
    report
}
