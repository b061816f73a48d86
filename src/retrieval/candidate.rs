//! Scored chunk references produced during one query

use crate::segment::ChunkKind;
use crate::storage::StoredChunk;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A retrieval candidate: one chunk and every score it picked up on the way
/// through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Chunk ID from the store
    pub chunk_id: i64,

    pub source_id: String,

    /// Ordinal of the chunk within its source
    pub position: usize,

    pub text: String,

    pub kind: ChunkKind,

    pub metadata: Value,

    /// Raw cosine distance reported by the index, in `[0, 2]`
    pub distance: f32,

    pub content_similarity: f32,

    pub intent_similarity: f32,

    /// Weighted blend of intent and content similarity
    pub hybrid_score: f32,

    /// Reciprocal rank fusion score, scaled to `(0, 1]`
    pub fusion_score: Option<f32>,

    /// Score after heuristic reranking
    pub rerank_score: Option<f32>,

    /// Added by adjacent-chunk expansion rather than retrieved directly
    pub expanded: bool,
}

impl Candidate {
    /// Build an unscored candidate from a stored chunk
    pub fn from_chunk(chunk: StoredChunk, distance: f32) -> Self {
        Self {
            chunk_id: chunk.id,
            source_id: chunk.source_id,
            position: chunk.position,
            text: chunk.text,
            kind: chunk.kind,
            metadata: chunk.metadata,
            distance,
            content_similarity: 0.0,
            intent_similarity: 0.0,
            hybrid_score: 0.0,
            fusion_score: None,
            rerank_score: None,
            expanded: false,
        }
    }

    /// The most refined score available: rerank, then fusion, then hybrid
    pub fn effective_score(&self) -> f32 {
        self.rerank_score
            .or(self.fusion_score)
            .unwrap_or(self.hybrid_score)
    }

    /// Citation marker, e.g. `[handbook.md #3]`
    pub fn citation(&self) -> String {
        format!("[{} #{}]", self.source_id, self.position + 1)
    }

    /// First `max_chars` characters of the text
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            self.text.clone()
        } else {
            let cut: String = self.text.chars().take(max_chars).collect();
            format!("{}...", cut)
        }
    }
}

/// Sort by effective score, highest first; equal scores keep their order
pub(crate) fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.effective_score()
            .partial_cmp(&a.effective_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
pub(crate) fn candidate(chunk_id: i64, source_id: &str, position: usize, text: &str, score: f32) -> Candidate {
    Candidate {
        chunk_id,
        source_id: source_id.to_string(),
        position,
        text: text.to_string(),
        kind: ChunkKind::Prose,
        metadata: Value::Null,
        distance: 1.0 - score,
        content_similarity: score,
        intent_similarity: score,
        hybrid_score: score,
        fusion_score: None,
        rerank_score: None,
        expanded: false,
    }
}
