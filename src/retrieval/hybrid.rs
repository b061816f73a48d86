//! Hybrid search over content and intent embeddings

use super::candidate::{sort_by_score, Candidate};
use super::deduplication::deduplicate;
use super::expansion::QueryExpander;
use super::fusion::{reciprocal_rank_fusion, FusionConfig};
use super::mmr::mmr_select;
use super::reranker::Reranker;
use crate::config::{RerankConfig, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{RaglineError, Result};
use crate::generation::GenerationProvider;
use crate::storage::{Neighbor, StoredChunk, VectorStore};
use crate::vector::{cosine_similarity, SimilarityError};
use ahash::AHashMap;
use std::sync::Arc;
use tracing::debug;

/// Blend weights for intent and content similarity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub intent: f32,
    pub content: f32,
}

impl HybridWeights {
    pub fn new(intent: f32, content: f32) -> Result<Self> {
        if !(intent >= 0.0 && content >= 0.0) || intent + content <= 0.0 {
            return Err(RaglineError::Validation(format!(
                "hybrid weights must be non-negative and not both zero (intent {}, content {})",
                intent, content
            )));
        }
        Ok(Self { intent, content })
    }

    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Self::new(config.intent_weight, config.content_weight)
    }

    /// `intent × W_intent + content × W_content`
    pub fn blend(&self, intent_similarity: f32, content_similarity: f32) -> f32 {
        intent_similarity * self.intent + content_similarity * self.content
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            intent: 0.7,
            content: 0.3,
        }
    }
}

/// Where the content similarity comes from
#[derive(Debug, Clone, Copy)]
pub enum ContentSignal<'a> {
    /// Stored content vector
    Vector(&'a [f32]),
    /// Index distance bounded to `[0, 2]`
    Distance(f32),
}

/// Similarity parts for one candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridScore {
    pub content: f32,
    pub intent: f32,
    pub score: f32,
}

/// Content similarity, approximating cosine similarity in `[-1, 1]`
pub fn content_similarity(query: &[f32], signal: ContentSignal<'_>) -> std::result::Result<f32, SimilarityError> {
    match signal {
        ContentSignal::Vector(vector) => cosine_similarity(query, vector),
        ContentSignal::Distance(distance) => Ok(1.0 - distance.clamp(0.0, 2.0) / 2.0),
    }
}

/// Best similarity between the query and any intent vector; 0 without intents
pub fn intent_similarity(query: &[f32], intents: &[Vec<f32>]) -> std::result::Result<f32, SimilarityError> {
    let mut best: Option<f32> = None;
    for intent in intents {
        let sim = cosine_similarity(query, intent)?;
        best = Some(best.map_or(sim, |b| b.max(sim)));
    }
    Ok(best.unwrap_or(0.0))
}

pub fn hybrid_score(
    query: &[f32],
    content: ContentSignal<'_>,
    intents: &[Vec<f32>],
    weights: &HybridWeights,
) -> std::result::Result<HybridScore, SimilarityError> {
    let content = content_similarity(query, content)?;
    let intent = intent_similarity(query, intents)?;
    Ok(HybridScore {
        content,
        intent,
        score: weights.blend(intent, content),
    })
}

/// Score a stored chunk against a query vector
pub fn score_chunk(
    query: &[f32],
    chunk: &StoredChunk,
    distance: f32,
    weights: &HybridWeights,
) -> std::result::Result<HybridScore, SimilarityError> {
    let signal = if chunk.content_vector.is_empty() {
        ContentSignal::Distance(distance)
    } else {
        ContentSignal::Vector(&chunk.content_vector)
    };
    hybrid_score(query, signal, &chunk.intent_vectors, weights)
}

/// Hybrid searcher: query expansion, per-variant KNN with hybrid scoring,
/// rank fusion, thresholding, deduplication, diversification and rerank
pub struct HybridSearcher {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    expander: QueryExpander,
    reranker: Reranker,
    weights: HybridWeights,
    fusion: FusionConfig,
    config: RetrievalConfig,
}

impl HybridSearcher {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: &RetrievalConfig,
        rerank: &RerankConfig,
    ) -> Result<Self> {
        let weights = HybridWeights::from_config(config)?;
        let fusion = FusionConfig::new(config.rrf_k).map_err(|e| RaglineError::Config(e.to_string()))?;

        Ok(Self {
            embedder,
            store,
            expander: QueryExpander::new(config.max_query_variants),
            reranker: Reranker::new(rerank),
            weights,
            fusion,
            config: config.clone(),
        })
    }

    /// Use `generator` for query paraphrases
    pub fn with_generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.expander = QueryExpander::new(self.config.max_query_variants).with_generator(generator);
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn weights(&self) -> HybridWeights {
        self.weights
    }

    /// Perform hybrid search. An empty result is not an error.
    pub async fn search(&self, query: &str, top_k: usize, min_similarity: f32) -> Result<Vec<Candidate>> {
        if query.trim().is_empty() {
            return Err(RaglineError::Validation("Query text cannot be empty".to_string()));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        // Step 1: Query variants
        let variants = if self.config.query_expansion {
            self.expander.expand(query).await
        } else {
            vec![query.trim().to_string()]
        };

        // Step 2: One ranked list per variant
        let vectors = self.embedder.embed_batch(&variants).await?;
        let search_limit = top_k.saturating_mul(self.config.search_multiplier.max(1));

        let mut lists = Vec::with_capacity(vectors.len());
        for vector in &vectors {
            let neighbors = self.store.knn(vector, search_limit)?;
            lists.push(self.score_neighbors(vector, neighbors)?);
        }

        // Step 3: Fusion
        let mut candidates = self.fuse(lists);
        debug!(variants = variants.len(), candidates = candidates.len(), "Retrieved candidates");

        // Step 4: Threshold and deduplication, in configured order
        if self.config.dedup_enabled && self.config.dedup_before_threshold {
            candidates = deduplicate(candidates, self.config.dedup_threshold);
        }
        candidates.retain(|c| c.hybrid_score >= min_similarity);
        if self.config.dedup_enabled && !self.config.dedup_before_threshold {
            candidates = deduplicate(candidates, self.config.dedup_threshold);
        }
        debug!(candidates = candidates.len(), min_similarity, "Filtered candidates");

        // Step 5: Diversify, then rerank
        if self.config.mmr_enabled {
            candidates = mmr_select(candidates, top_k, self.config.mmr_lambda);
        }
        let results = if self.config.rerank_enabled {
            self.reranker.rerank(query, candidates, top_k)
        } else {
            candidates.truncate(top_k);
            candidates
        };

        Ok(results)
    }

    fn score_neighbors(&self, query: &[f32], neighbors: Vec<Neighbor>) -> Result<Vec<Candidate>> {
        let mut scored = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let parts = score_chunk(query, &neighbor.chunk, neighbor.distance, &self.weights)?;
            let mut candidate = Candidate::from_chunk(neighbor.chunk, neighbor.distance);
            candidate.content_similarity = parts.content;
            candidate.intent_similarity = parts.intent;
            candidate.hybrid_score = parts.score;
            scored.push(candidate);
        }
        sort_by_score(&mut scored);
        Ok(scored)
    }

    /// Merge per-variant lists. A single list passes through unchanged;
    /// otherwise candidates are ordered by fused rank and keep their best
    /// hybrid score across variants.
    fn fuse(&self, mut lists: Vec<Vec<Candidate>>) -> Vec<Candidate> {
        if lists.len() <= 1 {
            return lists.pop().unwrap_or_default();
        }

        let ranked_ids: Vec<Vec<i64>> = lists
            .iter()
            .map(|list| list.iter().map(|c| c.chunk_id).collect())
            .collect();
        let fused = reciprocal_rank_fusion(&ranked_ids, &self.fusion);
        let max_score = self.fusion.max_score(lists.len());

        let mut best: AHashMap<i64, Candidate> = AHashMap::new();
        for candidate in lists.into_iter().flatten() {
            match best.get(&candidate.chunk_id) {
                Some(existing) if existing.hybrid_score >= candidate.hybrid_score => {}
                _ => {
                    best.insert(candidate.chunk_id, candidate);
                }
            }
        }

        fused
            .into_iter()
            .filter_map(|(id, score)| {
                best.remove(&id).map(|mut candidate| {
                    candidate.fusion_score = Some(score / max_score);
                    candidate
                })
            })
            .collect()
    }
}
