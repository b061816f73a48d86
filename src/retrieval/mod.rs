//! Hybrid retrieval and candidate reduction
//!
//! Pipeline stages, each toggleable from `RetrievalConfig`:
//! query expansion → per-variant KNN + hybrid scoring → reciprocal rank
//! fusion → threshold / deduplication → MMR → heuristic rerank.

mod candidate;
mod deduplication;
mod expansion;
mod fusion;
mod hybrid;
mod mmr;
mod reranker;
mod text;

pub use candidate::Candidate;
pub use deduplication::{deduplicate, is_near_duplicate};
pub use expansion::{rule_based_variants, QueryExpander};
pub use fusion::{reciprocal_rank_fusion, FusionConfig, FusionError};
pub use hybrid::{
    content_similarity, hybrid_score, intent_similarity, score_chunk, ContentSignal, HybridScore, HybridSearcher,
    HybridWeights,
};
pub use mmr::mmr_select;
pub use reranker::Reranker;
pub use text::{jaccard, text_similarity, tokenize};

pub(crate) use candidate::sort_by_score;
