//! Evaluation utilities: ranking metrics and answer heuristics for
//! monitoring. Nothing here gates the request path.

mod faithfulness;
mod metrics;

pub use faithfulness::{
    answer_faithfulness, hallucination_check, FaithfulnessReport, HallucinationReport, FAITHFULNESS_THRESHOLD,
};
pub use metrics::{dcg_at_k, mrr, ndcg_at_k, precision_at_k, recall_at_k};
