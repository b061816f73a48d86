/// Embedding and ingestion
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - CachedEmbedder and RetryingEmbedder as stackable wrappers
/// - Ingestor for segment -> embed -> store batches
mod batch;
mod cache;
mod provider;
mod retry;

pub use batch::{IngestReport, Ingestor, SourceDocument};
pub use cache::{cache_key, CacheStats, CachedEmbedder};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use retry::{RetryPolicy, RetryingEmbedder};

use crate::config::{EmbeddingConfig, RetryConfig};
use std::sync::Arc;

/// Build the provider stack used at query and ingest time:
/// FastEmbed, wrapped in retry, wrapped in the shared cache
pub fn build_embedder(
    embedding: &EmbeddingConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let base: Arc<dyn EmbeddingProvider> = Arc::new(FastEmbedProvider::new(&embedding.model, embedding.batch_size)?);

    if base.dimension() != embedding.dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: embedding.dimension,
            actual: base.dimension(),
        });
    }

    Ok(stack(base, embedding, retry))
}

/// Wrap any provider with retry and caching per configuration
pub fn stack(
    base: Arc<dyn EmbeddingProvider>,
    embedding: &EmbeddingConfig,
    retry: &RetryConfig,
) -> Arc<dyn EmbeddingProvider> {
    let retrying = Arc::new(RetryingEmbedder::new(base, RetryPolicy::from_config(retry)));
    Arc::new(CachedEmbedder::new(retrying, embedding.cache_capacity))
}
