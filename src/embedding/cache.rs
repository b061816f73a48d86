//! Bounded embedding cache shared across requests

use super::{EmbeddingError, EmbeddingProvider};
use ahash::AHashMap;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Cache key: whitespace runs collapsed to one space, trimmed
pub fn cache_key(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Embedding provider wrapper with a bounded cache.
///
/// Once `capacity` entries are held, new embeddings are no longer inserted;
/// existing entries keep serving hits. A capacity of 0 disables caching.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    entries: RwLock<AHashMap<String, Vec<f32>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self {
            inner,
            entries: RwLock::new(AHashMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().map(|e| e.len()).unwrap_or(0),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lookup(&self, key: &str) -> Option<Vec<f32>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn store(&self, key: String, embedding: &[f32]) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut entries) = self.entries.write() {
            if entries.len() < self.capacity || entries.contains_key(&key) {
                entries.insert(key, embedding.to_vec());
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let keys: Vec<String> = texts.iter().map(|t| cache_key(t)).collect();
        let mut results: Vec<Option<Vec<f32>>> = keys.iter().map(|k| self.lookup(k)).collect();

        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_none())
            .map(|(i, _)| i)
            .collect();

        let hits = (texts.len() - missing.len()) as u64;
        self.hits.fetch_add(hits, Ordering::Relaxed);
        self.misses.fetch_add(missing.len() as u64, Ordering::Relaxed);

        if !missing.is_empty() {
            let batch: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&batch).await?;
            super::provider::check_batch(&fresh, batch.len(), self.inner.dimension())?;

            for (&i, embedding) in missing.iter().zip(fresh) {
                self.store(keys[i].clone(), &embedding);
                results[i] = Some(embedding);
            }
        }

        debug!(requested = texts.len(), cache_hits = hits, "Embedded batch");

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| EmbeddingError::Inference("Missing embedding".to_string())))
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
