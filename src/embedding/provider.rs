/// Embedding provider trait and FastEmbed implementation
use crate::error::Retryable;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding inference failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Provider timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Timeout { .. } => true,
            EmbeddingError::Unavailable(_) => true,

            EmbeddingError::InitializationError(_) => false,
            EmbeddingError::Inference(_) => false,
            EmbeddingError::InvalidInput(_) => false,
            EmbeddingError::DimensionMismatch { .. } => false,
        }
    }
}

/// Trait for embedding providers
///
/// Implementations must return one vector per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::Inference("No embedding generated".to_string()))
    }

    /// Generate embeddings for multiple texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[async_trait]
impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<P> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        (**self).embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Check a provider response against the request
pub(crate) fn check_batch(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if embeddings.len() != expected_count {
        return Err(EmbeddingError::Inference(format!(
            "Expected {} embeddings, got {}",
            expected_count,
            embeddings.len()
        )));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(())
}

/// FastEmbed provider for local embedding generation
///
/// Inference is CPU bound and runs on the blocking thread pool.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on-demand to `~/.cache/huggingface/`
    /// on first use.
    /// - all-MiniLM-L6-v2: 90MB (384 dims)
    /// - bge-small-en-v1.5: 130MB (384 dims)
    /// - bge-base-en-v1.5: 440MB (768 dims)
    pub fn new(model_name: &str, batch_size: usize) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension, model_size_mb) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384, 90),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384, 130),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768, 440),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }

    /// Create provider with default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2", 32)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at index {}",
                pos
            )));
        }

        let model = Arc::clone(&self.model);
        let batch = texts.to_vec();
        let batch_size = self.batch_size;

        let embeddings = tokio::task::spawn_blocking(move || model.embed(batch, Some(batch_size)))
            .await
            .map_err(|e| EmbeddingError::Unavailable(format!("Embedding task failed: {}", e)))?
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        check_batch(&embeddings, texts.len(), self.dimension)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[test]
    fn test_retryable_classification() {
        assert!(EmbeddingError::Timeout { duration_ms: 10 }.is_retryable());
        assert!(EmbeddingError::Unavailable("down".into()).is_retryable());
        assert!(!EmbeddingError::InvalidInput("empty".into()).is_retryable());
        assert!(!EmbeddingError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
        .is_retryable());
    }

    #[test]
    fn test_check_batch() {
        assert!(check_batch(&[vec![0.0; 3], vec![0.0; 3]], 2, 3).is_ok());
        assert!(matches!(
            check_batch(&[vec![0.0; 3]], 2, 3),
            Err(EmbeddingError::Inference(_))
        ));
        assert!(matches!(
            check_batch(&[vec![0.0; 2]], 1, 3),
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_unsupported_model() {
        assert!(matches!(
            FastEmbedProvider::new("word2vec", 8),
            Err(EmbeddingError::InitializationError(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    async fn test_batch_embedding() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let texts = vec![
            "First test sentence.".to_string(),
            "Second test sentence.".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|e| e.len() == 384));
        assert!(provider.embed("").await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    async fn test_semantic_similarity() {
        let provider = FastEmbedProvider::with_default_model().unwrap();

        let cat = provider.embed("The cat sits on the mat.").await.unwrap();
        let feline = provider.embed("A feline rests on the rug.").await.unwrap();
        let python = provider.embed("Python programming language.").await.unwrap();

        let near = cosine_similarity(&cat, &feline).unwrap();
        let far = cosine_similarity(&cat, &python).unwrap();
        assert!(near > far);
    }
}
