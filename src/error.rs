use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::generation::GenerationError;
use crate::rag::StateError;
use crate::storage::StoreError;
use crate::vector::{CodecError, SimilarityError};

/// Main error type for ragline
#[derive(Error, Debug)]
pub enum RaglineError {
    /// Bad request parameters (top_k, threshold, empty query); never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Embedding provider failure (after retries)
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Generation provider failure (after retries)
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Vector store / KNN failure; surfaced immediately
    #[error("Index error: {0}")]
    Index(#[from] StoreError),

    /// Failure while ingesting one source
    #[error("Ingestion of '{source_id}' failed: {message}")]
    Ingestion { source_id: String, message: String },

    /// Vector (de)serialization errors
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Similarity computed over mismatched vectors
    #[error("Similarity error: {0}")]
    Similarity(#[from] SimilarityError),

    /// Orchestrator state machine misuse
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RaglineError {
    /// Wrap any error raised while ingesting `source_id`
    pub fn ingestion(source_id: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Ingestion {
            source_id: source_id.into(),
            message: err.to_string(),
        }
    }
}

/// Errors that are safe to retry with backoff (provider timeouts, transport failures)
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for ragline operations
pub type Result<T> = std::result::Result<T, RaglineError>;
