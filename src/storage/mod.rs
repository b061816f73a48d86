//! Chunk and vector storage
//!
//! [`VectorStore`] is the seam between retrieval and persistence: insert a
//! chunk with its content and intent vectors, KNN over both, and look up
//! neighbouring chunks by position for context expansion.

pub mod database;
mod memory;
mod sqlite_store;
mod vector_index;

pub use database::{Database, DbPool, DbStats};
pub use memory::MemoryStore;
pub use sqlite_store::SqliteVectorStore;
pub use vector_index::{IndexHit, VectorIndex};

use crate::segment::ChunkKind;
use crate::vector::{cosine_similarity, CodecError};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Stored vector is corrupt: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index error: {0}")]
    Index(String),

    #[error("Corrupt row {id}: {message}")]
    CorruptRow { id: i64, message: String },

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
}

/// A chunk ready to be stored
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub source_id: String,
    pub position: usize,
    pub text: String,
    pub kind: ChunkKind,
    pub metadata: serde_json::Value,
    pub content_vector: Vec<f32>,
    pub intent_vectors: Vec<Vec<f32>>,
}

/// A stored chunk with its decoded vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: i64,
    pub source_id: String,
    pub position: usize,
    pub text: String,
    pub kind: ChunkKind,
    pub metadata: serde_json::Value,
    pub content_vector: Vec<f32>,
    pub intent_vectors: Vec<Vec<f32>>,
}

/// KNN result: a chunk and its cosine distance in `[0, 2]`
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub chunk: StoredChunk,
    pub distance: f32,
}

/// Key to vector store with KNN and adjacency lookups
pub trait VectorStore: Send + Sync {
    /// Store a chunk, returning its id
    fn insert(&self, chunk: NewChunk) -> Result<i64, StoreError>;

    /// Up to `k` chunks closest to `query`, nearest first. A chunk's distance
    /// is that of the closest of its content and intent vectors.
    fn knn(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, StoreError>;

    /// Chunks of `source_id` whose position falls in `positions`, in order
    fn get_by_range(
        &self,
        source_id: &str,
        positions: RangeInclusive<usize>,
    ) -> Result<Vec<StoredChunk>, StoreError>;

    /// Remove every chunk
    fn clear(&self) -> Result<(), StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Dimension every stored and query vector must have
    fn dimension(&self) -> usize;
}

/// Cosine distance from `query` to the closest vector of `chunk`
pub(crate) fn chunk_distance(query: &[f32], chunk: &StoredChunk) -> f32 {
    std::iter::once(&chunk.content_vector)
        .chain(chunk.intent_vectors.iter())
        .filter_map(|v| cosine_similarity(query, v).ok())
        .map(|sim| 1.0 - sim)
        .fold(2.0, f32::min)
}

/// Reject vectors of the wrong dimension before they reach storage
pub(crate) fn check_new_chunk(chunk: &NewChunk, dimension: usize) -> Result<(), StoreError> {
    std::iter::once(&chunk.content_vector)
        .chain(chunk.intent_vectors.iter())
        .try_for_each(|v| check_dimension(v, dimension))
}

pub(crate) fn check_dimension(vector: &[f32], dimension: usize) -> Result<(), StoreError> {
    if vector.len() != dimension {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}
