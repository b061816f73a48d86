//! In-memory [`VectorStore`] with exact brute-force KNN

use super::{
    check_dimension, check_new_chunk, chunk_distance, NewChunk, Neighbor, StoreError, StoredChunk,
    VectorStore,
};
use std::ops::RangeInclusive;
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    chunks: Vec<StoredChunk>,
    next_id: i64,
}

/// Exact-search store for tests and small collections
pub struct MemoryStore {
    inner: RwLock<Inner>,
    dimension: usize,
}

impl MemoryStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                chunks: Vec::new(),
                next_id: 1,
            }),
            dimension,
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Index("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Index("memory store lock poisoned".to_string()))
    }
}

impl VectorStore for MemoryStore {
    fn insert(&self, chunk: NewChunk) -> Result<i64, StoreError> {
        check_new_chunk(&chunk, self.dimension)?;

        let mut inner = self.write()?;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.chunks.push(StoredChunk {
            id,
            source_id: chunk.source_id,
            position: chunk.position,
            text: chunk.text,
            kind: chunk.kind,
            metadata: chunk.metadata,
            content_vector: chunk.content_vector,
            intent_vectors: chunk.intent_vectors,
        });
        Ok(id)
    }

    fn knn(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, StoreError> {
        check_dimension(query, self.dimension)?;

        let inner = self.read()?;
        let mut neighbors: Vec<Neighbor> = inner
            .chunks
            .iter()
            .map(|chunk| Neighbor {
                distance: chunk_distance(query, chunk),
                chunk: chunk.clone(),
            })
            .collect();
        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.chunk.id.cmp(&b.chunk.id))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn get_by_range(
        &self,
        source_id: &str,
        positions: RangeInclusive<usize>,
    ) -> Result<Vec<StoredChunk>, StoreError> {
        let inner = self.read()?;
        let mut chunks: Vec<StoredChunk> = inner
            .chunks
            .iter()
            .filter(|c| c.source_id == source_id && positions.contains(&c.position))
            .cloned()
            .collect();
        chunks.sort_by_key(|c| (c.position, c.id));
        Ok(chunks)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.write()?.chunks.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.chunks.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
