//! HNSW approximate nearest neighbour index over chunk vectors
//!
//! Every content and intent vector gets its own slot; slots map back to the
//! owning chunk id and hits are collapsed per chunk.

use super::StoreError;
use ahash::AHashMap;
use hnsw_rs::prelude::*;
use std::sync::RwLock;

/// Nearest-chunk hit with cosine distance in `[0, 2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    pub chunk_id: i64,
    pub distance: f32,
}

struct Inner {
    hnsw: Hnsw<'static, f32, DistCosine>,
    slots: Vec<i64>,
}

/// HNSW vector index wrapper
pub struct VectorIndex {
    inner: RwLock<Inner>,
    dimension: usize,
    m: usize,
    ef_construction: usize,
    max_elements: usize,
}

/// Layer cap of the underlying graph
const MAX_LAYERS: usize = 16;

impl VectorIndex {
    /// * `dimension` - vector dimension (must match embedding dimension)
    /// * `m` - connections per layer
    /// * `ef_construction` - build-time candidate list size
    /// * `max_elements` - expected number of vectors, used to size layers
    pub fn new(dimension: usize, m: usize, ef_construction: usize, max_elements: usize) -> Self {
        let max_elements = max_elements.max(1_000);
        Self {
            inner: RwLock::new(Inner {
                hnsw: Hnsw::new(m, max_elements, MAX_LAYERS, ef_construction, DistCosine),
                slots: Vec::new(),
            }),
            dimension,
            m,
            ef_construction,
            max_elements,
        }
    }

    /// Index one vector for `chunk_id`. Zero vectors have no direction and
    /// are skipped.
    pub fn insert(&self, chunk_id: i64, vector: &[f32]) -> Result<(), StoreError> {
        super::check_dimension(vector, self.dimension)?;
        if vector.iter().all(|x| *x == 0.0) {
            return Ok(());
        }

        let data = vector.to_vec();
        let mut inner = self.write()?;
        let slot = inner.slots.len();
        inner.hnsw.insert((&data, slot));
        inner.slots.push(chunk_id);

        Ok(())
    }

    /// Up to `k` distinct chunks nearest to `query`
    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<IndexHit>, StoreError> {
        super::check_dimension(query, self.dimension)?;

        let inner = self.read()?;
        if inner.slots.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        // several slots can belong to one chunk, so over-fetch
        let fetch = (k * 4).min(inner.slots.len());
        let neighbours = inner.hnsw.search(query, fetch, ef_search.max(fetch));

        let mut best: AHashMap<i64, f32> = AHashMap::new();
        for neighbour in neighbours {
            let Some(&chunk_id) = inner.slots.get(neighbour.d_id) else {
                continue;
            };
            if !neighbour.distance.is_finite() {
                continue;
            }
            best.entry(chunk_id)
                .and_modify(|d| *d = d.min(neighbour.distance))
                .or_insert(neighbour.distance);
        }

        let mut hits: Vec<IndexHit> = best
            .into_iter()
            .map(|(chunk_id, distance)| IndexHit { chunk_id, distance })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Drop every vector
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.hnsw = Hnsw::new(
            self.m,
            self.max_elements,
            MAX_LAYERS,
            self.ef_construction,
            DistCosine,
        );
        inner.slots.clear();
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Index("vector index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Index("vector index lock poisoned".to_string()))
    }
}
