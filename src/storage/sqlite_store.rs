//! SQLite-backed [`VectorStore`]
//!
//! Rows are the source of truth. The HNSW index lives in memory and is
//! rebuilt from the embeddings table when the store is opened.

use super::{
    check_dimension, check_new_chunk, chunk_distance, Database, DbStats, NewChunk, Neighbor,
    StoreError, StoredChunk, VectorIndex, VectorStore,
};
use crate::config::RetrievalConfig;
use crate::segment::ChunkKind;
use crate::vector::{decode_many, decode_one, encode_many, encode_one};
use rusqlite::{params, Row};
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::{debug, info, warn};

const CHUNK_COLUMNS: &str = "c.id, c.source_id, c.position, c.text, c.kind, c.metadata, e.content, e.intents";

/// Columns of one chunk row before vector decoding
struct RawChunk {
    id: i64,
    source_id: String,
    position: i64,
    text: String,
    kind: String,
    metadata: Option<String>,
    content: Vec<u8>,
    intents: Vec<u8>,
}

impl RawChunk {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_id: row.get(1)?,
            position: row.get(2)?,
            text: row.get(3)?,
            kind: row.get(4)?,
            metadata: row.get(5)?,
            content: row.get(6)?,
            intents: row.get(7)?,
        })
    }

    fn decode(self) -> Result<StoredChunk, StoreError> {
        let kind = self.kind.parse::<ChunkKind>().map_err(|message| StoreError::CorruptRow {
            id: self.id,
            message,
        })?;
        let metadata = match self.metadata.as_deref() {
            Some(json) => serde_json::from_str(json).map_err(|e| StoreError::CorruptRow {
                id: self.id,
                message: format!("metadata: {}", e),
            })?,
            None => serde_json::Value::Null,
        };

        Ok(StoredChunk {
            id: self.id,
            source_id: self.source_id,
            position: usize::try_from(self.position).unwrap_or_default(),
            text: self.text,
            kind,
            metadata,
            content_vector: decode_one(&self.content)?,
            intent_vectors: decode_many(&self.intents)?,
        })
    }
}

/// Persistent chunk store with an HNSW index over content and intent vectors
pub struct SqliteVectorStore {
    db: Database,
    index: VectorIndex,
    dimension: usize,
    model: String,
    ef_search: usize,
}

impl SqliteVectorStore {
    /// Open the store at `db_path` and rebuild the index from stored rows
    pub fn open(
        db_path: &Path,
        dimension: usize,
        model: impl Into<String>,
        config: &RetrievalConfig,
    ) -> Result<Self, StoreError> {
        let db = Database::new(db_path)?;
        let stats = db.stats()?;
        let index = VectorIndex::new(
            dimension,
            config.hnsw_m,
            config.hnsw_ef_construction,
            (stats.chunk_count + stats.intent_count) * 2,
        );

        let store = Self {
            db,
            index,
            dimension,
            model: model.into(),
            ef_search: config.hnsw_ef_search,
        };
        store.rebuild_index()?;

        info!(
            path = %db_path.display(),
            chunks = stats.chunk_count,
            vectors = store.index.len(),
            "Opened vector store"
        );
        Ok(store)
    }

    fn rebuild_index(&self) -> Result<(), StoreError> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare("SELECT chunk_id, content, intents, dimension FROM embeddings")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut skipped = 0usize;
        for row in rows {
            let (chunk_id, content, intents, dimension) = row?;
            if dimension as usize != self.dimension {
                skipped += 1;
                continue;
            }
            self.index.insert(chunk_id, &decode_one(&content)?)?;
            for intent in decode_many(&intents)? {
                self.index.insert(chunk_id, &intent)?;
            }
        }

        if skipped > 0 {
            warn!(
                skipped,
                dimension = self.dimension,
                "Skipped chunks embedded with a different dimension"
            );
        }
        Ok(())
    }

    fn load_chunks(&self, ids: &[i64]) -> Result<Vec<StoredChunk>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM chunks c JOIN embeddings e ON e.chunk_id = c.id WHERE c.id IN ({})",
            CHUNK_COLUMNS, placeholders
        );

        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), RawChunk::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter().map(RawChunk::decode).collect()
    }

    pub fn stats(&self) -> Result<DbStats, StoreError> {
        self.db.stats()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl VectorStore for SqliteVectorStore {
    fn insert(&self, chunk: NewChunk) -> Result<i64, StoreError> {
        check_new_chunk(&chunk, self.dimension)?;

        let content = encode_one(&chunk.content_vector);
        let intents = encode_many(&chunk.intent_vectors)?;
        let metadata = chunk.metadata.to_string();
        let char_len = chunk.text.chars().count() as i64;

        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO chunks (source_id, position, text, char_len, kind, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                chunk.source_id,
                chunk.position as i64,
                chunk.text,
                char_len,
                chunk.kind.as_str(),
                metadata,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO embeddings (chunk_id, content, intents, intent_count, model, dimension)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                content,
                intents,
                chunk.intent_vectors.len() as i64,
                self.model,
                self.dimension as i64,
            ],
        )?;
        tx.commit()?;

        self.index.insert(id, &chunk.content_vector)?;
        for intent in &chunk.intent_vectors {
            self.index.insert(id, intent)?;
        }

        debug!(
            chunk_id = id,
            source_id = %chunk.source_id,
            position = chunk.position,
            intents = chunk.intent_vectors.len(),
            "Stored chunk"
        );
        Ok(id)
    }

    fn knn(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, StoreError> {
        check_dimension(query, self.dimension)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits = self.index.search(query, k, self.ef_search)?;
        let ids: Vec<i64> = hits.iter().map(|h| h.chunk_id).collect();

        // exact distances from the stored vectors
        let mut neighbors: Vec<Neighbor> = self
            .load_chunks(&ids)?
            .into_iter()
            .map(|chunk| Neighbor {
                distance: chunk_distance(query, &chunk),
                chunk,
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
        let sql = format!(
            "SELECT {} FROM chunks c JOIN embeddings e ON e.chunk_id = c.id
             WHERE c.source_id = ?1 AND c.position BETWEEN ?2 AND ?3
             ORDER BY c.position, c.id",
            CHUNK_COLUMNS
        );

        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(
                params![
                    source_id,
                    *positions.start() as i64,
                    *positions.end() as i64
                ],
                RawChunk::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter().map(RawChunk::decode).collect()
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM embeddings", [])?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.commit()?;
        self.index.clear()?;

        info!("Cleared vector store");
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.db.stats()?.chunk_count)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
