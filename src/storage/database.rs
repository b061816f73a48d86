//! SQLite database management with migrations
//!
//! Provides structured storage for chunks and their encoded embeddings

use super::StoreError;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database and apply pending migrations
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        {
            let conn = pool.get()?;
            // WAL lets queries read while an ingest batch writes
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )?;
        }

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StoreError> {
        let conn = self.get_conn()?;

        let chunk_count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let source_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT source_id) FROM chunks",
            [],
            |row| row.get(0),
        )?;
        let intent_count: i64 = conn.query_row(
            "SELECT COALESCE(SUM(intent_count), 0) FROM embeddings",
            [],
            |row| row.get(0),
        )?;
        let total_chars: i64 = conn.query_row(
            "SELECT COALESCE(SUM(char_len), 0) FROM chunks",
            [],
            |row| row.get(0),
        )?;

        Ok(DbStats {
            chunk_count: chunk_count as usize,
            source_count: source_count as usize,
            intent_count: intent_count as usize,
            total_chars: total_chars as u64,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq)]
pub struct DbStats {
    pub chunk_count: usize,
    pub source_count: usize,
    pub intent_count: usize,
    pub total_chars: u64,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: chunks and embeddings
    r#"
    CREATE TABLE chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        text TEXT NOT NULL,
        char_len INTEGER NOT NULL,
        kind TEXT NOT NULL DEFAULT 'prose',
        metadata TEXT,  -- JSON metadata
        created_at TEXT NOT NULL
    );

    CREATE INDEX idx_chunks_source_position ON chunks(source_id, position);

    -- content: headerless f32 LE; intents: (count, dim) header + f32 LE
    CREATE TABLE embeddings (
        chunk_id INTEGER PRIMARY KEY,
        content BLOB NOT NULL,
        intents BLOB NOT NULL,
        intent_count INTEGER NOT NULL DEFAULT 0,
        model TEXT NOT NULL,
        dimension INTEGER NOT NULL,
        FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_embeddings_model ON embeddings(model);
    "#,
];
