//! Ragline - retrieval and reranking pipeline for grounded question answering
//!
//! Documents are segmented into chunks, embedded in two spaces (content and
//! hypothetical-question intent) and stored with their vectors. Queries run
//! hybrid KNN, fusion, deduplication, diversification and reranking; the
//! surviving chunks are assembled into a cited context for a generation
//! provider, synchronously or as a stream of events.

pub mod cli;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod generation;
pub mod rag;
pub mod retrieval;
pub mod segment;
pub mod storage;
pub mod vector;

pub use error::{RaglineError, Result};
