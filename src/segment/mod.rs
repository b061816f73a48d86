//! Text segmentation
//!
//! Splits normalized document text into retrievable chunks. Two strategies
//! share one greedy packer:
//! - `Fixed` packs paragraphs and seeds each new chunk with an overlap tail
//! - `Structure` keeps fenced code, SQL statements and list blocks intact
//!
//! Tabular rows go through [`Segmenter::segment_row`], which carries an
//! explicit question through as the chunk's only intent.

mod packer;
mod rows;
mod structure;

pub use rows::{RowDocument, RowSegment};

pub(crate) use packer::split_sentences;

use crate::config::ChunkingConfig;
use packer::{split_oversized, split_paragraphs, Packer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Chunking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStrategy {
    #[default]
    Fixed,
    Structure,
}

impl SegmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStrategy::Fixed => "fixed",
            SegmentStrategy::Structure => "structure",
        }
    }
}

impl fmt::Display for SegmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(SegmentStrategy::Fixed),
            "structure" => Ok(SegmentStrategy::Structure),
            other => Err(format!(
                "unknown chunking strategy '{}' (expected fixed or structure)",
                other
            )),
        }
    }
}

/// Structural tag of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    #[default]
    Prose,
    Code,
    Sql,
    List,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Prose => "prose",
            ChunkKind::Code => "code",
            ChunkKind::Sql => "sql",
            ChunkKind::List => "list",
        }
    }

    /// Kind of a chunk holding both units: the first structured kind wins
    pub(crate) fn merge(self, other: ChunkKind) -> ChunkKind {
        match self {
            ChunkKind::Prose => other,
            kind => kind,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prose" => Ok(ChunkKind::Prose),
            "code" => Ok(ChunkKind::Code),
            "sql" => Ok(ChunkKind::Sql),
            "list" => Ok(ChunkKind::List),
            other => Err(format!("unknown chunk kind '{}'", other)),
        }
    }
}

/// One chunk of segmenter output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub kind: ChunkKind,
}

impl Segment {
    pub fn char_len(&self) -> usize {
        char_len(&self.text)
    }
}

/// Length in characters, the unit every size limit is expressed in
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Segmenter bound to one chunking configuration
#[derive(Debug, Clone)]
pub struct Segmenter {
    strategy: SegmentStrategy,
    max_chunk_size: usize,
    overlap: usize,
    min_chunk_size: usize,
    oversize_factor: f64,
}

impl Segmenter {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            strategy: config.strategy,
            max_chunk_size: config.max_chunk_size.max(1),
            overlap: config.overlap.min(config.max_chunk_size.saturating_sub(1)),
            min_chunk_size: config.min_chunk_size,
            oversize_factor: config.structure_oversize_factor.max(1.0),
        }
    }

    pub fn with_strategy(mut self, strategy: SegmentStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> SegmentStrategy {
        self.strategy
    }

    /// Segment one document. Empty input yields no chunks; input that fits
    /// in one chunk is returned whole.
    pub fn segment(&self, text: &str) -> Vec<Segment> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let segments = if char_len(text) <= self.max_chunk_size {
            vec![Segment {
                text: text.to_string(),
                kind: self.whole_kind(text),
            }]
        } else {
            match self.strategy {
                SegmentStrategy::Fixed => self.segment_fixed(text),
                SegmentStrategy::Structure => self.segment_structure(text),
            }
        };

        let segments = self.finalize(segments);
        debug!(
            strategy = %self.strategy,
            input_chars = char_len(text),
            chunks = segments.len(),
            "Segmented document"
        );
        segments
    }

    fn whole_kind(&self, text: &str) -> ChunkKind {
        match self.strategy {
            SegmentStrategy::Fixed => ChunkKind::Prose,
            SegmentStrategy::Structure => structure::partition(text)
                .iter()
                .fold(ChunkKind::Prose, |kind, unit| kind.merge(unit.kind)),
        }
    }

    fn segment_fixed(&self, text: &str) -> Vec<Segment> {
        let mut packer = Packer::new(self.max_chunk_size, self.overlap, "\n\n");

        for paragraph in split_paragraphs(text) {
            if char_len(&paragraph) <= self.max_chunk_size {
                packer.push(&paragraph, ChunkKind::Prose);
            } else {
                let pieces = split_oversized(&paragraph, self.max_chunk_size, self.overlap);
                packer.push_pieces(pieces, ChunkKind::Prose);
            }
        }

        packer.finish()
    }

    fn segment_structure(&self, text: &str) -> Vec<Segment> {
        let soft_limit = (self.max_chunk_size as f64 * self.oversize_factor) as usize;
        let mut packer = Packer::new(self.max_chunk_size, 0, "\n\n");

        for unit in structure::partition(text) {
            let len = char_len(&unit.text);
            match unit.kind {
                ChunkKind::Prose if len <= self.max_chunk_size => {
                    packer.push(&unit.text, ChunkKind::Prose);
                }
                ChunkKind::Prose => {
                    let pieces = split_oversized(&unit.text, self.max_chunk_size, self.overlap);
                    packer.push_pieces(pieces, ChunkKind::Prose);
                }
                kind if len <= self.max_chunk_size => packer.push(&unit.text, kind),
                kind => {
                    if len > soft_limit {
                        debug!(kind = %kind, chars = len, soft_limit, "Structured unit far exceeds chunk size");
                    }
                    packer.push_alone(&unit.text, kind);
                }
            }
        }

        packer.finish()
    }

    /// Fold undersized chunks into their predecessor when that still fits,
    /// then drop whatever remains below the minimum
    fn finalize(&self, segments: Vec<Segment>) -> Vec<Segment> {
        let mut out: Vec<Segment> = Vec::with_capacity(segments.len());

        for segment in segments {
            let len = segment.char_len();
            if len < self.min_chunk_size {
                if let Some(prev) = out.last_mut() {
                    if prev.char_len() + 2 + len <= self.max_chunk_size {
                        prev.text.push_str("\n\n");
                        prev.text.push_str(&segment.text);
                        prev.kind = prev.kind.merge(segment.kind);
                        continue;
                    }
                }
            }
            out.push(segment);
        }

        let before = out.len();
        out.retain(|s| s.char_len() >= self.min_chunk_size && !s.text.trim().is_empty());
        if out.len() < before {
            debug!(
                dropped = before - out.len(),
                min_chunk_size = self.min_chunk_size,
                "Dropped undersized chunks"
            );
        }
        out
    }
}

/// Segment text with the given limits and the default minimum chunk size
pub fn segment(
    text: &str,
    max_chunk_size: usize,
    overlap: usize,
    strategy: SegmentStrategy,
) -> Vec<String> {
    let config = ChunkingConfig {
        strategy,
        max_chunk_size,
        overlap,
        ..ChunkingConfig::default()
    };
    Segmenter::new(&config)
        .segment(text)
        .into_iter()
        .map(|s| s.text)
        .collect()
}
