//! Context assembly: selection, adjacency expansion, overlap trimming and
//! citation-annotated serialization under a character budget

use crate::config::ContextConfig;
use crate::retrieval::{jaccard, mmr_select, sort_by_score, tokenize, Candidate};
use crate::storage::{StoreError, VectorStore};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use tracing::debug;

/// Separator line between context entries
pub const SEPARATOR: &str = "\n\n---\n\n";

/// Appended to a first entry cut down to fit the budget
pub const TRUNCATION_MARKER: &str = " [...]";

/// Assembled context and the candidates it cites, in context order
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub sources: Vec<Candidate>,
    /// The first entry was cut to fit the budget
    pub truncated: bool,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Per-call assembly options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssembleOptions {
    pub max_context_length: usize,
    pub expand_adjacent: bool,
    pub diversify: bool,
}

impl From<&ContextConfig> for AssembleOptions {
    fn from(config: &ContextConfig) -> Self {
        Self {
            max_context_length: config.max_context_length,
            expand_adjacent: config.expand_adjacent,
            diversify: config.diversify,
        }
    }
}

pub struct ContextAssembler {
    overlap_threshold: f32,
    adjacent_discount: f32,
    mmr_lambda: f32,
    defaults: AssembleOptions,
}

impl ContextAssembler {
    pub fn new(config: &ContextConfig, mmr_lambda: f32) -> Self {
        Self {
            overlap_threshold: config.overlap_threshold,
            adjacent_discount: config.adjacent_discount,
            mmr_lambda,
            defaults: AssembleOptions::from(config),
        }
    }

    pub fn defaults(&self) -> AssembleOptions {
        self.defaults
    }

    /// Assemble with the configured options
    pub fn assemble(&self, candidates: Vec<Candidate>, store: &dyn VectorStore) -> Result<AssembledContext, StoreError> {
        self.assemble_with(candidates, store, self.defaults)
    }

    pub fn assemble_with(
        &self,
        candidates: Vec<Candidate>,
        store: &dyn VectorStore,
        options: AssembleOptions,
    ) -> Result<AssembledContext, StoreError> {
        let mut items = candidates;

        if options.diversify {
            let k = items.len();
            items = mmr_select(items, k, self.mmr_lambda);
        }

        if options.expand_adjacent {
            items = self.expand(items, store)?;
            order_by_document(&mut items);
        }

        let items = self.trim_overlap(items);
        let assembled = serialize(items, options.max_context_length);

        debug!(
            entries = assembled.sources.len(),
            chars = assembled.text.chars().count(),
            truncated = assembled.truncated,
            "Assembled context"
        );
        Ok(assembled)
    }

    /// Add each candidate's ±1 neighbours from the same source. Neighbours
    /// take the anchor's score times the adjacency discount; a neighbour
    /// shared by several anchors keeps the highest.
    fn expand(&self, anchors: Vec<Candidate>, store: &dyn VectorStore) -> Result<Vec<Candidate>, StoreError> {
        let anchor_ids: AHashSet<i64> = anchors.iter().map(|c| c.chunk_id).collect();
        let mut added: Vec<Candidate> = Vec::new();
        let mut added_index: AHashMap<i64, usize> = AHashMap::new();

        for anchor in &anchors {
            let range = anchor.position.saturating_sub(1)..=anchor.position.saturating_add(1);
            let score = anchor.effective_score() * self.adjacent_discount;

            for chunk in store.get_by_range(&anchor.source_id, range)? {
                if anchor_ids.contains(&chunk.id) {
                    continue;
                }
                match added_index.get(&chunk.id) {
                    Some(&slot) => {
                        if added[slot].hybrid_score < score {
                            added[slot].hybrid_score = score;
                        }
                    }
                    None => {
                        let mut neighbour = Candidate::from_chunk(chunk, anchor.distance);
                        neighbour.hybrid_score = score;
                        neighbour.expanded = true;
                        added_index.insert(neighbour.chunk_id, added.len());
                        added.push(neighbour);
                    }
                }
            }
        }

        let mut items = anchors;
        items.extend(added);
        Ok(items)
    }

    /// Drop an item whose overlap with the previous kept item exceeds the
    /// threshold
    fn trim_overlap(&self, items: Vec<Candidate>) -> Vec<Candidate> {
        let mut kept: Vec<Candidate> = Vec::with_capacity(items.len());
        let mut last_tokens: Option<AHashSet<String>> = None;

        for item in items {
            let tokens = tokenize(&item.text);
            if let Some(previous) = &last_tokens {
                if jaccard(previous, &tokens) > self.overlap_threshold {
                    continue;
                }
            }
            last_tokens = Some(tokens);
            kept.push(item);
        }
        kept
    }
}

/// Group items by source, sources ordered by their best score, and within a
/// source by position
fn order_by_document(items: &mut [Candidate]) {
    sort_by_score(items);

    let mut source_rank: AHashMap<String, usize> = AHashMap::new();
    for item in items.iter() {
        let next = source_rank.len();
        source_rank.entry(item.source_id.clone()).or_insert(next);
    }

    items.sort_by(|a, b| {
        source_rank[&a.source_id]
            .cmp(&source_rank[&b.source_id])
            .then(a.position.cmp(&b.position))
    });
}

fn entry(item: &Candidate, text: &str) -> String {
    format!("{}\n{}", item.citation(), text)
}

/// Concatenate entries under `max_len` characters. The first item is always
/// included, truncated if needed; later items stop at the first overflow.
fn serialize(items: Vec<Candidate>, max_len: usize) -> AssembledContext {
    let mut text = String::new();
    let mut total = 0usize;
    let mut sources = Vec::new();
    let mut truncated = false;
    let separator_len = SEPARATOR.chars().count();

    for item in items {
        if sources.is_empty() {
            let full = entry(&item, &item.text);
            let full_len = full.chars().count();
            if full_len <= max_len {
                text = full;
                total = full_len;
            } else {
                text = truncate_first(&item, max_len);
                total = text.chars().count();
                truncated = true;
            }
            sources.push(item);
            continue;
        }

        let next = entry(&item, &item.text);
        let next_len = next.chars().count();
        if total + separator_len + next_len > max_len {
            break;
        }
        text.push_str(SEPARATOR);
        text.push_str(&next);
        total += separator_len + next_len;
        sources.push(item);
    }

    AssembledContext {
        text,
        sources,
        truncated,
    }
}

fn truncate_first(item: &Candidate, max_len: usize) -> String {
    let header_len = item.citation().chars().count() + 1;
    let marker_len = TRUNCATION_MARKER.chars().count();

    if header_len + marker_len >= max_len {
        return entry(item, &item.text).chars().take(max_len).collect();
    }

    let keep = max_len - header_len - marker_len;
    let body: String = item.text.chars().take(keep).collect();
    entry(item, &format!("{}{}", body, TRUNCATION_MARKER))
}
