//! Deterministic providers shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use ragline::embedding::{EmbeddingError, EmbeddingProvider};
use ragline::generation::{GenerationError, GenerationProvider, GenerationRequest, TextStream};
use ragline::segment::ChunkKind;
use ragline::storage::NewChunk;
use ragline::vector::normalize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf29ce484222325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

/// Bag-of-words embedder: each token of three or more characters adds to a
/// hashed bucket. Texts sharing words end up close.
pub struct HashEmbedder {
    dimension: usize,
    poison: Option<String>,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            poison: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail any batch containing `marker`
    pub fn with_poison(mut self, marker: &str) -> Self {
        self.poison = Some(marker.to_string());
        self
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
        {
            vector[(fnv1a(token) % self.dimension as u64) as usize] += 1.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        normalize(&vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.poison {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(EmbeddingError::Inference(format!("refusing '{}'", marker)));
            }
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hash-bow"
    }
}

/// Embedder returning fixed vectors for known texts
pub struct MappedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

impl MappedEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for MappedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.fallback.len()
    }

    fn model_name(&self) -> &str {
        "mapped"
    }
}

/// Set when the generator's fragment stream is dropped
pub struct DropFlag(Arc<AtomicBool>);

impl DropFlag {
    fn touch(&self) {}
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Generator replaying fixed fragments
pub struct ScriptedGenerator {
    fragments: Vec<String>,
    /// Error emitted after the fragments
    fail_after: Option<String>,
    /// Keep the stream open after the fragments
    hang: bool,
    pub dropped: Arc<AtomicBool>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail_after: None,
            hang: false,
            dropped: Arc::new(AtomicBool::new(false)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_after(mut self, message: &str) -> Self {
        self.fail_after = Some(message.to_string());
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(message) = &self.fail_after {
            return Err(GenerationError::Stream(message.clone()));
        }
        Ok(self.fragments.concat())
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut items: Vec<Result<String, GenerationError>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.fail_after {
            items.push(Err(GenerationError::Stream(message.clone())));
        }

        let guard = DropFlag(Arc::clone(&self.dropped));
        let fragments = stream::iter(items).map(move |item| {
            guard.touch();
            item
        });

        if self.hang {
            Ok(fragments.chain(stream::pending()).boxed())
        } else {
            Ok(fragments.boxed())
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn chunk(source_id: &str, position: usize, text: &str, content: Vec<f32>, intents: Vec<Vec<f32>>) -> NewChunk {
    NewChunk {
        source_id: source_id.to_string(),
        position,
        text: text.to_string(),
        kind: ChunkKind::Prose,
        metadata: serde_json::json!({}),
        content_vector: content,
        intent_vectors: intents,
    }
}

/// Paragraph of numbered sentences, about `chars` long
pub fn paragraph(label: &str, chars: usize) -> String {
    let mut text = String::new();
    let mut n = 0;
    while text.chars().count() < chars {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&format!("{} sentence number {} talks about the topic.", label, n));
        n += 1;
    }
    text
}
