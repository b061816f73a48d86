//! Ask/search orchestration
//!
//! `ask` and `ask_stream` share one pipeline: validate, search, assemble
//! context, generate. The streaming form is a pull-based stream; dropping it
//! drops the generator's fragment stream and its connection.

use super::events::{SourceRef, StreamEvent};
use super::state::{RagState, StateTracker};
use crate::config::Config;
use crate::context::{AssembledContext, ContextAssembler};
use crate::embedding::EmbeddingProvider;
use crate::error::{RaglineError, Result};
use crate::evaluation::{answer_faithfulness, hallucination_check, FaithfulnessReport, HallucinationReport};
use crate::generation::{GenerationProvider, GenerationRequest, TextStream};
use crate::retrieval::{Candidate, HybridSearcher};
use crate::segment::ChunkKind;
use crate::storage::VectorStore;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Answer returned when nothing relevant was retrieved
pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information in the indexed documents to answer that question.";

const PREVIEW_CHARS: usize = 160;

/// Parameters for one question. Unset fields fall back to configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub top_k: Option<usize>,
    pub min_similarity: Option<f32>,
    pub max_answer_length: Option<usize>,
    pub system_prompt: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    pub fn with_max_answer_length(mut self, max: usize) -> Self {
        self.max_answer_length = Some(max);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub took_ms: u64,
    /// Advisory; absent for the fallback answer
    pub faithfulness: Option<FaithfulnessReport>,
    pub hallucination: Option<HallucinationReport>,
}

/// One retrieval result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub source_id: String,
    pub position: usize,
    pub text: String,
    pub kind: ChunkKind,
    /// Hybrid similarity to the query
    pub similarity: f32,
    /// Final ranking score
    pub score: f32,
    pub metadata: serde_json::Value,
}

impl From<Candidate> for SearchHit {
    fn from(candidate: Candidate) -> Self {
        Self {
            score: candidate.effective_score(),
            chunk_id: candidate.chunk_id,
            source_id: candidate.source_id,
            position: candidate.position,
            text: candidate.text,
            kind: candidate.kind,
            similarity: candidate.hybrid_score,
            metadata: candidate.metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub took_ms: u64,
}

fn source_ref(candidate: &Candidate) -> SourceRef {
    SourceRef {
        source_id: candidate.source_id.clone(),
        ordinal: candidate.position + 1,
        chunk_id: candidate.chunk_id,
        similarity: candidate.hybrid_score,
        expanded: candidate.expanded,
        preview: candidate.preview(PREVIEW_CHARS),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Result of the shared retrieve-and-assemble stage
enum Prepared {
    NoResults,
    Ready {
        context: AssembledContext,
        request: GenerationRequest,
    },
}

pub struct RagEngine {
    searcher: HybridSearcher,
    assembler: ContextAssembler,
    generator: Arc<dyn GenerationProvider>,
    system_prompt: String,
    default_top_k: usize,
    max_top_k: usize,
    default_min_similarity: f32,
    answer_checks: bool,
}

impl RagEngine {
    pub fn new(searcher: HybridSearcher, generator: Arc<dyn GenerationProvider>, config: &Config) -> Self {
        Self {
            searcher,
            assembler: ContextAssembler::new(&config.context, config.retrieval.mmr_lambda),
            generator,
            system_prompt: config.generation.system_prompt.clone(),
            default_top_k: config.retrieval.default_top_k,
            max_top_k: config.retrieval.max_top_k,
            default_min_similarity: config.retrieval.default_min_similarity,
            answer_checks: true,
        }
    }

    /// Wire a searcher and engine from configuration. The generator also
    /// drives query expansion.
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self> {
        let searcher = HybridSearcher::new(embedder, store, &config.retrieval, &config.rerank)?
            .with_generator(Arc::clone(&generator));
        Ok(Self::new(searcher, generator, config))
    }

    /// Toggle the advisory faithfulness and hallucination checks on `ask`
    pub fn with_answer_checks(mut self, enabled: bool) -> Self {
        self.answer_checks = enabled;
        self
    }

    pub fn searcher(&self) -> &HybridSearcher {
        &self.searcher
    }

    fn resolve(&self, query: &str, top_k: Option<usize>, min_similarity: Option<f32>) -> Result<(usize, f32)> {
        if query.trim().is_empty() {
            return Err(RaglineError::Validation("Question cannot be empty".to_string()));
        }

        let top_k = top_k.unwrap_or(self.default_top_k);
        if top_k == 0 || top_k > self.max_top_k {
            return Err(RaglineError::Validation(format!(
                "top_k must be between 1 and {}, got {}",
                self.max_top_k, top_k
            )));
        }

        let min_similarity = min_similarity.unwrap_or(self.default_min_similarity);
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(RaglineError::Validation(format!(
                "min_similarity must be between 0 and 1, got {}",
                min_similarity
            )));
        }

        Ok((top_k, min_similarity))
    }

    /// Retrieval without generation
    pub async fn search(&self, query: &str, top_k: Option<usize>, min_similarity: Option<f32>) -> Result<SearchResponse> {
        let start = Instant::now();
        let request_id = Uuid::new_v4();
        let (top_k, min_similarity) = self.resolve(query, top_k, min_similarity)?;

        let candidates = self.searcher.search(query, top_k, min_similarity).await?;
        let took_ms = elapsed_ms(start);
        info!(request_id = %request_id, results = candidates.len(), took_ms, "Search complete");

        Ok(SearchResponse {
            results: candidates.into_iter().map(SearchHit::from).collect(),
            took_ms,
        })
    }

    /// Validate, search and assemble. Leaves the tracker in `NoResults` or
    /// `ContextBuilding`.
    async fn prepare(&self, ask: &AskRequest, tracker: &mut StateTracker, request_id: Uuid) -> Result<Prepared> {
        let (top_k, min_similarity) = self.resolve(&ask.question, ask.top_k, ask.min_similarity)?;

        tracker.advance(RagState::Searching)?;
        let candidates = self.searcher.search(&ask.question, top_k, min_similarity).await?;
        debug!(request_id = %request_id, candidates = candidates.len(), "Search stage done");

        if candidates.is_empty() {
            tracker.advance(RagState::NoResults)?;
            return Ok(Prepared::NoResults);
        }

        tracker.advance(RagState::ContextBuilding)?;
        let context = self.assembler.assemble(candidates, self.searcher.store().as_ref())?;
        if context.is_empty() {
            return Err(RaglineError::Validation(
                "Context budget too small to hold any source".to_string(),
            ));
        }

        let system_prompt = ask.system_prompt.as_deref().unwrap_or(&self.system_prompt);
        let request = GenerationRequest::new(system_prompt, context.text.clone(), ask.question.trim())
            .with_max_answer_length(ask.max_answer_length);

        Ok(Prepared::Ready { context, request })
    }

    /// Answer a question and return the complete response
    pub async fn ask(&self, ask: AskRequest) -> Result<AskResponse> {
        let start = Instant::now();
        let request_id = Uuid::new_v4();
        let mut tracker = StateTracker::new();

        let result = self.run_ask(&ask, &mut tracker, request_id, start).await;
        if let Err(e) = &result {
            tracker.fail();
            warn!(request_id = %request_id, state = ?tracker.current(), "Ask failed: {}", e);
        }
        result
    }

    async fn run_ask(
        &self,
        ask: &AskRequest,
        tracker: &mut StateTracker,
        request_id: Uuid,
        start: Instant,
    ) -> Result<AskResponse> {
        let (context, request) = match self.prepare(ask, tracker, request_id).await? {
            Prepared::NoResults => {
                tracker.advance(RagState::Completed)?;
                let took_ms = elapsed_ms(start);
                info!(request_id = %request_id, took_ms, "No relevant sources, answered with fallback");
                return Ok(AskResponse {
                    answer: INSUFFICIENT_INFORMATION.to_string(),
                    sources: Vec::new(),
                    took_ms,
                    faithfulness: None,
                    hallucination: None,
                });
            }
            Prepared::Ready { context, request } => (context, request),
        };

        tracker.advance(RagState::Generating)?;
        let answer = self.generator.generate(&request).await?;
        tracker.advance(RagState::Completed)?;

        let (faithfulness, hallucination) = if self.answer_checks {
            let (faithfulness, hallucination) = check_answer(&answer, &context);
            if !faithfulness.is_faithful {
                warn!(
                    request_id = %request_id,
                    score = faithfulness.score,
                    unsupported = faithfulness.unsupported.len(),
                    "Answer may not be grounded in context"
                );
            }
            if hallucination.is_flagged() {
                warn!(
                    request_id = %request_id,
                    claims = ?hallucination.absolute_claims,
                    numbers = ?hallucination.unsupported_numbers,
                    "Answer contains claims absent from sources"
                );
            }
            (Some(faithfulness), Some(hallucination))
        } else {
            (None, None)
        };

        let took_ms = elapsed_ms(start);
        info!(
            request_id = %request_id,
            sources = context.sources.len(),
            answer_chars = answer.chars().count(),
            took_ms,
            "Ask complete"
        );

        Ok(AskResponse {
            answer,
            sources: context.sources.iter().map(source_ref).collect(),
            took_ms,
            faithfulness,
            hallucination,
        })
    }

    /// Answer a question as an event stream: `sources`, then `chunk`s as
    /// fragments arrive, then `done`. With no relevant sources the stream is
    /// one fallback `chunk` and `done`. Any failure ends the stream with a
    /// single `error` event.
    pub fn ask_stream(&self, ask: AskRequest) -> BoxStream<'_, StreamEvent> {
        let state = StreamState {
            engine: self,
            request: Some(ask),
            request_id: Uuid::new_v4(),
            start: Instant::now(),
            tracker: StateTracker::new(),
            pending: VecDeque::new(),
            fragments: None,
            finished: false,
        };

        stream::unfold(state, |mut st| async move {
            loop {
                if let Some(event) = st.pending.pop_front() {
                    return Some((event, st));
                }
                if st.finished {
                    return None;
                }

                if let Some(ask) = st.request.take() {
                    st.open(ask).await;
                    continue;
                }

                let Some(fragments) = st.fragments.as_mut() else {
                    st.finished = true;
                    continue;
                };

                let next = fragments.next().await;
                match next {
                    Some(Ok(text)) if text.is_empty() => {}
                    Some(Ok(text)) => return Some((StreamEvent::Chunk { text }, st)),
                    Some(Err(e)) => st.fail(RaglineError::Generation(e)),
                    None => st.complete(),
                }
            }
        })
        .boxed()
    }
}

fn check_answer(answer: &str, context: &AssembledContext) -> (FaithfulnessReport, HallucinationReport) {
    let faithfulness = answer_faithfulness(answer, &context.text);
    let sources: Vec<&str> = context.sources.iter().map(|c| c.text.as_str()).collect();
    let hallucination = hallucination_check(answer, &sources);
    (faithfulness, hallucination)
}

/// Per-request state of a streaming answer
struct StreamState<'a> {
    engine: &'a RagEngine,
    /// Taken on first poll
    request: Option<AskRequest>,
    request_id: Uuid,
    start: Instant,
    tracker: StateTracker,
    pending: VecDeque<StreamEvent>,
    fragments: Option<TextStream>,
    finished: bool,
}

impl StreamState<'_> {
    /// Run retrieval and open the generator stream, queueing the events
    /// that precede the first fragment
    async fn open(&mut self, ask: AskRequest) {
        let prepared = self.engine.prepare(&ask, &mut self.tracker, self.request_id).await;

        match prepared {
            Ok(Prepared::NoResults) => {
                self.pending.push_back(StreamEvent::Chunk {
                    text: INSUFFICIENT_INFORMATION.to_string(),
                });
                self.complete();
            }
            Ok(Prepared::Ready { context, request }) => {
                if let Err(e) = self.tracker.advance(RagState::Generating) {
                    self.fail(e.into());
                    return;
                }
                match self.engine.generator.generate_stream(&request).await {
                    Ok(fragments) => {
                        self.pending.push_back(StreamEvent::Sources {
                            sources: context.sources.iter().map(source_ref).collect(),
                        });
                        self.fragments = Some(fragments);
                    }
                    Err(e) => self.fail(e.into()),
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn complete(&mut self) {
        self.fragments = None;
        if let Err(e) = self.tracker.advance(RagState::Completed) {
            self.fail(e.into());
            return;
        }
        let took_ms = elapsed_ms(self.start);
        info!(request_id = %self.request_id, took_ms, "Streaming answer complete");
        self.pending.push_back(StreamEvent::Done { took_ms });
        self.finished = true;
    }

    fn fail(&mut self, error: RaglineError) {
        self.fragments = None;
        self.tracker.fail();
        warn!(request_id = %self.request_id, "Streaming answer failed: {}", error);
        self.pending.push_back(StreamEvent::Error {
            message: error.to_string(),
        });
        self.finished = true;
    }
}
