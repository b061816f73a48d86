//! Text generation providers
//!
//! [`GenerationProvider`] is consumed by the orchestrator for answers, by the
//! ingestor for hypothetical questions and by query expansion for paraphrases.

mod ollama;

pub use ollama::OllamaGenerator;

use crate::config::{GenerationConfig, RetryConfig};
use crate::embedding::RetryPolicy;
use crate::error::Retryable;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Generation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Generation provider unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Stream interrupted: {0}")]
    Stream(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Generation provider misconfigured: {0}")]
    Config(String),
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Timeout { .. } => true,
            GenerationError::Unavailable(_) => true,
            GenerationError::Http(_) => true,
            GenerationError::Stream(_) => true,
            GenerationError::Api { status, .. } => *status == 429 || *status >= 500,

            GenerationError::InvalidResponse(_) => false,
            GenerationError::Config(_) => false,
        }
    }
}

/// Finite, consume-once stream of answer fragments
pub type TextStream = BoxStream<'static, Result<String, GenerationError>>;

/// One generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub context: String,
    pub question: String,
    /// Soft limit on answer length in characters
    pub max_answer_length: Option<usize>,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, context: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            context: context.into(),
            question: question.into(),
            max_answer_length: None,
        }
    }

    pub fn with_max_answer_length(mut self, max: Option<usize>) -> Self {
        self.max_answer_length = max;
        self
    }

    /// User turn sent to the model
    pub fn user_prompt(&self) -> String {
        let mut prompt = String::new();
        if !self.context.is_empty() {
            prompt.push_str("Context:\n");
            prompt.push_str(&self.context);
            prompt.push_str("\n\n");
        }
        prompt.push_str("Question: ");
        prompt.push_str(&self.question);
        if let Some(max) = self.max_answer_length {
            prompt.push_str(&format!("\n\nAnswer in at most {} characters.", max));
        }
        prompt
    }
}

/// Trait for generation providers
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a complete answer
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Generate an answer as a fragment stream. Dropping the stream releases
    /// the underlying connection.
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream, GenerationError> {
        let answer = self.generate(request).await?;
        Ok(stream::once(async move { Ok(answer) }).boxed())
    }

    fn model_name(&self) -> &str;
}

const QUESTION_PROMPT: &str = "You write questions that a passage answers. \
Reply with one question per line and nothing else.";

/// Ask the generator for `count` hypothetical questions `text` answers
pub async fn hypothetical_questions(
    generator: &dyn GenerationProvider,
    text: &str,
    count: usize,
) -> Result<Vec<String>, GenerationError> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let request = GenerationRequest::new(
        QUESTION_PROMPT,
        text,
        format!("Write {} distinct questions this passage answers.", count),
    );
    let reply = generator.generate(&request).await?;
    Ok(parse_lines(&reply, count))
}

/// One item per non-empty line, with list markers and quotes stripped
pub(crate) fn parse_lines(reply: &str, limit: usize) -> Vec<String> {
    reply
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | '•'))
                .trim()
                .trim_matches('"')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .take(limit)
        .collect()
}

/// Build the configured provider wrapped in retry
pub fn build_generator(
    generation: &GenerationConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn GenerationProvider>, GenerationError> {
    let base: Arc<dyn GenerationProvider> = match generation.provider.as_str() {
        "ollama" => Arc::new(OllamaGenerator::new(generation)?),
        other => {
            return Err(GenerationError::Config(format!(
                "unsupported generation provider '{}'",
                other
            )))
        }
    };
    Ok(Arc::new(RetryingGenerator::new(base, RetryPolicy::from_config(retry))))
}

/// Generation provider wrapper that retries transient failures. Streams are
/// retried only while opening; a stream that fails midway is not restarted.
pub struct RetryingGenerator {
    inner: Arc<dyn GenerationProvider>,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn GenerationProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl GenerationProvider for RetryingGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.policy
            .run("generate", || self.inner.generate(request))
            .await
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream, GenerationError> {
        self.policy
            .run("generate_stream", || self.inner.generate_stream(request))
            .await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: String,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(GenerationError::Unavailable("warming up".into()));
            }
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_user_prompt_layout() {
        let request = GenerationRequest::new("sys", "[a #1]\nfacts", "What?").with_max_answer_length(Some(200));
        let prompt = request.user_prompt();
        assert!(prompt.starts_with("Context:\n[a #1]\nfacts\n\nQuestion: What?"));
        assert!(prompt.ends_with("at most 200 characters."));

        let bare = GenerationRequest::new("sys", "", "Why?").user_prompt();
        assert_eq!(bare, "Question: Why?");
    }

    #[test]
    fn test_parse_lines_strips_markers() {
        let reply = "1. How is a chunk stored?\n\n- What does RRF do?\n\"Why normalize vectors?\"\n4) extra";
        assert_eq!(
            parse_lines(reply, 3),
            vec![
                "How is a chunk stored?",
                "What does RRF do?",
                "Why normalize vectors?"
            ]
        );
    }

    #[test]
    fn test_retryable_status_codes() {
        let api = |status| GenerationError::Api {
            status,
            message: String::new(),
        };
        assert!(api(503).is_retryable());
        assert!(api(429).is_retryable());
        assert!(!api(404).is_retryable());
        assert!(!GenerationError::InvalidResponse("bad json".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_hypothetical_questions() {
        let generator = Scripted {
            reply: "What is hybrid scoring?\nHow are weights chosen?".into(),
            failures: AtomicUsize::new(0),
        };
        let questions = hypothetical_questions(&generator, "passage", 3).await.unwrap();
        assert_eq!(questions.len(), 2);
        assert!(hypothetical_questions(&generator, "passage", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_stream_and_retry() {
        let inner = Arc::new(Scripted {
            reply: "answer".into(),
            failures: AtomicUsize::new(1),
        });
        let policy = RetryPolicy::from_config(&crate::config::RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 1,
        });
        let generator = RetryingGenerator::new(inner, policy);

        let mut stream = generator
            .generate_stream(&GenerationRequest::new("s", "c", "q"))
            .await
            .unwrap();
        assert_eq!(stream.next().await, Some(Ok("answer".to_string())));
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_build_generator_rejects_unknown_provider() {
        let config = GenerationConfig {
            provider: "carrier-pigeon".into(),
            ..Default::default()
        };
        assert!(matches!(
            build_generator(&config, &RetryConfig::default()),
            Err(GenerationError::Config(_))
        ));
        assert!(build_generator(&GenerationConfig::default(), &RetryConfig::default()).is_ok());
    }
}
