//! Ollama chat client
//!
//! - Endpoint: POST /api/chat
//! - Streaming responses are newline-delimited JSON objects, each carrying a
//!   `message.content` fragment; the last one has `done: true`

use super::{GenerationError, GenerationProvider, GenerationRequest, TextStream};
use crate::config::GenerationConfig;
use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ollama generation provider
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        // no client-wide timeout: it would also cut long streams
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GenerationError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_request(&self, request: &GenerationRequest, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_prompt(),
                },
            ],
            stream,
            options: ChatOptions {
                temperature: self.temperature,
            },
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout {
                duration_ms: self.timeout.as_millis() as u64,
            }
        } else if e.is_connect() {
            GenerationError::Unavailable(format!("{}: {}", self.base_url, e))
        } else {
            GenerationError::Http(e.to_string())
        }
    }

    async fn post(&self, body: &ChatRequest, timeout: Option<Duration>) -> Result<reqwest::Response, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let mut builder = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Api { status, message });
        }

        Ok(response)
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = self.chat_request(request, false);
        let response = self.post(&body, Some(self.timeout)).await?;

        let reply: ChatChunk = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        if let Some(error) = reply.error {
            return Err(GenerationError::InvalidResponse(error));
        }

        let answer = reply.message.map(|m| m.content).unwrap_or_default();
        debug!(model = %self.model, chars = answer.len(), "Generated answer");
        Ok(answer)
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream, GenerationError> {
        let body = self.chat_request(request, true);
        let response = self.post(&body, None).await?;
        Ok(content_stream(Box::pin(response.bytes_stream())))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

/// One NDJSON line (or the whole non-streaming reply)
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

struct LineState<S> {
    bytes: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, GenerationError>>,
    finished: bool,
}

impl<S> LineState<S> {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line);
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }

        match serde_json::from_slice::<ChatChunk>(line) {
            Ok(chunk) => {
                if let Some(error) = chunk.error {
                    self.pending.push_back(Err(GenerationError::Stream(error)));
                    self.finished = true;
                    return;
                }
                if let Some(message) = chunk.message {
                    if !message.content.is_empty() {
                        self.pending.push_back(Ok(message.content));
                    }
                }
                if chunk.done {
                    self.finished = true;
                }
            }
            Err(e) => {
                self.pending
                    .push_back(Err(GenerationError::InvalidResponse(e.to_string())));
                self.finished = true;
            }
        }
    }
}

/// Turn a byte stream of NDJSON chat chunks into a fragment stream. The
/// stream ends after `done`, the first error, or end of input.
fn content_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = LineState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(GenerationError::Stream(e.to_string())));
                    state.finished = true;
                }
                None => {
                    let rest = std::mem::take(&mut state.buffer);
                    state.handle_line(&rest);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Unpin + Send + 'static {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    async fn collect(stream: TextStream) -> Vec<Result<String, GenerationError>> {
        stream.collect().await
    }

    #[test]
    fn test_generator_creation() {
        let generator = OllamaGenerator::new(&GenerationConfig {
            base_url: "http://localhost:11434/".into(),
            model: "llama3.1".into(),
            ..GenerationConfig::default()
        })
        .unwrap();
        assert_eq!(generator.base_url(), "http://localhost:11434");
        assert_eq!(generator.model_name(), "llama3.1");
    }

    #[test]
    fn test_chat_request_shape() {
        let generator = OllamaGenerator::new(&GenerationConfig::default()).unwrap();
        let body = generator.chat_request(&GenerationRequest::new("be brief", "ctx", "why?"), true);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be brief");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json["messages"][1]["content"].as_str().unwrap().contains("why?"));
    }

    #[tokio::test]
    async fn test_fragments_split_across_chunks() {
        let stream = content_stream(chunks(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"mess",
            "age\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"ignored\"},\"done\":false}\n",
        ]));

        let items = collect(stream).await;
        assert_eq!(items, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let stream = content_stream(chunks(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"end\"},\"done\":true}",
        ]));
        assert_eq!(collect(stream).await, vec![Ok("end".to_string())]);
    }

    #[tokio::test]
    async fn test_error_line_terminates() {
        let stream = content_stream(chunks(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"a\"},\"done\":false}\n",
            "{\"error\":\"model not found\"}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"b\"},\"done\":false}\n",
        ]));
        let items = collect(stream).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("a".to_string()));
        assert_eq!(
            items[1],
            Err(GenerationError::Stream("model not found".to_string()))
        );
    }

    #[tokio::test]
    async fn test_transport_error_terminates() {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"{\"message\":{\"role\":\"assistant\",\"content\":\"x\"}}\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let items = collect(content_stream(stream::iter(parts))).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(GenerationError::Stream(_))));
    }

    #[tokio::test]
    #[ignore] // Requires a running Ollama server
    async fn test_live_generation() {
        let generator = OllamaGenerator::new(&GenerationConfig::default()).unwrap();
        let answer = generator
            .generate(&GenerationRequest::new("Answer in one word.", "", "What color is the sky?"))
            .await
            .unwrap();
        assert!(!answer.is_empty());
    }
}
