//! Streaming event protocol
//!
//! A stream carries at most one `sources` event, before any `chunk`, and ends
//! with exactly one `done` or `error`.

use serde::{Deserialize, Serialize};

/// Citation metadata for one context entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: String,
    /// 1-based ordinal within the source, as shown in the citation marker
    pub ordinal: usize,
    pub chunk_id: i64,
    /// Hybrid similarity to the query
    pub similarity: f32,
    /// Added by adjacent-chunk expansion
    pub expanded: bool,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Sources { sources: Vec<SourceRef> },
    Chunk { text: String },
    Done { took_ms: u64 },
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }

    /// Server-sent-events frame: `data: <json>` and a blank line
    pub fn to_sse(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"type\":\"error\",\"message\":{}}}",
                serde_json::Value::String(format!("event serialization failed: {}", e))
            )
        });
        format!("data: {}\n\n", json)
    }
}
