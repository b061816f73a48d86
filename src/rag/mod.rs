//! Retrieval-augmented answering: request state machine, streaming events
//! and the orchestrating [`RagEngine`]

mod events;
mod orchestrator;
mod state;

pub use events::{SourceRef, StreamEvent};
pub use orchestrator::{AskRequest, AskResponse, RagEngine, SearchHit, SearchResponse, INSUFFICIENT_INFORMATION};
pub use state::{RagState, StateError, StateTracker};
