//! Request state machine
//!
//! Valid transitions:
//! 1. Idle            → Searching
//! 2. Searching       → NoResults | ContextBuilding
//! 3. ContextBuilding → Generating
//! 4. Generating      → Completed
//! 5. NoResults       → Completed
//! 6. any non-terminal → Errored

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: RagState, to: RagState },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagState {
    #[default]
    Idle,
    Searching,
    /// Nothing survived thresholding; answered with the fallback message
    NoResults,
    ContextBuilding,
    Generating,
    /// Terminal
    Completed,
    /// Terminal
    Errored,
}

impl RagState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RagState::Completed | RagState::Errored)
    }

    /// Attempt a transition, returning the new state
    pub fn transition(self, to: RagState) -> Result<RagState, StateError> {
        use RagState::*;

        let valid = match (self, to) {
            (from, Errored) => !from.is_terminal(),
            (Idle, Searching) => true,
            (Searching, NoResults) | (Searching, ContextBuilding) => true,
            (ContextBuilding, Generating) => true,
            (Generating, Completed) => true,
            (NoResults, Completed) => true,
            _ => false,
        };

        if valid {
            Ok(to)
        } else {
            Err(StateError::InvalidTransition { from: self, to })
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RagState::Idle => "Idle",
            RagState::Searching => "Searching",
            RagState::NoResults => "No Results",
            RagState::ContextBuilding => "Building Context",
            RagState::Generating => "Generating",
            RagState::Completed => "Completed",
            RagState::Errored => "Errored",
        }
    }
}

/// Tracks one request's state and the path it took
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    current: RagState,
    history: Vec<RagState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> RagState {
        self.current
    }

    /// States visited so far, excluding the current one
    pub fn history(&self) -> &[RagState] {
        &self.history
    }

    pub fn advance(&mut self, to: RagState) -> Result<RagState, StateError> {
        let next = self.current.transition(to)?;
        self.history.push(self.current);
        self.current = next;
        Ok(next)
    }

    /// Move to `Errored` unless already terminal
    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            self.history.push(self.current);
            self.current = RagState::Errored;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RagState::*;

    #[test]
    fn test_happy_paths() {
        let mut tracker = StateTracker::new();
        for state in [Searching, ContextBuilding, Generating, Completed] {
            tracker.advance(state).unwrap();
        }
        assert_eq!(tracker.current(), Completed);
        assert_eq!(tracker.history(), &[Idle, Searching, ContextBuilding, Generating]);

        let mut tracker = StateTracker::new();
        tracker.advance(Searching).unwrap();
        tracker.advance(NoResults).unwrap();
        tracker.advance(Completed).unwrap();
        assert!(tracker.current().is_terminal());
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(
            Idle.transition(Generating),
            Err(StateError::InvalidTransition {
                from: Idle,
                to: Generating
            })
        );
        assert!(NoResults.transition(Generating).is_err());
        assert!(Completed.transition(Searching).is_err());
        assert!(Completed.transition(Errored).is_err());
        assert!(Errored.transition(Errored).is_err());
    }

    #[test]
    fn test_errored_from_any_non_terminal() {
        for state in [Idle, Searching, NoResults, ContextBuilding, Generating] {
            assert_eq!(state.transition(Errored), Ok(Errored));
        }
    }

    #[test]
    fn test_fail_is_idempotent() {
        let mut tracker = StateTracker::new();
        tracker.advance(Searching).unwrap();
        tracker.fail();
        tracker.fail();
        assert_eq!(tracker.current(), Errored);
        assert_eq!(tracker.history(), &[Idle, Searching]);
    }
}
