// Worker Identity & State Machine

use serde::{Deserialize, Serialize};

/// Stable identity of one matcher instance (`C1..CN`).
///
/// Assigned at process start from the scaling index and fixed for the
/// process lifetime. Used for logging and result attribution only - all
/// workers share one logical queue, so identity never routes messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerIdentity(String);

impl WorkerIdentity {
    pub fn new(consumer_id: impl Into<String>) -> Self {
        Self(consumer_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Matcher worker cycle states.
///
/// `Publishing` precedes `Acking`: the result publish must be confirmed
/// before the request is acknowledged, otherwise a crash between the two
/// silently loses the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Idle,
    Fetching,
    Matching,
    Publishing,
    Acking,
    ShuttingDown,
}

impl WorkerState {
    /// Whether `next` is a legal successor of this state.
    ///
    /// `Matching -> Acking` skips the publish for duplicate, dead-lettered
    /// or requeued deliveries; `Fetching -> Idle` is an interrupted fetch.
    /// `ShuttingDown` is terminal and reachable from every state.
    pub fn can_transition(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Matching)
                | (Fetching, Idle)
                | (Matching, Publishing)
                | (Matching, Acking)
                | (Publishing, Acking)
                | (Acking, Idle)
                | (_, ShuttingDown)
        )
    }

    /// Validated transition
    pub fn transition(self, next: WorkerState) -> crate::domain::error::Result<WorkerState> {
        if self.can_transition(next) {
            Ok(next)
        } else {
            Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "IDLE"),
            WorkerState::Fetching => write!(f, "FETCHING"),
            WorkerState::Matching => write!(f, "MATCHING"),
            WorkerState::Publishing => write!(f, "PUBLISHING"),
            WorkerState::Acking => write!(f, "ACKING"),
            WorkerState::ShuttingDown => write!(f, "SHUTTING_DOWN"),
        }
    }
}
