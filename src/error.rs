use thiserror::Error;

use crate::types::{SessionId, SessionState};

/// Errors returned by the session engine. Every variant is recoverable:
/// the rejected call leaves all sessions untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Operation not allowed in the session's current state.
    #[error("session {id} is {state}, expected {expected}")]
    InvalidState {
        id: SessionId,
        state: SessionState,
        expected: &'static str,
    },

    /// Another session is still running under the same controller.
    #[error("session {active} is still running")]
    Conflict { active: SessionId },

    /// Empty input list, malformed target or inputs the strategy cannot probe.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
