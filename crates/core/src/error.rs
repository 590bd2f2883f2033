//! Error types for the Waymark domain.
//!
//! One `thiserror` enum per external collaborator, wrapped by a top-level
//! `Error` the orchestrator and router speak.
//!
//! Two conditions from the domain are deliberately *not* errors: budget
//! denial is a normal branch (a deny decision, not an exception), and a
//! duplicate-corpus creation race absorbed by the index is informational only
//! (logged, never surfaced to callers).

use thiserror::Error;

/// The top-level error type for all Waymark operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Session store errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Semantic index errors ---
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    // --- Completion capability errors ---
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures raised by the session store adapter.
///
/// Any session failure is fatal to the turn being handled: a read failure
/// leaves no conversation context to answer from, and an append failure
/// would silently drop the turn from durable history. The orchestrator
/// propagates both instead of degrading.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("session backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("unknown session {session_id} for user {user_id}")]
    InvalidSessionRef { user_id: String, session_id: String },

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

/// Failures raised by the semantic memory index.
///
/// None of these propagate past the orchestrator: a query failure degrades
/// the request to lexical-only recall, and a write failure is logged as a
/// billing-without-benefit event when budget was already charged.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("semantic index unavailable: {0}")]
    Unavailable(String),

    #[error("memory write failed: {0}")]
    WriteFailed(String),

    #[error("unknown corpus: {0}")]
    CorpusNotFound(String),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

/// Failures raised by the language-completion capability.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("completion backend unavailable: {0}")]
    Unavailable(String),

    #[error("completion rejected: {message} (status: {status_code})")]
    Rejected { status_code: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_displays_correctly() {
        let err = Error::Session(SessionError::InvalidSessionRef {
            user_id: "u-42".into(),
            session_id: "s-missing".into(),
        });
        assert!(err.to_string().contains("u-42"));
        assert!(err.to_string().contains("s-missing"));
    }

    #[test]
    fn index_error_displays_correctly() {
        let err = Error::Index(IndexError::WriteFailed("backend returned 503".into()));
        assert!(err.to_string().contains("write failed"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn completion_error_carries_status() {
        let err = CompletionError::Rejected {
            status_code: 429,
            message: "too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
    }
}
