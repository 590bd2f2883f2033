//! Session and Turn domain types plus the session store contract.
//!
//! A session is the short-lived conversational state for one user in one
//! application: an ordered sequence of turns and an open-ended key/value
//! state map. Sessions are created lazily on first access and live until an
//! external operator deletes them — this core never expires them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Opaque identifier for a user. Users are never deleted by this core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully-qualified session reference: (application, user, session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub app: String,
    pub user_id: UserId,
    pub session_id: SessionId,
}

impl SessionKey {
    pub fn new(app: impl Into<String>, user_id: UserId, session_id: SessionId) -> Self {
        Self {
            app: app.into(),
            user_id,
            session_id,
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.app, self.user_id, self.session_id)
    }
}

/// The role of a turn's author in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant
    Assistant,
    /// System instructions
    System,
}

/// A single turn in a session: who said what, and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a user turn stamped now.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant turn stamped now.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system turn stamped now.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A session: ordered turns plus a mutable key/value state map.
///
/// State keys are scoped by convention: bare keys are session-local, a
/// `user:` prefix marks state the backend shares across the user's sessions,
/// and a `temp:` prefix marks ephemeral state. Adapters pass prefixes through
/// untouched — scoping semantics belong to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,

    /// Ordered turns, append-only, oldest first.
    pub turns: Vec<Turn>,

    /// Open-ended state, last-write-wins per key.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub state: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session with the bookkeeping state seeded.
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        let mut state = serde_json::Map::new();
        state.insert("session_type".into(), "conversational".into());
        state.insert("created_at".into(), now.to_rfc3339().into());
        state.insert("user_id".into(), key.user_id.0.clone().into());
        state.insert("conversation_count".into(), 0.into());

        Self {
            key,
            turns: Vec::new(),
            state,
            created_at: now,
        }
    }

    /// The most recent `limit` turns, oldest of the window first.
    pub fn recent_turns(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }
}

/// Lightweight session listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub turn_count: usize,
}

/// The durable conversation-state store contract.
///
/// All operations are remote calls; none are retried by the adapter — retry
/// policy, if any, belongs to the transport layer underneath. Implementations
/// must preserve submission order for appends to one session (see
/// `waymark-session`'s ordered wrapper, which enforces this on the client
/// side rather than trusting backend ordering).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "rest", "in-memory").
    fn name(&self) -> &str;

    /// Fetch the session, creating it (with seeded bookkeeping state) if
    /// absent. A `None` session id means "mint a fresh one".
    async fn get_or_create_session(
        &self,
        app: &str,
        user_id: &UserId,
        session_id: Option<&SessionId>,
    ) -> std::result::Result<Session, SessionError>;

    /// Append a turn to the ordered sequence. No dedup. Unknown session →
    /// `InvalidSessionRef`.
    async fn append_turn(
        &self,
        key: &SessionKey,
        turn: Turn,
    ) -> std::result::Result<(), SessionError>;

    /// The most recent `limit` turns, newest-last. Restartable, not cached.
    async fn get_recent_turns(
        &self,
        key: &SessionKey,
        limit: usize,
    ) -> std::result::Result<Vec<Turn>, SessionError>;

    /// Set a state value, last-write-wins.
    async fn set_state(
        &self,
        key: &SessionKey,
        state_key: &str,
        value: serde_json::Value,
    ) -> std::result::Result<(), SessionError>;

    /// Read a state value, `None` if unset.
    async fn get_state(
        &self,
        key: &SessionKey,
        state_key: &str,
    ) -> std::result::Result<Option<serde_json::Value>, SessionError>;

    /// Summaries of the user's live sessions in this application.
    async fn list_sessions(
        &self,
        app: &str,
        user_id: &UserId,
    ) -> std::result::Result<Vec<SessionSummary>, SessionError>;

    /// Remove a session. Returns false (not an error) when it did not exist.
    /// Operator-facing; the request path never calls this.
    async fn delete_session(&self, key: &SessionKey) -> std::result::Result<bool, SessionError>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> std::result::Result<(), SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_seeds_bookkeeping_state() {
        let key = SessionKey::new("waymark", UserId::from("u-1"), SessionId::new());
        let session = Session::new(key);

        assert_eq!(session.state["session_type"], "conversational");
        assert_eq!(session.state["user_id"], "u-1");
        assert_eq!(session.state["conversation_count"], 0);
        assert!(session.state.contains_key("created_at"));
        assert!(session.turns.is_empty());
    }

    #[test]
    fn recent_turns_windows_from_the_end() {
        let key = SessionKey::new("waymark", UserId::from("u-1"), SessionId::new());
        let mut session = Session::new(key);
        for i in 0..5 {
            session.turns.push(Turn::user(format!("turn {i}")));
        }

        let recent = session.recent_turns(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "turn 3");
        assert_eq!(recent[1].text, "turn 4");

        // Asking for more than exist returns everything
        assert_eq!(session.recent_turns(100).len(), 5);
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::assistant("Here is what I found.");
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Assistant);
        assert_eq!(back.text, "Here is what I found.");
    }

    #[test]
    fn session_key_display_is_path_like() {
        let key = SessionKey::new("waymark", UserId::from("u-9"), SessionId::from("s-3"));
        assert_eq!(key.to_string(), "waymark/u-9/s-3");
    }
}
