//! In-memory session store — useful for testing and ephemeral runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use waymark_core::error::SessionError;
use waymark_core::session::{
    Session, SessionId, SessionKey, SessionStore, SessionSummary, Turn, UserId,
};

/// A `SessionStore` that keeps everything in a process-local map.
///
/// Doubles as the test fixture for the orchestrator: backend failure can be
/// toggled on to exercise degraded paths, and an artificial append latency
/// can be injected to exercise ordering under contention.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
    unavailable: AtomicBool,
    append_failing: AtomicBool,
    append_latency: Option<std::time::Duration>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            unavailable: AtomicBool::new(false),
            append_failing: AtomicBool::new(false),
            append_latency: None,
        }
    }

    /// Delay each append before it commits, to widen race windows in tests.
    pub fn with_append_latency(mut self, latency: std::time::Duration) -> Self {
        self.append_latency = Some(latency);
        self
    }

    /// Toggle backend failure: while set, every operation returns
    /// `BackendUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail only appends: reads keep working so a session can be resolved
    /// before the write path breaks.
    pub fn fail_appends(&self, failing: bool) {
        self.append_failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), SessionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SessionError::BackendUnavailable(
                "session backend offline".into(),
            ));
        }
        Ok(())
    }

    fn unknown(key: &SessionKey) -> SessionError {
        SessionError::InvalidSessionRef {
            user_id: key.user_id.to_string(),
            session_id: key.session_id.to_string(),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn get_or_create_session(
        &self,
        app: &str,
        user_id: &UserId,
        session_id: Option<&SessionId>,
    ) -> Result<Session, SessionError> {
        self.check_available()?;

        let id = session_id.cloned().unwrap_or_default();
        let key = SessionKey::new(app, user_id.clone(), id);

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(key.clone())
            .or_insert_with(|| Session::new(key));
        Ok(session.clone())
    }

    async fn append_turn(&self, key: &SessionKey, turn: Turn) -> Result<(), SessionError> {
        self.check_available()?;
        if self.append_failing.load(Ordering::SeqCst) {
            return Err(SessionError::BackendUnavailable(
                "session backend rejected the write".into(),
            ));
        }

        if let Some(latency) = self.append_latency {
            tokio::time::sleep(latency).await;
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(key).ok_or_else(|| Self::unknown(key))?;
        session.turns.push(turn);

        // Bookkeeping the external service maintains server-side
        let count = session
            .state
            .get("conversation_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        session
            .state
            .insert("conversation_count".into(), (count + 1).into());
        session
            .state
            .insert("last_activity".into(), Utc::now().to_rfc3339().into());
        Ok(())
    }

    async fn get_recent_turns(
        &self,
        key: &SessionKey,
        limit: usize,
    ) -> Result<Vec<Turn>, SessionError> {
        self.check_available()?;

        let sessions = self.sessions.read().await;
        let session = sessions.get(key).ok_or_else(|| Self::unknown(key))?;
        Ok(session.recent_turns(limit).to_vec())
    }

    async fn set_state(
        &self,
        key: &SessionKey,
        state_key: &str,
        value: serde_json::Value,
    ) -> Result<(), SessionError> {
        self.check_available()?;

        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(key).ok_or_else(|| Self::unknown(key))?;
        session.state.insert(state_key.to_string(), value);
        Ok(())
    }

    async fn get_state(
        &self,
        key: &SessionKey,
        state_key: &str,
    ) -> Result<Option<serde_json::Value>, SessionError> {
        self.check_available()?;

        let sessions = self.sessions.read().await;
        let session = sessions.get(key).ok_or_else(|| Self::unknown(key))?;
        Ok(session.state.get(state_key).cloned())
    }

    async fn list_sessions(
        &self,
        app: &str,
        user_id: &UserId,
    ) -> Result<Vec<SessionSummary>, SessionError> {
        self.check_available()?;

        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| s.key.app == app && &s.key.user_id == user_id)
            .map(|s| SessionSummary {
                session_id: s.key.session_id.clone(),
                created_at: s.created_at,
                turn_count: s.turns.len(),
            })
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        Ok(summaries)
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<bool, SessionError> {
        self.check_available()?;
        Ok(self.sessions.write().await.remove(key).is_some())
    }

    async fn health_check(&self) -> Result<(), SessionError> {
        self.check_available()
    }
}
