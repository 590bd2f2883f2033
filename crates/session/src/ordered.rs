//! Ordering wrapper — serializes appends per session.
//!
//! Turn appends for one session must land in submission order even when
//! callers race. Backends are not trusted to order concurrent writes (two
//! in-flight HTTP posts can arrive reversed), so ordering is enforced on
//! this side: each session gets a sequential queue in the form of an async
//! mutex held for the duration of the append. Operations on distinct
//! sessions proceed concurrently, and non-append operations pass straight
//! through.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use waymark_core::error::SessionError;
use waymark_core::session::{
    Session, SessionId, SessionKey, SessionStore, SessionSummary, Turn, UserId,
};

/// Wraps any `SessionStore` with per-session append serialization.
pub struct OrderedSessionStore {
    inner: Arc<dyn SessionStore>,
    /// One async mutex per session with an append in flight. `tokio::sync::Mutex`
    /// queues waiters fairly, so lock order is submission order.
    locks: Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl OrderedSessionStore {
    pub fn new(inner: Arc<dyn SessionStore>) -> Self {
        Self {
            inner,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &SessionKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release(&self, key: &SessionKey, lock: Arc<tokio::sync::Mutex<()>>) {
        drop(lock);
        let mut locks = self.locks.lock().unwrap();
        // Only the map still holds the mutex: no append is waiting, so the
        // entry can go. Keeps the map from growing with dead sessions.
        if let Some(entry) = locks.get(key) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(key);
            }
        }
    }
}

#[async_trait]
impl SessionStore for OrderedSessionStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_or_create_session(
        &self,
        app: &str,
        user_id: &UserId,
        session_id: Option<&SessionId>,
    ) -> Result<Session, SessionError> {
        self.inner
            .get_or_create_session(app, user_id, session_id)
            .await
    }

    async fn append_turn(&self, key: &SessionKey, turn: Turn) -> Result<(), SessionError> {
        let lock = self.lock_for(key);
        let result = {
            let _guard = lock.lock().await;
            self.inner.append_turn(key, turn).await
        };
        self.release(key, lock);
        result
    }

    async fn get_recent_turns(
        &self,
        key: &SessionKey,
        limit: usize,
    ) -> Result<Vec<Turn>, SessionError> {
        self.inner.get_recent_turns(key, limit).await
    }

    async fn set_state(
        &self,
        key: &SessionKey,
        state_key: &str,
        value: serde_json::Value,
    ) -> Result<(), SessionError> {
        self.inner.set_state(key, state_key, value).await
    }

    async fn get_state(
        &self,
        key: &SessionKey,
        state_key: &str,
    ) -> Result<Option<serde_json::Value>, SessionError> {
        self.inner.get_state(key, state_key).await
    }

    async fn list_sessions(
        &self,
        app: &str,
        user_id: &UserId,
    ) -> Result<Vec<SessionSummary>, SessionError> {
        self.inner.list_sessions(app, user_id).await
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<bool, SessionError> {
        self.inner.delete_session(key).await
    }

    async fn health_check(&self) -> Result<(), SessionError> {
        self.inner.health_check().await
    }
}
