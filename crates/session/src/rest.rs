//! REST session store — client for the external conversation-state service.
//!
//! Speaks a conventional sessions API keyed by (app, user, session):
//! - `GET    /apps/{app}/users/{user}/sessions` — list
//! - `POST   /apps/{app}/users/{user}/sessions` — create (id minted here)
//! - `GET    /apps/{app}/users/{user}/sessions/{id}` — fetch
//! - `POST   /apps/{app}/users/{user}/sessions/{id}/events` — append turn
//! - `PATCH  /apps/{app}/users/{user}/sessions/{id}/state` — set state key
//! - `DELETE /apps/{app}/users/{user}/sessions/{id}` — delete
//!
//! No operation is retried here; retry policy, if any, belongs to the
//! transport underneath the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use waymark_core::error::SessionError;
use waymark_core::session::{
    Role, Session, SessionId, SessionKey, SessionStore, SessionSummary, Turn, UserId,
};

/// A `SessionStore` backed by a remote REST service.
pub struct RestSessionStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RestSessionStore {
    /// Create a new REST session store.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn session_url(&self, key: &SessionKey) -> String {
        format!(
            "{}/apps/{}/users/{}/sessions/{}",
            self.base_url, key.app, key.user_id, key.session_id
        )
    }

    fn sessions_url(&self, app: &str, user_id: &UserId) -> String {
        format!("{}/apps/{app}/users/{user_id}/sessions", self.base_url)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    /// Map a non-success status to the session error taxonomy. 404 means the
    /// caller's session reference is unknown; everything else is the backend
    /// being unavailable for our purposes.
    async fn fail(response: reqwest::Response, key: Option<&SessionKey>) -> SessionError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status == 404 {
            if let Some(key) = key {
                return SessionError::InvalidSessionRef {
                    user_id: key.user_id.to_string(),
                    session_id: key.session_id.to_string(),
                };
            }
        }

        warn!(status, body = %body, "Session backend returned error");
        SessionError::BackendUnavailable(format!("status {status}: {body}"))
    }
}

#[async_trait]
impl SessionStore for RestSessionStore {
    fn name(&self) -> &str {
        "rest"
    }

    async fn get_or_create_session(
        &self,
        app: &str,
        user_id: &UserId,
        session_id: Option<&SessionId>,
    ) -> Result<Session, SessionError> {
        // With an id in hand, try the fetch first and fall through to create
        // on 404. Without one, create directly with a freshly minted id.
        if let Some(id) = session_id {
            let key = SessionKey::new(app, user_id.clone(), id.clone());
            let response = self
                .request(self.client.get(self.session_url(&key)))
                .send()
                .await
                .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;

            if response.status().is_success() {
                let api: ApiSession = response
                    .json()
                    .await
                    .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;
                return Ok(api.into_session(key));
            }
            if response.status().as_u16() != 404 {
                return Err(Self::fail(response, None).await);
            }
        }

        let id = session_id.cloned().unwrap_or_default();
        let key = SessionKey::new(app, user_id.clone(), id);
        let seeded = Session::new(key.clone());

        debug!(key = %key, "Creating session");

        let response = self
            .request(self.client.post(self.sessions_url(app, user_id)))
            .json(&CreateSessionBody {
                session_id: &key.session_id,
                state: &seeded.state,
            })
            .send()
            .await
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::fail(response, None).await);
        }

        let api: ApiSession = response
            .json()
            .await
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;
        Ok(api.into_session(key))
    }

    async fn append_turn(&self, key: &SessionKey, turn: Turn) -> Result<(), SessionError> {
        let url = format!("{}/events", self.session_url(key));
        let response = self
            .request(self.client.post(&url))
            .json(&ApiTurn::from(&turn))
            .send()
            .await
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::fail(response, Some(key)).await);
        }
        Ok(())
    }

    async fn get_recent_turns(
        &self,
        key: &SessionKey,
        limit: usize,
    ) -> Result<Vec<Turn>, SessionError> {
        let response = self
            .request(self.client.get(self.session_url(key)))
            .send()
            .await
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::fail(response, Some(key)).await);
        }

        let api: ApiSession = response
            .json()
            .await
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;

        let mut turns: Vec<Turn> = api.events.iter().map(ApiTurn::to_turn).collect();
        let start = turns.len().saturating_sub(limit);
        Ok(turns.split_off(start))
    }

    async fn set_state(
        &self,
        key: &SessionKey,
        state_key: &str,
        value: serde_json::Value,
    ) -> Result<(), SessionError> {
        let url = format!("{}/state", self.session_url(key));
        let response = self
            .request(self.client.patch(&url))
            .json(&StatePatch {
                key: state_key,
                value,
            })
            .send()
            .await
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::fail(response, Some(key)).await);
        }
        Ok(())
    }

    async fn get_state(
        &self,
        key: &SessionKey,
        state_key: &str,
    ) -> Result<Option<serde_json::Value>, SessionError> {
        let response = self
            .request(self.client.get(self.session_url(key)))
            .send()
            .await
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::fail(response, Some(key)).await);
        }

        let api: ApiSession = response
            .json()
            .await
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;
        Ok(api.state.get(state_key).cloned())
    }

    async fn list_sessions(
        &self,
        app: &str,
        user_id: &UserId,
    ) -> Result<Vec<SessionSummary>, SessionError> {
        let response = self
            .request(self.client.get(self.sessions_url(app, user_id)))
            .send()
            .await
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::fail(response, None).await);
        }

        // Backends disagree on the envelope: some return a bare array, some
        // wrap it in {"sessions": [...]}.
        let listing: ApiSessionListing = response
            .json()
            .await
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;

        Ok(listing
            .into_vec()
            .into_iter()
            .map(|s| SessionSummary {
                session_id: SessionId(s.id),
                created_at: s.created_at,
                turn_count: s.event_count,
            })
            .collect())
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<bool, SessionError> {
        let response = self
            .request(self.client.delete(self.session_url(key)))
            .send()
            .await
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;

        match response.status().as_u16() {
            s if (200..300).contains(&s) => Ok(true),
            404 => Ok(false),
            _ => Err(Self::fail(response, None).await),
        }
    }

    async fn health_check(&self) -> Result<(), SessionError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SessionError::BackendUnavailable(format!(
                "health check returned status {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CreateSessionBody<'a> {
    session_id: &'a SessionId,
    state: &'a serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct StatePatch<'a> {
    key: &'a str,
    value: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct ApiTurn {
    role: String,
    text: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl ApiTurn {
    fn from(turn: &Turn) -> Self {
        Self {
            role: match turn.role {
                Role::User => "user".into(),
                Role::Assistant => "assistant".into(),
                Role::System => "system".into(),
            },
            text: turn.text.clone(),
            timestamp: turn.timestamp,
        }
    }

    fn to_turn(&self) -> Turn {
        Turn {
            role: match self.role.as_str() {
                "assistant" => Role::Assistant,
                "system" => Role::System,
                _ => Role::User,
            },
            text: self.text.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Deserialize)]
struct ApiSession {
    #[serde(default)]
    state: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    events: Vec<ApiTurn>,
    #[serde(default = "chrono::Utc::now")]
    created_at: chrono::DateTime<chrono::Utc>,
}

impl ApiSession {
    fn into_session(self, key: SessionKey) -> Session {
        Session {
            key,
            turns: self.events.iter().map(ApiTurn::to_turn).collect(),
            state: self.state,
            created_at: self.created_at,
        }
    }
}

#[derive(Deserialize)]
struct ApiSessionInfo {
    id: String,
    #[serde(default = "chrono::Utc::now")]
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    event_count: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApiSessionListing {
    Wrapped { sessions: Vec<ApiSessionInfo> },
    Bare(Vec<ApiSessionInfo>),
}

impl ApiSessionListing {
    fn into_vec(self) -> Vec<ApiSessionInfo> {
        match self {
            Self::Wrapped { sessions } => sessions,
            Self::Bare(sessions) => sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_accepts_both_envelopes() {
        let wrapped = r#"{"sessions": [{"id": "s-1", "event_count": 3}]}"#;
        let listing: ApiSessionListing = serde_json::from_str(wrapped).unwrap();
        assert_eq!(listing.into_vec().len(), 1);

        let bare = r#"[{"id": "s-1"}, {"id": "s-2"}]"#;
        let listing: ApiSessionListing = serde_json::from_str(bare).unwrap();
        let sessions = listing.into_vec();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[1].id, "s-2");
    }

    #[test]
    fn api_turn_role_mapping_roundtrip() {
        let turn = Turn::assistant("reply");
        let api = ApiTurn::from(&turn);
        assert_eq!(api.role, "assistant");
        assert_eq!(api.to_turn().role, Role::Assistant);

        // Unknown roles degrade to user rather than failing the fetch
        let odd = ApiTurn {
            role: "narrator".into(),
            text: "hm".into(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(odd.to_turn().role, Role::User);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let store = RestSessionStore::new("http://localhost:9000/", None);
        let key = SessionKey::new("app", UserId::from("u"), SessionId::from("s"));
        assert_eq!(
            store.session_url(&key),
            "http://localhost:9000/apps/app/users/u/sessions/s"
        );
    }
}
