//! Capability handler contract — the units the delegation router picks from.
//!
//! A capability handler is a named, tagged unit of behavior registered once
//! at startup. The router matches a turn's detected intent tags against each
//! handler's declared tags and delegates to exactly one handler per turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::session::{SessionId, UserId};

/// Lightweight intent signals detected from turn text by keyword matching.
/// A closed set: no deep NLU, no free-form tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentTag {
    /// Recall or remembering something from past conversations
    Memory,
    /// Money, budgets, savings, investments
    Finance,
    /// Strategy, planning, growing a venture
    Business,
    /// Current facts that need a live lookup
    WebLookup,
    /// Anything else
    General,
}

impl IntentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Finance => "finance",
            Self::Business => "business",
            Self::WebLookup => "web-lookup",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for IntentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound turn as the router sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub app: String,
    pub user_id: UserId,

    /// `None` starts a fresh session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// The user's message text.
    pub text: String,
}

impl TurnRequest {
    pub fn new(app: impl Into<String>, user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            user_id,
            session_id: None,
            text: text.into(),
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// What the router learned about a turn before delegating it.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    /// Intent tags detected from the turn text, detection order.
    pub tags: Vec<IntentTag>,
}

/// A handler's output. Opaque to the router: it passes the reply through
/// without inspecting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerReply {
    /// The response text for the end user.
    pub text: String,

    /// Which handler produced this.
    pub handler: String,

    /// Handler-specific annotations (recall tier, degraded flags, etc.).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl HandlerReply {
    pub fn new(handler: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            handler: handler.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A registered unit that can fully service a turn matching its tags.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Unique handler name (e.g., "memory", "web-lookup").
    fn name(&self) -> &str;

    /// One-line description, for listings and logs.
    fn description(&self) -> &str;

    /// The intent tags this handler serves. An empty slice means the handler
    /// is only reachable as the router's default.
    fn intent_tags(&self) -> &[IntentTag];

    /// Service the turn. At most one handler runs per turn.
    async fn handle(
        &self,
        turn: &TurnRequest,
        ctx: &RouteContext,
    ) -> std::result::Result<HandlerReply, Error>;
}
