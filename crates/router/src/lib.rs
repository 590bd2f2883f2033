//! # Waymark Router
//!
//! Delegation: exactly one capability handler per inbound turn.
//!
//! The router detects intent tags from the turn text by keyword matching,
//! walks the handler registry in registration order, and delegates to the
//! first handler whose declared tags intersect the detected set. Zero matches
//! fall back to the default (untagged) handler. There is no fan-out: one
//! handler runs, one response comes back, at most one budget charge happens.
//!
//! A handler's reply is opaque here. The router manages selection and passes
//! the output through untouched.

pub mod handlers;
pub mod intent;
pub mod registry;

pub use handlers::{
    BusinessAdviceHandler, GeneralHandler, MemoryHandler, SearchHit, SearchProvider,
    WebLookupHandler,
};
pub use intent::detect_tags;
pub use registry::HandlerRegistry;

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use waymark_config::CoreConfig;
use waymark_core::event::{DomainEvent, EventBus};
use waymark_core::session::{SessionId, UserId};
use waymark_core::{
    CapabilityHandler, Completion, Error, HandlerReply, Result, RouteContext, TurnRequest,
};
use waymark_recall::RecallEngine;

/// Routes each inbound turn to exactly one registered handler.
pub struct DelegationRouter {
    registry: HandlerRegistry,
    events: Arc<EventBus>,
    app_name: String,
}

impl DelegationRouter {
    pub fn builder() -> DelegationRouterBuilder {
        DelegationRouterBuilder::new()
    }

    /// The registered handler names, registration order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// Detect intent, select one handler, delegate the turn to it.
    ///
    /// Selection: first registered handler whose tags intersect the detected
    /// set, else the default (untagged) handler. An assembly with no eligible
    /// handler at all is a programmer error and fails the turn.
    pub async fn route(&self, turn: &TurnRequest) -> Result<HandlerReply> {
        let tags = intent::detect_tags(&turn.text);
        let handler = self
            .registry
            .select(&tags)
            .or_else(|| self.registry.default_handler())
            .ok_or_else(|| {
                Error::Internal("no handler matched and no default handler is registered".into())
            })?;

        let matched_tags: Vec<String> = tags
            .iter()
            .filter(|tag| handler.intent_tags().contains(tag))
            .map(|tag| tag.to_string())
            .collect();

        debug!(
            handler = handler.name(),
            detected = ?tags,
            "Delegating turn"
        );
        self.events.publish(DomainEvent::HandlerSelected {
            handler: handler.name().to_string(),
            matched_tags,
            timestamp: Utc::now(),
        });

        handler.handle(turn, &RouteContext { tags }).await
    }

    /// Route raw text, stamping the turn with the router's configured app
    /// name. The session store keys everything under that name.
    pub async fn route_text(
        &self,
        user_id: UserId,
        session_id: Option<SessionId>,
        text: impl Into<String>,
    ) -> Result<HandlerReply> {
        let mut turn = TurnRequest::new(&self.app_name, user_id, text);
        if let Some(session_id) = session_id {
            turn = turn.with_session(session_id);
        }
        self.route(&turn).await
    }
}

/// Assembles a router. Registration happens once, here; the registry is
/// immutable after `build`.
pub struct DelegationRouterBuilder {
    registry: HandlerRegistry,
    events: Option<Arc<EventBus>>,
    app_name: Option<String>,
}

impl DelegationRouterBuilder {
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            events: None,
            app_name: None,
        }
    }

    /// Register a handler. Order matters: on a tag tie the first registered
    /// handler wins.
    pub fn handler(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.registry.register(handler);
        self
    }

    /// Share an event bus with the rest of the system.
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// The application name `route_text` stamps onto turns.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn build(self) -> DelegationRouter {
        DelegationRouter {
            registry: self.registry,
            events: self.events.unwrap_or_default(),
            app_name: self
                .app_name
                .unwrap_or_else(|| CoreConfig::default().session.app_name),
        }
    }
}

impl Default for DelegationRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a router with the four built-in handlers: memory, business-advice,
/// web-lookup (stub mode), and the general fallback, in that precedence
/// order. The config supplies the app name sessions are keyed under.
pub fn default_router(
    config: &CoreConfig,
    engine: Arc<RecallEngine>,
    completion: Arc<dyn Completion>,
    events: Arc<EventBus>,
) -> DelegationRouter {
    DelegationRouter::builder()
        .app_name(config.session.app_name.clone())
        .handler(Arc::new(MemoryHandler::new(
            engine.clone(),
            completion.clone(),
        )))
        .handler(Arc::new(BusinessAdviceHandler::new(
            engine.clone(),
            completion.clone(),
        )))
        .handler(Arc::new(WebLookupHandler::new(
            engine.clone(),
            completion.clone(),
        )))
        .handler(Arc::new(GeneralHandler::new(engine, completion)))
        .events(events)
        .build()
}
