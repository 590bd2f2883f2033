//! Handler registry — insertion-ordered, first match wins.

use std::sync::Arc;

use waymark_core::{CapabilityHandler, IntentTag};

/// Registered handlers in registration order.
///
/// Selection scans the list front to back and returns the first handler
/// declaring any of the detected tags. Two handlers declaring the same tag
/// is legal; the earlier registration always wins, which makes routing
/// deterministic and makes registration order an explicit priority order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn CapabilityHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn CapabilityHandler>) {
        self.handlers.push(handler);
    }

    /// The first registered handler declaring any of `tags`.
    pub fn select(&self, tags: &[IntentTag]) -> Option<&Arc<dyn CapabilityHandler>> {
        self.handlers
            .iter()
            .find(|h| h.intent_tags().iter().any(|t| tags.contains(t)))
    }

    /// The first registered handler with an empty tag set, reachable only as
    /// the fallback when no tag matches.
    pub fn default_handler(&self) -> Option<&Arc<dyn CapabilityHandler>> {
        self.handlers.iter().find(|h| h.intent_tags().is_empty())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in registration order, for listings and logs.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}
