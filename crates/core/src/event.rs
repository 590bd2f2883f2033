//! Domain event system — decoupled observability for the memory core.
//!
//! Events are published when something interesting happens on the request
//! path. Subscribers react without coupling to the orchestrator; publishing
//! never fails the hot path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A turn was persisted to a session
    TurnAppended {
        user_id: String,
        session_id: String,
        role: String,
        timestamp: DateTime<Utc>,
    },

    /// Memory context was assembled for a request
    MemoryRecalled {
        user_id: String,
        lexical_count: usize,
        semantic_count: usize,
        degraded: bool,
        timestamp: DateTime<Utc>,
    },

    /// The governor denied a semantic-tier spend
    BudgetDenied {
        user_id: String,
        window: String,
        timestamp: DateTime<Utc>,
    },

    /// A backend failure forced lexical-only recall
    DegradedFallback {
        user_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A turn was written to the long-term index in the background
    MemoryIndexed {
        user_id: String,
        record_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A background index write failed (logged, never raised)
    IndexWriteFailed {
        user_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The router delegated a turn to a handler
    HandlerSelected {
        handler: String,
        matched_tags: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast fan-out for domain events.
///
/// Every subscriber sees every event and filters for what it cares about.
/// Lagging subscribers lose the oldest events rather than backpressuring
/// the publisher.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to whoever is listening.
    pub fn publish(&self, event: DomainEvent) {
        // A send error only means nobody is subscribed right now
        let _ = self.sender.send(Arc::new(event));
    }

    /// Open a new subscription covering events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
