//! Session store adapters for Waymark.
//!
//! Implementations of the `waymark_core::SessionStore` contract: a REST
//! client for the external durable conversation-state service, an in-memory
//! backend for tests and local runs, and an ordering wrapper that serializes
//! appends per session so submission order survives concurrent callers.

use std::sync::Arc;

use waymark_config::SessionSection;
use waymark_core::SessionStore;

pub mod in_memory;
pub mod ordered;
pub mod rest;

pub use in_memory::InMemorySessionStore;
pub use ordered::OrderedSessionStore;
pub use rest::RestSessionStore;

/// Build a session store from configuration: REST when a base URL is
/// configured, in-memory otherwise. Either way the store is wrapped for
/// ordered appends.
pub fn build_from_config(section: &SessionSection) -> Arc<dyn SessionStore> {
    let inner: Arc<dyn SessionStore> = match section.base_url.as_deref() {
        Some(url) => Arc::new(RestSessionStore::new(url, section.api_key.clone())),
        None => Arc::new(InMemorySessionStore::new()),
    };
    Arc::new(OrderedSessionStore::new(inner))
}
