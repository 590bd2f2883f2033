//! Built-in capability handlers.
//!
//! Each handler is a thin pass-through: it runs the right recall pass, hands
//! the assembled context to the completion provider, persists the reply, and
//! annotates the result. Consumers register additional handlers through the
//! router builder; nothing here is privileged beyond being wired by default.

pub mod business_advice;
pub mod general;
pub mod memory;
pub mod web_lookup;

pub use business_advice::BusinessAdviceHandler;
pub use general::GeneralHandler;
pub use memory::MemoryHandler;
pub use web_lookup::{SearchHit, SearchProvider, WebLookupHandler};

#[cfg(test)]
pub(crate) mod test_helpers;
