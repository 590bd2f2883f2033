//! # Waymark Core
//!
//! Domain types, traits, and error definitions for the Waymark hybrid memory
//! & delegation core. Nothing transport- or backend-specific lives here: this
//! crate is the domain model the rest of the workspace implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait in this crate, implemented
//! elsewhere:
//! - Backends are chosen at wiring time, not compile time
//! - Tests run against in-memory doubles
//! - Dependencies point inward (every crate depends on core, core on none
//!   of them)

pub mod capability;
pub mod completion;
pub mod error;
pub mod event;
pub mod memory;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use capability::{CapabilityHandler, HandlerReply, IntentTag, RouteContext, TurnRequest};
pub use completion::Completion;
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{
    CorpusRef, MemoryCategory, MemoryHit, MemoryRecordRef, MemoryTier, RecalledItem, SemanticIndex,
};
pub use session::{Role, Session, SessionId, SessionKey, SessionStore, SessionSummary, Turn, UserId};
