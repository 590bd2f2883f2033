//! The hybrid memory orchestrator — the heart of Waymark.
//!
//! Every inbound turn takes the same pass:
//!
//! 1. **Fetch** recent session turns (the lexical tier) — never budget-gated
//! 2. **Ask** the call governor whether a semantic pass may be spent
//! 3. **Query** the long-term index if allowed; degrade to lexical-only if
//!    the backend fails, recording no spend
//! 4. **Merge** both tiers into one deduplicated, capped context block
//! 5. **Persist** the turn and queue it for background indexing
//!
//! The caller feeds the merged context to the completion capability; this
//! crate never talks to a language model itself.

pub mod engine;
pub mod indexer;
pub mod merge;

pub use engine::{RecallEngine, RecallOutcome, RecallPhase};
pub use indexer::BackgroundIndexer;
pub use merge::{merge, normalize};

// The engine's constructor and outcome expose these; re-exported so
// consumers can name them without depending on waymark-budget directly.
pub use waymark_budget::{CallGovernor, Window};
