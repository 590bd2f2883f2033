//! The hybrid recall engine.
//!
//! One request walks a small state machine:
//!
//! ```text
//! START → CHECK_BUDGET → { LEXICAL_ONLY | SEMANTIC_ALSO } → MERGE → DONE
//!                                   ↘ DEGRADED (backend failure) ↗
//! ```
//!
//! The lexical tier (recent session turns) is always fetched and is never
//! budget-gated. The semantic tier costs an expensive backend call, so it
//! runs only when the governor allows a spend, and the spend is recorded
//! only after the query confirmably succeeded. Index failures degrade the
//! request to lexical-only; session store failures are fatal.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use waymark_budget::{CallGovernor, SpendDecision, Window};
use waymark_config::CoreConfig;
use waymark_core::error::IndexError;
use waymark_core::event::{DomainEvent, EventBus};
use waymark_core::memory::{MemoryCategory, MemoryHit, RecalledItem, SemanticIndex};
use waymark_core::session::{SessionKey, SessionStore, Turn};
use waymark_core::{Result, TurnRequest};

use crate::indexer::BackgroundIndexer;
use crate::merge;

/// A state the recall machine passed through, recorded in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallPhase {
    Start,
    CheckBudget,
    /// Budget denied; semantic tier skipped.
    LexicalOnly,
    /// Semantic query ran and succeeded.
    SemanticAlso,
    /// Semantic query attempted and failed; fell back to lexical.
    Degraded,
    Merge,
    Done,
}

/// Everything a caller needs after one recall pass.
#[derive(Debug, Clone)]
pub struct RecallOutcome {
    /// The session the request resolved to (created if absent).
    pub session_key: SessionKey,

    /// The conversation so far, ending with the turn just appended.
    pub turns: Vec<Turn>,

    /// Merged memory context, deduplicated and capped.
    pub items: Vec<RecalledItem>,

    /// The phases traversed, for observability.
    pub phases: Vec<RecallPhase>,

    /// True when the semantic tier failed and the context is recency-only.
    pub degraded: bool,

    /// Set when the governor denied the semantic tier, naming the window.
    pub budget_denied: Option<Window>,
}

impl RecallOutcome {
    pub fn lexical_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.tier == waymark_core::MemoryTier::Lexical)
            .count()
    }

    pub fn semantic_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.tier == waymark_core::MemoryTier::Semantic)
            .count()
    }
}

/// Orchestrates lexical recency context and budgeted semantic recall.
pub struct RecallEngine {
    sessions: Arc<dyn SessionStore>,
    index: Arc<dyn SemanticIndex>,
    governor: Arc<CallGovernor>,
    events: Arc<EventBus>,
    indexer: BackgroundIndexer,
    recent_turn_limit: usize,
    semantic_query_top_k: usize,
    merged_memory_cap: usize,
    cost_optimized: bool,
}

impl RecallEngine {
    /// Create an engine over the given backends, tuned by the memory and
    /// session sections of the config. Spawns the background indexing worker
    /// immediately.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        index: Arc<dyn SemanticIndex>,
        governor: Arc<CallGovernor>,
        events: Arc<EventBus>,
        config: &CoreConfig,
    ) -> Self {
        let indexer =
            BackgroundIndexer::spawn(index.clone(), events.clone(), config.memory.min_index_chars);
        Self {
            sessions,
            index,
            governor,
            events,
            indexer,
            recent_turn_limit: config.session.recent_turn_limit,
            semantic_query_top_k: config.memory.semantic_query_top_k,
            merged_memory_cap: config.memory.merged_memory_cap,
            cost_optimized: config.memory.cost_optimized_mode,
        }
    }

    /// Run one recall pass for an inbound turn.
    ///
    /// Resolves the session, assembles merged memory context, persists the
    /// turn, and queues it for background indexing. The returned outcome
    /// carries the conversation and context for the completion call.
    pub async fn recall(&self, request: &TurnRequest) -> Result<RecallOutcome> {
        let mut phases = vec![RecallPhase::Start];

        // Lexical tier. A session store failure here is fatal to the request.
        let session = self
            .sessions
            .get_or_create_session(&request.app, &request.user_id, request.session_id.as_ref())
            .await?;
        let key = session.key.clone();
        let prior_turns = session.recent_turns(self.recent_turn_limit).to_vec();
        let lexical: Vec<RecalledItem> = prior_turns
            .iter()
            .map(|t| RecalledItem::lexical(t.text.clone(), t.timestamp))
            .collect();

        phases.push(RecallPhase::CheckBudget);
        let mut degraded = false;
        let mut budget_denied = None;
        let mut hits: Vec<MemoryHit> = Vec::new();

        match self.governor.may_spend(&request.user_id) {
            SpendDecision::Deny { window } => {
                phases.push(RecallPhase::LexicalOnly);
                budget_denied = Some(window);
                debug!(user_id = %request.user_id, window = %window, "Semantic tier skipped, budget exhausted");
                self.events.publish(DomainEvent::BudgetDenied {
                    user_id: request.user_id.to_string(),
                    window: window.to_string(),
                    timestamp: Utc::now(),
                });
            }
            SpendDecision::Allow => match self.semantic_lookup(request).await {
                Ok(found) => {
                    phases.push(RecallPhase::SemanticAlso);
                    // Charge only now that the query confirmably succeeded.
                    self.governor.record_spend(&request.user_id);
                    hits = found;
                }
                Err(err) => {
                    phases.push(RecallPhase::Degraded);
                    degraded = true;
                    warn!(user_id = %request.user_id, error = %err, "Semantic tier unavailable, answering from recency context");
                    self.events.publish(DomainEvent::DegradedFallback {
                        user_id: request.user_id.to_string(),
                        reason: err.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            },
        }

        phases.push(RecallPhase::Merge);
        let semantic: Vec<RecalledItem> = hits.iter().map(RecalledItem::semantic).collect();
        let items = merge::merge(lexical, semantic, self.merged_memory_cap);

        self.finish(request, key, prior_turns, items, phases, degraded, budget_denied)
            .await
    }

    /// Run a recency-only pass: recent turns, no governor consult, no
    /// semantic query. For handlers that answer from conversation flow alone
    /// and must not charge the user's budget.
    ///
    /// The turn is still persisted and still queued for background indexing,
    /// so memory accrues no matter which handler served the request.
    pub async fn recall_recency(&self, request: &TurnRequest) -> Result<RecallOutcome> {
        let mut phases = vec![RecallPhase::Start];

        let session = self
            .sessions
            .get_or_create_session(&request.app, &request.user_id, request.session_id.as_ref())
            .await?;
        let key = session.key.clone();
        let prior_turns = session.recent_turns(self.recent_turn_limit).to_vec();
        let lexical: Vec<RecalledItem> = prior_turns
            .iter()
            .map(|t| RecalledItem::lexical(t.text.clone(), t.timestamp))
            .collect();

        phases.push(RecallPhase::Merge);
        let items = merge::merge(lexical, Vec::new(), self.merged_memory_cap);

        self.finish(request, key, prior_turns, items, phases, false, None)
            .await
    }

    /// Shared tail of every pass: persist the turn, queue the background
    /// write, stamp the outcome, publish events.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        request: &TurnRequest,
        key: SessionKey,
        prior_turns: Vec<Turn>,
        items: Vec<RecalledItem>,
        mut phases: Vec<RecallPhase>,
        degraded: bool,
        budget_denied: Option<Window>,
    ) -> Result<RecallOutcome> {
        // Persist the turn regardless of which path was taken.
        let turn = Turn::user(request.text.clone());
        self.sessions.append_turn(&key, turn.clone()).await?;
        self.events.publish(DomainEvent::TurnAppended {
            user_id: request.user_id.to_string(),
            session_id: key.session_id.to_string(),
            role: "user".into(),
            timestamp: turn.timestamp,
        });

        let charged = phases.contains(&RecallPhase::SemanticAlso);
        if !self.cost_optimized {
            self.indexer.enqueue(
                request.user_id.clone(),
                key.session_id.clone(),
                &request.text,
                MemoryCategory::Conversation,
                charged,
            );
        }

        phases.push(RecallPhase::Done);
        let mut turns = prior_turns;
        turns.push(turn);
        let outcome = RecallOutcome {
            session_key: key,
            turns,
            items,
            phases,
            degraded,
            budget_denied,
        };
        self.events.publish(DomainEvent::MemoryRecalled {
            user_id: request.user_id.to_string(),
            lexical_count: outcome.lexical_count(),
            semantic_count: outcome.semantic_count(),
            degraded,
            timestamp: Utc::now(),
        });
        Ok(outcome)
    }

    /// Persist the assistant's reply to the session.
    pub async fn record_reply(&self, key: &SessionKey, text: &str) -> Result<()> {
        let turn = Turn::assistant(text);
        self.sessions.append_turn(key, turn.clone()).await?;
        self.events.publish(DomainEvent::TurnAppended {
            user_id: key.user_id.to_string(),
            session_id: key.session_id.to_string(),
            role: "assistant".into(),
            timestamp: turn.timestamp,
        });
        Ok(())
    }

    /// Wait for queued background index writes to finish. Test and shutdown
    /// hook; the request path never calls this.
    pub async fn flush_index(&self) {
        self.indexer.flush().await;
    }

    async fn semantic_lookup(&self, request: &TurnRequest) -> std::result::Result<Vec<MemoryHit>, IndexError> {
        let corpus = self.index.ensure_corpus(&request.user_id).await?;
        self.index
            .query(&corpus, &request.text, self.semantic_query_top_k)
            .await
    }
}
