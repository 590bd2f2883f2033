//! General handler — the router's default when no tag matches.
//!
//! Runs the recency-only recall pass: the conversation's recent turns feed the
//! completion, the semantic tier is never consulted, and no budget is spent.
//! The turn still lands in the session and the background index queue, so
//! memory accrues even for small talk.

use std::sync::Arc;

use async_trait::async_trait;

use waymark_core::{
    CapabilityHandler, Completion, Error, HandlerReply, IntentTag, RouteContext, TurnRequest,
};
use waymark_recall::RecallEngine;

const SYSTEM_INSTRUCTION: &str = "You are Waymark, a personal assistant. Answer from the \
conversation so far. Be concise, natural, and direct.";

/// Everyday conversation over recent turns only.
pub struct GeneralHandler {
    engine: Arc<RecallEngine>,
    completion: Arc<dyn Completion>,
}

impl GeneralHandler {
    pub fn new(engine: Arc<RecallEngine>, completion: Arc<dyn Completion>) -> Self {
        Self { engine, completion }
    }
}

#[async_trait]
impl CapabilityHandler for GeneralHandler {
    fn name(&self) -> &str {
        "general"
    }

    fn description(&self) -> &str {
        "Default conversation over recent turns, no semantic lookup"
    }

    fn intent_tags(&self) -> &[IntentTag] {
        &[]
    }

    async fn handle(
        &self,
        turn: &TurnRequest,
        _ctx: &RouteContext,
    ) -> Result<HandlerReply, Error> {
        let outcome = self.engine.recall_recency(turn).await?;
        let text = self
            .completion
            .complete(SYSTEM_INSTRUCTION, &outcome.turns, &outcome.items)
            .await?;
        self.engine.record_reply(&outcome.session_key, &text).await?;
        Ok(HandlerReply::new(self.name(), text))
    }
}
