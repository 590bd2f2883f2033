//! Memory handler — full hybrid recall feeding the completion.
//!
//! Serves turns tagged `memory`: the user is asking about something from a
//! past conversation, so this handler runs the complete recall pass (recency
//! plus budgeted semantic lookup) and hands the merged context to the
//! completion provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use waymark_core::{
    CapabilityHandler, Completion, Error, HandlerReply, IntentTag, RouteContext, TurnRequest,
};
use waymark_recall::RecallEngine;

const SYSTEM_INSTRUCTION: &str = "You are Waymark, a personal assistant with long-term memory. \
The memory context below lists things previously learned about this user, most relevant first. \
Ground your answer in it when it applies, and say plainly when nothing on file answers the \
question. Never invent a memory.";

/// Answers recall-style questions from the merged memory context.
pub struct MemoryHandler {
    engine: Arc<RecallEngine>,
    completion: Arc<dyn Completion>,
}

impl MemoryHandler {
    pub fn new(engine: Arc<RecallEngine>, completion: Arc<dyn Completion>) -> Self {
        Self { engine, completion }
    }
}

#[async_trait]
impl CapabilityHandler for MemoryHandler {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Recalls past conversations through the hybrid memory pass"
    }

    fn intent_tags(&self) -> &[IntentTag] {
        &[IntentTag::Memory]
    }

    async fn handle(
        &self,
        turn: &TurnRequest,
        _ctx: &RouteContext,
    ) -> Result<HandlerReply, Error> {
        let outcome = self.engine.recall(turn).await?;
        let text = self
            .completion
            .complete(SYSTEM_INSTRUCTION, &outcome.turns, &outcome.items)
            .await?;
        self.engine.record_reply(&outcome.session_key, &text).await?;

        let mut reply = HandlerReply::new(self.name(), text)
            .with_metadata("lexical_items", json!(outcome.lexical_count()))
            .with_metadata("semantic_items", json!(outcome.semantic_count()))
            .with_metadata("degraded", json!(outcome.degraded));
        if let Some(window) = outcome.budget_denied {
            reply = reply.with_metadata("budget_denied", json!(window.as_str()));
        }
        Ok(reply)
    }
}
