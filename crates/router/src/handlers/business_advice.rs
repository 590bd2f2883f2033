//! Business advice handler — persona completion over recalled context.
//!
//! Serves turns tagged `business`. Advice is only useful when it knows what
//! the user is building, so this handler runs the full recall pass and lets
//! earlier conversations about the venture inform the answer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use waymark_core::{
    CapabilityHandler, Completion, Error, HandlerReply, IntentTag, RouteContext, TurnRequest,
};
use waymark_recall::RecallEngine;

const SYSTEM_INSTRUCTION: &str = "You are Waymark's business advisor: pragmatic, specific, and \
frank about trade-offs. The memory context below covers what this user has shared about their \
venture in past conversations. Tailor the advice to it. Ask one sharp question when the picture \
is too thin to advise on.";

/// Practical venture advice grounded in what the user has shared before.
pub struct BusinessAdviceHandler {
    engine: Arc<RecallEngine>,
    completion: Arc<dyn Completion>,
}

impl BusinessAdviceHandler {
    pub fn new(engine: Arc<RecallEngine>, completion: Arc<dyn Completion>) -> Self {
        Self { engine, completion }
    }
}

#[async_trait]
impl CapabilityHandler for BusinessAdviceHandler {
    fn name(&self) -> &str {
        "business-advice"
    }

    fn description(&self) -> &str {
        "Business and strategy advice informed by recalled context"
    }

    fn intent_tags(&self) -> &[IntentTag] {
        &[IntentTag::Business]
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

        Ok(HandlerReply::new(self.name(), text)
            .with_metadata("semantic_items", json!(outcome.semantic_count()))
            .with_metadata("degraded", json!(outcome.degraded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{engine_fixture, ScriptedCompletion};
    use waymark_core::session::{SessionId, UserId};
    use waymark_core::{MemoryCategory, SemanticIndex};

    #[tokio::test]
    async fn advice_sees_recalled_venture_context() {
        let fx = engine_fixture();
        let user = UserId::from("founder");

        let corpus = fx.index.ensure_corpus(&user).await.unwrap();
        fx.index
            .add_memory(
                &corpus,
                "User runs a pottery studio and sells through weekend markets",
                MemoryCategory::Fact,
                &SessionId::from("old-session"),
            )
            .await
            .unwrap();
        fx.index.settle().await;

        let completion = Arc::new(ScriptedCompletion::single(
            "Raise your workshop prices before adding a second market day.",
        ));
        let handler = BusinessAdviceHandler::new(fx.engine.clone(), completion.clone());

        let reply = handler
            .handle(
                &TurnRequest::new("test-app", user.clone(), "how should I grow the studio revenue?"),
                &RouteContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(reply.handler, "business-advice");
        assert!(reply.metadata["semantic_items"].as_u64().unwrap() >= 1);
        assert!(completion.calls()[0].system_instruction.contains("business advisor"));
        assert!(completion.calls()[0].memory_item_count >= 1);

        // The full pass charges the governor.
        assert_eq!(
            fx.governor.remaining(&user, waymark_budget::Window::Daily),
            fx.governor.daily_ceiling() - 1
        );
    }
}
