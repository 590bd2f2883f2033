//! Web lookup handler — live search when a provider is configured, honest
//! stub mode when not.
//!
//! The search provider is optional: without one the handler answers from the
//! completion alone and tells the user it could not check live sources.
//! Wiring a real provider (Brave, Google, etc.) upgrades it without touching
//! the routing layer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use waymark_core::{
    CapabilityHandler, Completion, Error, HandlerReply, IntentTag, RouteContext, TurnRequest,
};
use waymark_recall::RecallEngine;

const LIVE_INSTRUCTION: &str = "You are Waymark, a personal assistant. The search results below \
were fetched for the user's question just now. Answer from them, citing the source title where \
it matters, and say when the results do not settle the question.";

const STUB_INSTRUCTION: &str = "You are Waymark, a personal assistant. Live web search is not \
configured, so you cannot check current sources. Answer from what you already know, and state \
clearly that the answer was not verified against the live web.";

/// How many results a lookup requests from the provider.
const RESULT_LIMIT: usize = 3;

/// One result from a search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A pluggable live-search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// The provider name, for logs.
    fn name(&self) -> &str;

    /// Run a query, returning up to `limit` results.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, Error>;
}

/// Answers lookup-style questions, with or without a live search backend.
pub struct WebLookupHandler {
    engine: Arc<RecallEngine>,
    completion: Arc<dyn Completion>,
    provider: Option<Arc<dyn SearchProvider>>,
}

impl WebLookupHandler {
    /// Create the handler in stub mode (no live search).
    pub fn new(engine: Arc<RecallEngine>, completion: Arc<dyn Completion>) -> Self {
        Self {
            engine,
            completion,
            provider: None,
        }
    }

    /// Attach a live search provider.
    pub fn with_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// The system instruction for this turn, plus whether live results back it.
    async fn build_instruction(&self, query: &str) -> (String, bool) {
        let Some(provider) = &self.provider else {
            return (STUB_INSTRUCTION.to_string(), false);
        };
        match provider.search(query, RESULT_LIMIT).await {
            Ok(hits) if !hits.is_empty() => (render_results(&hits), true),
            Ok(_) => {
                let text = format!(
                    "{LIVE_INSTRUCTION}\n\nThe search returned no results for this question."
                );
                (text, true)
            }
            Err(err) => {
                warn!(
                    provider = provider.name(),
                    error = %err,
                    "Search provider failed, answering without live results"
                );
                (STUB_INSTRUCTION.to_string(), false)
            }
        }
    }
}

fn render_results(hits: &[SearchHit]) -> String {
    let mut text = format!("{LIVE_INSTRUCTION}\n\nSearch results:");
    for (i, hit) in hits.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} ({})\n   {}",
            i + 1,
            hit.title,
            hit.url,
            hit.snippet
        ));
    }
    text
}

#[async_trait]
impl CapabilityHandler for WebLookupHandler {
    fn name(&self) -> &str {
        "web-lookup"
    }

    fn description(&self) -> &str {
        "Answers lookup questions, using live search when a provider is configured"
    }

    fn intent_tags(&self) -> &[IntentTag] {
        &[IntentTag::WebLookup]
    }

    async fn handle(
        &self,
        turn: &TurnRequest,
        _ctx: &RouteContext,
    ) -> Result<HandlerReply, Error> {
        let outcome = self.engine.recall_recency(turn).await?;
        let (instruction, live) = self.build_instruction(&turn.text).await;
        let text = self
            .completion
            .complete(&instruction, &outcome.turns, &outcome.items)
            .await?;
        self.engine.record_reply(&outcome.session_key, &text).await?;

        Ok(HandlerReply::new(self.name(), text).with_metadata("live_search", json!(live)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{engine_fixture, ScriptedCompletion};
    use waymark_core::session::UserId;

    struct CannedProvider {
        hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl SearchProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, Error> {
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl SearchProvider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, Error> {
            Err(Error::Internal("search endpoint unreachable".into()))
        }
    }

    fn request(text: &str) -> TurnRequest {
        TurnRequest::new("test-app", UserId::from("user-web"), text)
    }

    #[tokio::test]
    async fn stub_mode_discloses_missing_search() {
        let fx = engine_fixture();
        let completion = Arc::new(ScriptedCompletion::single(
            "I can't check live news right now, but as of my knowledge...",
        ));
        let handler = WebLookupHandler::new(fx.engine.clone(), completion.clone());

        let reply = handler
            .handle(&request("latest headlines please"), &RouteContext::default())
            .await
            .unwrap();

        assert_eq!(reply.metadata["live_search"], false);
        assert!(completion.calls()[0]
            .system_instruction
            .contains("not configured"));
    }

    #[tokio::test]
    async fn provider_results_reach_the_completion() {
        let fx = engine_fixture();
        let completion = Arc::new(ScriptedCompletion::single("Cloudy with showers later."));
        let provider = Arc::new(CannedProvider {
            hits: vec![SearchHit {
                title: "City Forecast".into(),
                url: "https://weather.example/city".into(),
                snippet: "Cloudy, 60% chance of rain after noon.".into(),
            }],
        });
        let handler =
            WebLookupHandler::new(fx.engine.clone(), completion.clone()).with_provider(provider);

        let reply = handler
            .handle(&request("what's the weather today?"), &RouteContext::default())
            .await
            .unwrap();

        assert_eq!(reply.metadata["live_search"], true);
        let instruction = &completion.calls()[0].system_instruction;
        assert!(instruction.contains("City Forecast"));
        assert!(instruction.contains("60% chance of rain"));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_stub_mode() {
        let fx = engine_fixture();
        let completion = Arc::new(ScriptedCompletion::single("Answering from memory of the world."));
        let handler = WebLookupHandler::new(fx.engine.clone(), completion.clone())
            .with_provider(Arc::new(BrokenProvider));

        let reply = handler
            .handle(&request("search for train strikes"), &RouteContext::default())
            .await
            .unwrap();

        assert_eq!(reply.metadata["live_search"], false);
        assert!(completion.calls()[0]
            .system_instruction
            .contains("not configured"));
    }

    #[tokio::test]
    async fn lookup_never_spends_semantic_budget() {
        let fx = engine_fixture();
        let handler = WebLookupHandler::new(
            fx.engine.clone(),
            Arc::new(ScriptedCompletion::single("ok")),
        );
        let user = UserId::from("user-web");

        handler
            .handle(&request("look up the exchange rate"), &RouteContext::default())
            .await
            .unwrap();

        assert_eq!(
            fx.governor.remaining(&user, waymark_budget::Window::Daily),
            fx.governor.daily_ceiling()
        );
    }
}
