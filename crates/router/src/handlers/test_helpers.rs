//! Shared test helpers for handler tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use waymark_budget::CallGovernor;
use waymark_config::CoreConfig;
use waymark_core::error::CompletionError;
use waymark_core::event::EventBus;
use waymark_core::memory::RecalledItem;
use waymark_core::session::Turn;
use waymark_core::Completion;
use waymark_index::InMemoryIndex;
use waymark_recall::RecallEngine;
use waymark_session::InMemorySessionStore;

/// A completion that returns scripted replies in order and records what each
/// call was given. Panics if more calls are made than replies scripted.
pub struct ScriptedCompletion {
    replies: Mutex<Vec<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Clone)]
pub struct RecordedCall {
    pub system_instruction: String,
    pub turn_count: usize,
    pub memory_item_count: usize,
    pub last_turn_text: Option<String>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn single(reply: &str) -> Self {
        Self::new(vec![reply])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        system_instruction: &str,
        turns: &[Turn],
        memory_context: &[RecalledItem],
    ) -> Result<String, CompletionError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_instruction: system_instruction.to_string(),
            turn_count: turns.len(),
            memory_item_count: memory_context.len(),
            last_turn_text: turns.last().map(|t| t.text.clone()),
        });

        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            panic!("ScriptedCompletion: no more replies scripted");
        }
        Ok(replies.remove(0))
    }
}

/// A completion that always fails, for error-path tests.
pub struct FailingCompletion;

#[async_trait]
impl Completion for FailingCompletion {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(
        &self,
        _system_instruction: &str,
        _turns: &[Turn],
        _memory_context: &[RecalledItem],
    ) -> Result<String, CompletionError> {
        Err(CompletionError::Unavailable("scripted outage".into()))
    }
}

/// A fully wired engine over in-memory backends.
pub struct EngineFixture {
    pub store: Arc<InMemorySessionStore>,
    pub index: Arc<InMemoryIndex>,
    pub governor: Arc<CallGovernor>,
    pub events: Arc<EventBus>,
    pub engine: Arc<RecallEngine>,
}

pub fn engine_fixture() -> EngineFixture {
    engine_fixture_with(20, 100)
}

pub fn engine_fixture_with(daily: u32, weekly: u32) -> EngineFixture {
    let store = Arc::new(InMemorySessionStore::new());
    let index = Arc::new(InMemoryIndex::new());
    let governor = Arc::new(CallGovernor::new(daily, weekly));
    let events = Arc::new(EventBus::default());
    let engine = Arc::new(RecallEngine::new(
        store.clone(),
        index.clone(),
        governor.clone(),
        events.clone(),
        &CoreConfig::default(),
    ));
    EngineFixture {
        store,
        index,
        governor,
        events,
        engine,
    }
}
