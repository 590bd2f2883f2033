//! Background memory indexer — fire-and-forget semantic writes.
//!
//! The response path never waits on the long-term index: turns worth keeping
//! are pushed onto an mpsc queue and a detached worker task writes them out.
//! Failures are logged and published as events, never raised; a full queue
//! drops the turn (at-most-once, best-effort).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use waymark_core::event::{DomainEvent, EventBus};
use waymark_core::memory::{MemoryCategory, SemanticIndex};
use waymark_core::session::{SessionId, UserId};

const QUEUE_CAPACITY: usize = 256;

/// Handle to the background indexing worker.
pub struct BackgroundIndexer {
    tx: mpsc::Sender<Job>,
    min_chars: usize,
}

enum Job {
    Index {
        user_id: UserId,
        session_id: SessionId,
        text: String,
        category: MemoryCategory,
        /// Whether the originating request recorded a budget spend. A failed
        /// write after a charge is logged as billing without benefit.
        charged: bool,
    },
    Flush(oneshot::Sender<()>),
}

impl BackgroundIndexer {
    /// Start the worker task. The worker stops when the handle is dropped
    /// and the queue drains.
    pub fn spawn(index: Arc<dyn SemanticIndex>, events: Arc<EventBus>, min_chars: usize) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run(index, events, rx));
        Self { tx, min_chars }
    }

    /// Queue one turn for indexing. Returns whether it was accepted: turns
    /// shorter than the minimum are not worth an embedding and are skipped,
    /// and a full queue drops rather than blocks.
    pub fn enqueue(
        &self,
        user_id: UserId,
        session_id: SessionId,
        text: &str,
        category: MemoryCategory,
        charged: bool,
    ) -> bool {
        let trimmed = text.trim();
        if trimmed.len() < self.min_chars {
            debug!(user_id = %user_id, "Turn too short to index, skipping");
            return false;
        }

        let job = Job::Index {
            user_id,
            session_id,
            text: trimmed.to_string(),
            category,
            charged,
        };
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Index queue unavailable, dropping turn");
                false
            }
        }
    }

    /// Wait until every job queued before this call has been processed.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Job::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn run(index: Arc<dyn SemanticIndex>, events: Arc<EventBus>, mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
            Job::Index {
                user_id,
                session_id,
                text,
                category,
                charged,
            } => {
                write_one(
                    index.as_ref(),
                    events.as_ref(),
                    user_id,
                    session_id,
                    text,
                    category,
                    charged,
                )
                .await;
            }
        }
    }
    debug!("Background indexer stopped");
}

async fn write_one(
    index: &dyn SemanticIndex,
    events: &EventBus,
    user_id: UserId,
    session_id: SessionId,
    text: String,
    category: MemoryCategory,
    charged: bool,
) {
    let result = async {
        let corpus = index.ensure_corpus(&user_id).await?;
        index.add_memory(&corpus, &text, category, &session_id).await
    }
    .await;

    match result {
        Ok(record) => {
            debug!(user_id = %user_id, record_id = %record.record_id, "Indexed turn");
            events.publish(DomainEvent::MemoryIndexed {
                user_id: user_id.to_string(),
                record_id: record.record_id,
                timestamp: Utc::now(),
            });
        }
        Err(err) => {
            if charged {
                warn!(user_id = %user_id, error = %err, "Memory write failed after a charged semantic pass");
            } else {
                warn!(user_id = %user_id, error = %err, "Memory write failed");
            }
            events.publish(DomainEvent::IndexWriteFailed {
                user_id: user_id.to_string(),
                reason: err.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waymark_index::InMemoryIndex;

    fn fixture() -> (Arc<InMemoryIndex>, Arc<EventBus>, BackgroundIndexer) {
        let index = Arc::new(InMemoryIndex::new());
        let events = Arc::new(EventBus::default());
        let indexer = BackgroundIndexer::spawn(index.clone(), events.clone(), 10);
        (index, events, indexer)
    }

    #[tokio::test]
    async fn queued_turn_reaches_corpus() {
        let (index, _events, indexer) = fixture();
        let user = UserId::from("alice");

        let accepted = indexer.enqueue(
            user.clone(),
            SessionId::new(),
            "I want to save more for retirement this year",
            MemoryCategory::Conversation,
            true,
        );
        assert!(accepted);
        indexer.flush().await;

        let corpus = index.ensure_corpus(&user).await.unwrap();
        let hits = index.query(&corpus, "retirement", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn short_turns_are_not_enqueued() {
        let (index, _events, indexer) = fixture();

        let accepted = indexer.enqueue(
            UserId::from("alice"),
            SessionId::new(),
            "   ok   ",
            MemoryCategory::Conversation,
            false,
        );
        assert!(!accepted);
        indexer.flush().await;

        // Never touched the backend: no corpus was resolved.
        assert!(index.list_corpora().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_failure_is_logged_never_raised() {
        let (index, events, indexer) = fixture();
        let mut rx = events.subscribe();
        index.set_unavailable(true);

        let accepted = indexer.enqueue(
            UserId::from("alice"),
            SessionId::new(),
            "a perfectly indexable sentence",
            MemoryCategory::Conversation,
            true,
        );
        assert!(accepted);
        indexer.flush().await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::IndexWriteFailed { user_id, .. } if user_id == "alice"
        ));
    }

    #[tokio::test]
    async fn flush_on_idle_queue_returns() {
        let (_index, _events, indexer) = fixture();
        indexer.flush().await;
    }

    #[tokio::test]
    async fn successful_write_publishes_event() {
        let (_index, events, indexer) = fixture();
        let mut rx = events.subscribe();

        indexer.enqueue(
            UserId::from("bob"),
            SessionId::new(),
            "bob is training for a marathon in May",
            MemoryCategory::Goal,
            false,
        );
        indexer.flush().await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::MemoryIndexed { user_id, .. } if user_id == "bob"
        ));
    }
}
