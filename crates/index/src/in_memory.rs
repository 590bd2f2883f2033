//! In-memory index backend — useful for testing and ephemeral deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;
use waymark_core::error::IndexError;
use waymark_core::memory::{
    CorpusRef, MemoryCategory, MemoryHit, MemoryRecordRef, SemanticIndex,
};
use waymark_core::session::{SessionId, UserId};

use crate::cache::CorpusCache;

/// An in-memory index that stores memories per corpus and scores queries by
/// keyword overlap. Useful for tests and deployments where no external
/// vector-search service is configured.
///
/// New records are not queryable immediately when a visibility lag is set:
/// each write sits in a pending queue and surfaces only after that many
/// queries have been served against its corpus. This mirrors the indexing
/// delay of real backends, so callers can be exercised against it.
pub struct InMemoryIndex {
    corpora: RwLock<HashMap<String, CorpusSlot>>,
    cache: CorpusCache,
    visibility_lag: usize,
    unavailable: AtomicBool,
    next_corpus: AtomicU64,
}

struct CorpusSlot {
    corpus: CorpusRef,
    visible: Vec<StoredMemory>,
    pending: VecDeque<(usize, StoredMemory)>,
}

impl CorpusSlot {
    fn new(corpus: CorpusRef) -> Self {
        Self {
            corpus,
            visible: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// One query has been served; age the pending queue and promote records
    /// whose countdown has expired.
    fn tick(&mut self) {
        for entry in &mut self.pending {
            entry.0 = entry.0.saturating_sub(1);
        }
        while self.pending.front().is_some_and(|(remaining, _)| *remaining == 0) {
            if let Some((_, record)) = self.pending.pop_front() {
                self.visible.push(record);
            }
        }
    }

    fn settle(&mut self) {
        while let Some((_, record)) = self.pending.pop_front() {
            self.visible.push(record);
        }
    }
}

#[derive(Clone)]
struct StoredMemory {
    record_id: String,
    text: String,
    category: MemoryCategory,
    /// Provenance, kept as real backends keep it in document metadata.
    #[allow(dead_code)]
    source_session: SessionId,
    created_at: DateTime<Utc>,
}

impl StoredMemory {
    fn to_hit(&self, score: f32) -> MemoryHit {
        MemoryHit {
            record_id: self.record_id.clone(),
            text: self.text.clone(),
            score,
            category: self.category,
            created_at: self.created_at,
        }
    }
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            corpora: RwLock::new(HashMap::new()),
            cache: CorpusCache::new(),
            visibility_lag: 0,
            unavailable: AtomicBool::new(false),
            next_corpus: AtomicU64::new(1),
        }
    }

    /// Delay new records by `lag` queries before they become visible.
    pub fn with_visibility_lag(mut self, lag: usize) -> Self {
        self.visibility_lag = lag;
        self
    }

    /// Simulate a backend outage. While set, every operation fails with
    /// [`IndexError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Promote all pending records immediately.
    pub async fn settle(&self) {
        let mut corpora = self.corpora.write().await;
        for slot in corpora.values_mut() {
            slot.settle();
        }
    }

    fn ensure_available(&self) -> Result<(), IndexError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn query_terms(query_text: &str) -> Vec<String> {
    query_text
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Keyword relevance: term occurrences normalized by content length, so a
/// short dense match outranks a long document that mentions a term once.
fn keyword_score(text: &str, terms: &[String]) -> f32 {
    let haystack = text.to_lowercase();
    let occurrences: usize = terms
        .iter()
        .map(|t| haystack.matches(t.as_str()).count())
        .sum();
    occurrences as f32 / (text.len() as f32 / 100.0).max(1.0)
}

#[async_trait]
impl SemanticIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn ensure_corpus(&self, user_id: &UserId) -> Result<CorpusRef, IndexError> {
        self.ensure_available()?;

        if let Some(cached) = self.cache.get(user_id).await {
            return Ok(cached);
        }

        let display_name = CorpusRef::display_name_for(user_id);
        let mut corpora = self.corpora.write().await;
        let corpus = match corpora
            .values()
            .find(|slot| slot.corpus.display_name == display_name)
        {
            Some(slot) => slot.corpus.clone(),
            None => {
                let n = self.next_corpus.fetch_add(1, Ordering::Relaxed);
                let corpus = CorpusRef {
                    resource: format!("mem/corpora/{n}"),
                    user_id: user_id.clone(),
                    display_name,
                };
                corpora.insert(corpus.resource.clone(), CorpusSlot::new(corpus.clone()));
                corpus
            }
        };
        drop(corpora);

        self.cache.insert(corpus.clone()).await;
        Ok(corpus)
    }

    async fn add_memory(
        &self,
        corpus: &CorpusRef,
        text: &str,
        category: MemoryCategory,
        source_session: &SessionId,
    ) -> Result<MemoryRecordRef, IndexError> {
        self.ensure_available()?;

        let mut corpora = self.corpora.write().await;
        let slot = corpora
            .get_mut(&corpus.resource)
            .ok_or_else(|| IndexError::CorpusNotFound(corpus.resource.clone()))?;

        let record = StoredMemory {
            record_id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            category,
            source_session: source_session.clone(),
            created_at: Utc::now(),
        };
        let record_ref = MemoryRecordRef {
            record_id: record.record_id.clone(),
            corpus: corpus.resource.clone(),
        };

        if self.visibility_lag == 0 {
            slot.visible.push(record);
        } else {
            slot.pending.push_back((self.visibility_lag, record));
        }
        Ok(record_ref)
    }

    async fn query(
        &self,
        corpus: &CorpusRef,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<MemoryHit>, IndexError> {
        self.ensure_available()?;

        let terms = query_terms(query_text);
        let mut corpora = self.corpora.write().await;
        let slot = corpora
            .get_mut(&corpus.resource)
            .ok_or_else(|| IndexError::CorpusNotFound(corpus.resource.clone()))?;

        let mut hits: Vec<MemoryHit> = slot
            .visible
            .iter()
            .filter_map(|record| {
                let score = keyword_score(&record.text, &terms);
                (score > 0.0).then(|| record.to_hit(score))
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);

        slot.tick();
        Ok(hits)
    }

    async fn query_bounded_multi(
        &self,
        corpora: &[CorpusRef],
        query_text: &str,
        top_k_per_corpus: usize,
        max_corpora: usize,
    ) -> Result<Vec<MemoryHit>, IndexError> {
        self.ensure_available()?;

        let mut all = Vec::new();
        for corpus in corpora.iter().take(max_corpora) {
            match self.query(corpus, query_text, top_k_per_corpus).await {
                Ok(mut hits) => all.append(&mut hits),
                Err(err) => {
                    tracing::warn!(corpus = %corpus.resource, error = %err, "skipping corpus in multi-corpus query");
                }
            }
        }
        all.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(all)
    }

    async fn list_corpora(&self) -> Result<Vec<CorpusRef>, IndexError> {
        self.ensure_available()?;

        let corpora = self.corpora.read().await;
        let mut refs: Vec<CorpusRef> = corpora.values().map(|slot| slot.corpus.clone()).collect();
        refs.sort_by(|a, b| a.resource.cmp(&b.resource));
        Ok(refs)
    }

    async fn delete_corpus(&self, corpus: &CorpusRef) -> Result<bool, IndexError> {
        self.ensure_available()?;

        let removed = self.corpora.write().await.remove(&corpus.resource).is_some();
        if removed {
            self.cache.remove(&corpus.user_id).await;
        }
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), IndexError> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn seeded_corpus(index: &InMemoryIndex, user: &str) -> CorpusRef {
        index.ensure_corpus(&UserId::from(user)).await.unwrap()
    }

    #[tokio::test]
    async fn ensure_corpus_is_idempotent() {
        let index = InMemoryIndex::new();
        let first = seeded_corpus(&index, "alice").await;
        let second = seeded_corpus(&index, "alice").await;

        assert_eq!(first.resource, second.resource);
        assert_eq!(first.display_name, "user-memory-alice");
        assert_eq!(index.list_corpora().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_ensure_corpus_yields_one_corpus() {
        let index = Arc::new(InMemoryIndex::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                index.ensure_corpus(&UserId::from("alice")).await.unwrap()
            }));
        }

        let mut resources = Vec::new();
        for handle in handles {
            resources.push(handle.await.unwrap().resource);
        }
        resources.dedup();
        assert_eq!(resources.len(), 1);
        assert_eq!(index.list_corpora().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_then_query_finds_record() {
        let index = InMemoryIndex::new();
        let corpus = seeded_corpus(&index, "alice").await;
        let session = SessionId::new();

        index
            .add_memory(&corpus, "User prefers oat milk in coffee", MemoryCategory::Preference, &session)
            .await
            .unwrap();

        let hits = index.query(&corpus, "coffee", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[0].category, MemoryCategory::Preference);
    }

    #[tokio::test]
    async fn denser_match_ranks_higher() {
        let index = InMemoryIndex::new();
        let corpus = seeded_corpus(&index, "alice").await;
        let session = SessionId::new();

        index
            .add_memory(&corpus, "budget review: budget is tight", MemoryCategory::Fact, &session)
            .await
            .unwrap();
        index
            .add_memory(
                &corpus,
                "A very long note that mentions the budget once among many other unrelated words about travel and cooking and weekend plans",
                MemoryCategory::Fact,
                &session,
            )
            .await
            .unwrap();

        let hits = index.query(&corpus, "budget", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.starts_with("budget review"));
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn top_k_bounds_results() {
        let index = InMemoryIndex::new();
        let corpus = seeded_corpus(&index, "alice").await;
        let session = SessionId::new();

        for i in 0..5 {
            index
                .add_memory(&corpus, &format!("note {i} about travel"), MemoryCategory::Conversation, &session)
                .await
                .unwrap();
        }

        let hits = index.query(&corpus, "travel", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn visibility_lag_delays_new_records() {
        let index = InMemoryIndex::new().with_visibility_lag(1);
        let corpus = seeded_corpus(&index, "alice").await;
        let session = SessionId::new();

        index
            .add_memory(&corpus, "User was born in Lisbon", MemoryCategory::Fact, &session)
            .await
            .unwrap();

        // Not yet queryable. This is an empty result, not an error.
        let first = index.query(&corpus, "Lisbon", 10).await.unwrap();
        assert!(first.is_empty());

        let second = index.query(&corpus, "Lisbon", 10).await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn settle_promotes_pending_records() {
        let index = InMemoryIndex::new().with_visibility_lag(3);
        let corpus = seeded_corpus(&index, "alice").await;
        let session = SessionId::new();

        index
            .add_memory(&corpus, "User was born in Lisbon", MemoryCategory::Fact, &session)
            .await
            .unwrap();
        index.settle().await;

        let hits = index.query(&corpus, "Lisbon", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn multi_corpus_query_caps_at_max_corpora() {
        let index = InMemoryIndex::new();
        let session = SessionId::new();
        let mut corpora = Vec::new();
        for user in ["a", "b", "c"] {
            let corpus = seeded_corpus(&index, user).await;
            index
                .add_memory(&corpus, &format!("user {user} likes sailing"), MemoryCategory::Preference, &session)
                .await
                .unwrap();
            corpora.push(corpus);
        }

        let hits = index
            .query_bounded_multi(&corpora, "sailing", 10, 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| !h.text.contains("user c")));
    }

    #[tokio::test]
    async fn configured_corpus_cap_queries_exactly_the_prefix() {
        let memory = waymark_config::MemorySection::default();
        let index = InMemoryIndex::new();
        let session = SessionId::new();

        let mut corpora = Vec::new();
        for i in 0..memory.max_corpora_per_query + 2 {
            let corpus = seeded_corpus(&index, &format!("crew-{i}")).await;
            index
                .add_memory(&corpus, &format!("crew {i} rows daily"), MemoryCategory::Fact, &session)
                .await
                .unwrap();
            corpora.push(corpus);
        }

        let hits = index
            .query_bounded_multi(&corpora, "rows", 10, memory.max_corpora_per_query)
            .await
            .unwrap();
        assert_eq!(hits.len(), memory.max_corpora_per_query);
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let index = InMemoryIndex::new();
        let corpus = seeded_corpus(&index, "alice").await;

        index.set_unavailable(true);
        assert!(matches!(
            index.query(&corpus, "anything", 10).await,
            Err(IndexError::Unavailable(_))
        ));
        assert!(index.ensure_corpus(&UserId::from("bob")).await.is_err());
        assert!(index.health_check().await.is_err());

        index.set_unavailable(false);
        assert!(index.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn delete_corpus_evicts_cached_reference() {
        let index = InMemoryIndex::new();
        let first = seeded_corpus(&index, "alice").await;

        assert!(index.delete_corpus(&first).await.unwrap());
        assert!(index.list_corpora().await.unwrap().is_empty());

        // A fresh resolve creates a new corpus rather than serving the stale ref.
        let second = seeded_corpus(&index, "alice").await;
        assert_ne!(first.resource, second.resource);
    }
}
