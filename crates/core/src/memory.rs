//! Long-term memory types and the semantic index contract.
//!
//! Each user owns at most one corpus — a searchable collection of memory
//! records written once and read many times. Newly written records are not
//! guaranteed immediately queryable: the index has an eventual-consistency
//! delay, and callers must never treat the absence of a just-written record
//! as an error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::session::{SessionId, UserId};

/// Reference to a user's corpus in the semantic index backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRef {
    /// Backend resource identifier (path, id — whatever the backend uses).
    pub resource: String,

    /// The owning user.
    pub user_id: UserId,

    /// Deterministic display name derived from the user id.
    pub display_name: String,
}

impl CorpusRef {
    /// The deterministic corpus display name for a user.
    pub fn display_name_for(user_id: &UserId) -> String {
        format!("user-memory-{user_id}")
    }
}

/// Category tag carried by every memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// Saved conversational exchange (default)
    #[default]
    Conversation,
    /// A stated user preference
    Preference,
    /// A goal the user is working toward
    Goal,
    /// A standalone fact about the user or their world
    Fact,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Preference => "preference",
            Self::Goal => "goal",
            Self::Fact => "fact",
        }
    }
}

/// Confirmed reference to a stored memory record.
///
/// Writers must not assume a write succeeded without one of these in hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecordRef {
    pub record_id: String,
    pub corpus: String,
}

/// A scored hit from a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub record_id: String,

    /// The stored memory text.
    pub text: String,

    /// Relevance score, higher is more relevant.
    pub score: f32,

    #[serde(default)]
    pub category: MemoryCategory,

    /// When the underlying record was written.
    pub created_at: DateTime<Utc>,
}

/// Which recall tier an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// Literal recent turn history, no semantic ranking
    Lexical,
    /// Similarity search over the long-term corpus
    Semantic,
}

/// One item of merged memory context handed to the completion capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalledItem {
    pub text: String,
    pub tier: MemoryTier,

    /// Relevance score for semantic items; lexical items carry none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,

    pub timestamp: DateTime<Utc>,
}

impl RecalledItem {
    /// Wrap a session turn as a lexical recall item.
    pub fn lexical(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            tier: MemoryTier::Lexical,
            score: None,
            timestamp,
        }
    }

    /// Wrap a semantic hit as a recall item.
    pub fn semantic(hit: &MemoryHit) -> Self {
        Self {
            text: hit.text.clone(),
            tier: MemoryTier::Semantic,
            score: Some(hit.score),
            timestamp: hit.created_at,
        }
    }
}

/// The semantic memory index contract.
///
/// Implementations: REST client against the external vector-search service,
/// in-memory (for tests and local runs).
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// The backend name (e.g., "rest", "in-memory").
    fn name(&self) -> &str;

    /// Return the user's corpus, creating it if absent. Idempotent: a
    /// duplicate-create race with a concurrent caller is absorbed (the
    /// backend's "already exists" rejection is treated as success and the
    /// winner's reference adopted) — no error surfaces from the race.
    async fn ensure_corpus(&self, user_id: &UserId)
    -> std::result::Result<CorpusRef, IndexError>;

    /// Embed and store one memory. Fails with `WriteFailed` on backend
    /// failure; only a returned ref confirms the write.
    async fn add_memory(
        &self,
        corpus: &CorpusRef,
        text: &str,
        category: MemoryCategory,
        source_session: &SessionId,
    ) -> std::result::Result<MemoryRecordRef, IndexError>;

    /// Similarity search within one corpus. Hits ordered by score descending;
    /// at most `top_k`, possibly fewer.
    async fn query(
        &self,
        corpus: &CorpusRef,
        query_text: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<MemoryHit>, IndexError>;

    /// Similarity search across several corpora. Queries at most
    /// `max_corpora` of the supplied refs — a deterministic prefix in input
    /// order, never a sample — so per-query cost does not scale with corpus
    /// count. Results are merged and re-sorted by score descending.
    async fn query_bounded_multi(
        &self,
        corpora: &[CorpusRef],
        query_text: &str,
        top_k_per_corpus: usize,
        max_corpora: usize,
    ) -> std::result::Result<Vec<MemoryHit>, IndexError>;

    /// All corpora known to the backend. Operator/test-facing.
    async fn list_corpora(&self) -> std::result::Result<Vec<CorpusRef>, IndexError>;

    /// Remove a corpus and evict its cached reference. Returns false when it
    /// did not exist. Operator-facing; the request path never calls this.
    async fn delete_corpus(&self, corpus: &CorpusRef) -> std::result::Result<bool, IndexError>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> std::result::Result<(), IndexError>;
}
