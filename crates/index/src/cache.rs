//! Corpus reference cache — avoids re-resolving corpora on every recall.

use std::collections::HashMap;

use tokio::sync::RwLock;
use waymark_core::{CorpusRef, UserId};

/// Read-mostly cache of resolved corpus references, keyed by user.
///
/// Resolving a corpus costs a list call (and sometimes a create) against the
/// backend, so backends check here first on every recall. References stay
/// valid until the corpus is deleted, at which point [`CorpusCache::remove`]
/// evicts the entry. When two tasks resolve the same user concurrently, both
/// inserts land and the last one wins; the entries point at the same corpus
/// either way because corpus names are derived from the user id.
pub struct CorpusCache {
    entries: RwLock<HashMap<UserId, CorpusRef>>,
}

impl CorpusCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, user_id: &UserId) -> Option<CorpusRef> {
        self.entries.read().await.get(user_id).cloned()
    }

    pub async fn insert(&self, corpus: CorpusRef) {
        self.entries
            .write()
            .await
            .insert(corpus.user_id.clone(), corpus);
    }

    pub async fn remove(&self, user_id: &UserId) -> Option<CorpusRef> {
        self.entries.write().await.remove(user_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for CorpusCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus_for(user: &str) -> CorpusRef {
        let user_id = UserId::from(user);
        CorpusRef {
            resource: format!("corpora/{user}"),
            display_name: CorpusRef::display_name_for(&user_id),
            user_id,
        }
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = CorpusCache::new();
        let alice = UserId::from("alice");
        assert!(cache.get(&alice).await.is_none());

        cache.insert(corpus_for("alice")).await;
        let hit = cache.get(&alice).await.unwrap();
        assert_eq!(hit.resource, "corpora/alice");
        assert_eq!(hit.display_name, "user-memory-alice");
    }

    #[tokio::test]
    async fn last_insert_wins() {
        let cache = CorpusCache::new();
        let alice = UserId::from("alice");

        cache.insert(corpus_for("alice")).await;
        let mut rival = corpus_for("alice");
        rival.resource = "corpora/alice-2".into();
        cache.insert(rival).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&alice).await.unwrap().resource, "corpora/alice-2");
    }

    #[tokio::test]
    async fn remove_evicts() {
        let cache = CorpusCache::new();
        let bob = UserId::from("bob");
        cache.insert(corpus_for("bob")).await;

        assert!(cache.remove(&bob).await.is_some());
        assert!(cache.get(&bob).await.is_none());
        assert!(cache.is_empty().await);
    }
}
