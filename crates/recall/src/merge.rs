//! Merge policy for hybrid recall.
//!
//! Lexical turns and semantic hits arrive as [`RecalledItem`]s; this module
//! deduplicates them by normalized text, orders them by a composite key, and
//! caps the result. Ordering: relevance score descending, ties broken by
//! recency descending. Lexical items carry no score and sort after every
//! scored item, newest first.

use std::cmp::Ordering;
use std::collections::HashSet;

use waymark_core::RecalledItem;

/// Canonical form used for duplicate detection: trimmed, lowercased, inner
/// whitespace runs collapsed to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn rank(a: &RecalledItem, b: &RecalledItem) -> Ordering {
    match (a.score, b.score) {
        (Some(x), Some(y)) => y
            .partial_cmp(&x)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.timestamp.cmp(&a.timestamp)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.timestamp.cmp(&a.timestamp),
    }
}

/// Merge the lexical and semantic tiers into one bounded context block.
///
/// When two items normalize to the same text, the higher-ranked one
/// survives, so a semantic hit wins over the lexical copy of the same
/// sentence and keeps its relevance score.
pub fn merge(
    lexical: Vec<RecalledItem>,
    semantic: Vec<RecalledItem>,
    cap: usize,
) -> Vec<RecalledItem> {
    let mut items: Vec<RecalledItem> = semantic.into_iter().chain(lexical).collect();
    items.sort_by(rank);

    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(items.len().min(cap));
    for item in items {
        if merged.len() == cap {
            break;
        }
        if seen.insert(normalize(&item.text)) {
            merged.push(item);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use waymark_core::{MemoryCategory, MemoryHit, MemoryTier};

    fn hit(text: &str, score: f32) -> RecalledItem {
        RecalledItem::semantic(&MemoryHit {
            record_id: "r".into(),
            text: text.into(),
            score,
            category: MemoryCategory::Conversation,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn normalize_collapses_case_and_whitespace() {
        assert_eq!(normalize("  Budget   Review "), "budget review");
        assert_eq!(normalize("budget review"), "budget review");
        assert_eq!(normalize("Tabs\tand\nnewlines"), "tabs and newlines");
    }

    #[test]
    fn scored_items_precede_lexical() {
        let now = Utc::now();
        let merged = merge(
            vec![RecalledItem::lexical("what was that again", now)],
            vec![hit("prefers tea over coffee", 0.4)],
            10,
        );
        assert_eq!(merged[0].tier, MemoryTier::Semantic);
        assert_eq!(merged[1].tier, MemoryTier::Lexical);
    }

    #[test]
    fn lexical_items_order_newest_first() {
        let now = Utc::now();
        let merged = merge(
            vec![
                RecalledItem::lexical("older turn", now - Duration::minutes(5)),
                RecalledItem::lexical("newest turn", now),
            ],
            vec![],
            10,
        );
        assert_eq!(merged[0].text, "newest turn");
        assert_eq!(merged[1].text, "older turn");
    }

    #[test]
    fn equal_scores_break_ties_by_recency() {
        let old = MemoryHit {
            record_id: "r1".into(),
            text: "stale note".into(),
            score: 0.7,
            category: MemoryCategory::Fact,
            created_at: Utc::now() - Duration::days(30),
        };
        let fresh = MemoryHit {
            record_id: "r2".into(),
            text: "fresh note".into(),
            score: 0.7,
            category: MemoryCategory::Fact,
            created_at: Utc::now(),
        };
        let merged = merge(
            vec![],
            vec![RecalledItem::semantic(&old), RecalledItem::semantic(&fresh)],
            10,
        );
        assert_eq!(merged[0].text, "fresh note");
    }

    #[test]
    fn duplicates_collapse_and_semantic_copy_wins() {
        let now = Utc::now();
        let merged = merge(
            vec![RecalledItem::lexical("  Monthly   budget review ", now)],
            vec![hit("monthly budget review", 0.9)],
            10,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].tier, MemoryTier::Semantic);
        assert_eq!(merged[0].score, Some(0.9));
    }

    #[test]
    fn cap_bounds_merged_output() {
        let now = Utc::now();
        let lexical = vec![
            RecalledItem::lexical("turn one", now),
            RecalledItem::lexical("turn two", now),
            RecalledItem::lexical("Turn  One", now),
        ];
        let semantic = vec![
            hit("note a", 0.9),
            hit("note b", 0.8),
            hit("note c", 0.7),
            hit("NOTE A", 0.6),
            hit("note d", 0.5),
        ];

        let merged = merge(lexical, semantic, 6);
        assert!(merged.len() <= 6);

        let normalized: Vec<String> = merged.iter().map(|i| normalize(&i.text)).collect();
        let mut deduped = normalized.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(normalized.len(), deduped.len());
    }

    #[test]
    fn empty_tiers_merge_empty() {
        assert!(merge(vec![], vec![], 6).is_empty());
    }
}
