//! Keyword-based intent detection.
//!
//! No NLU here: the turn text is lowercased and tokenized, and each tag's
//! vocabulary is checked against it. Single-word entries match whole tokens;
//! multi-word entries match as phrases. A turn can carry several tags; the
//! output order is fixed so routing stays deterministic.

use std::collections::HashSet;

use waymark_core::IntentTag;

const MEMORY_VOCABULARY: &[&str] = &[
    "remember",
    "remembered",
    "recall",
    "forget",
    "forgot",
    "memory",
    "memories",
    "remind",
    "mentioned",
    "last time",
    "previously",
    "we talked",
    "told you",
];

const FINANCE_VOCABULARY: &[&str] = &[
    "budget",
    "money",
    "savings",
    "saving",
    "invest",
    "investment",
    "investments",
    "debt",
    "loan",
    "mortgage",
    "salary",
    "spending",
    "retirement",
    "tax",
    "taxes",
    "finances",
    "financial",
];

const BUSINESS_VOCABULARY: &[&str] = &[
    "business",
    "startup",
    "strategy",
    "marketing",
    "customers",
    "revenue",
    "pricing",
    "competitor",
    "competitors",
    "growth",
    "hiring",
    "side hustle",
];

const WEB_LOOKUP_VOCABULARY: &[&str] = &[
    "search",
    "look up",
    "google",
    "news",
    "latest",
    "headlines",
    "weather",
    "find out",
    "what is the current",
];

/// Detect intent tags for a turn. Fixed check order: memory, finance,
/// business, web-lookup. `General` is never detected; it is the router's
/// fallback, not an intent.
pub fn detect_tags(text: &str) -> Vec<IntentTag> {
    let lower = text.to_lowercase();
    let tokens: HashSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let mut tags = Vec::new();
    if matches_vocabulary(&lower, &tokens, MEMORY_VOCABULARY) {
        tags.push(IntentTag::Memory);
    }
    if matches_vocabulary(&lower, &tokens, FINANCE_VOCABULARY) {
        tags.push(IntentTag::Finance);
    }
    if matches_vocabulary(&lower, &tokens, BUSINESS_VOCABULARY) {
        tags.push(IntentTag::Business);
    }
    if matches_vocabulary(&lower, &tokens, WEB_LOOKUP_VOCABULARY) {
        tags.push(IntentTag::WebLookup);
    }
    tags
}

fn matches_vocabulary(lower: &str, tokens: &HashSet<&str>, vocabulary: &[&str]) -> bool {
    vocabulary.iter().any(|entry| {
        if entry.contains(' ') {
            lower.contains(entry)
        } else {
            tokens.contains(entry)
        }
    })
}
