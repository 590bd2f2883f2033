//! Semantic memory index backends for Waymark.

use std::sync::Arc;

use waymark_config::IndexSection;
use waymark_core::SemanticIndex;

pub mod cache;
pub mod in_memory;
pub mod rest;

pub use cache::CorpusCache;
pub use in_memory::InMemoryIndex;
pub use rest::RestSemanticIndex;

/// Build a semantic index from configuration: REST when a base URL is
/// configured (with the section's chunking and relevance floor), in-memory
/// otherwise.
pub fn build_from_config(section: &IndexSection) -> Arc<dyn SemanticIndex> {
    match section.base_url.as_deref() {
        Some(url) => Arc::new(
            RestSemanticIndex::new(url, section.api_key.clone())
                .with_chunking(section.chunk_size, section.chunk_overlap)
                .with_similarity_floor(section.similarity_floor),
        ),
        None => Arc::new(InMemoryIndex::new()),
    }
}
