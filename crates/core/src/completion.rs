//! Language-completion capability — consumed, never produced, by this core.
//!
//! The model that turns context into prose is an external collaborator. This
//! trait is the whole of what the core asks of it.

use async_trait::async_trait;

use crate::error::CompletionError;
use crate::memory::RecalledItem;
use crate::session::Turn;

/// An opaque text-completion capability.
#[async_trait]
pub trait Completion: Send + Sync {
    /// The capability name (e.g., "openai", "mock").
    fn name(&self) -> &str;

    /// Produce a response from a system instruction, the conversation turns,
    /// and the merged memory context.
    async fn complete(
        &self,
        system_instruction: &str,
        turns: &[Turn],
        memory_context: &[RecalledItem],
    ) -> std::result::Result<String, CompletionError>;
}
