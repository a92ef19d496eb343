use anyhow::Result;

use crate::models::chat::ChatMessage;

/// Seam for the chat-completion model. Every consumer (classifier,
/// retrieval strategies, generator, memory summarizer) goes through this
/// trait so it can be swapped for a scripted fake in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Seam for the embedding model.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
