use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::chat::ChatMessage;
use crate::services::provider::ChatModel;

const SUMMARY_PROMPT: &str = "You maintain a running summary of a legal research \
    conversation. Fold the new dialogue lines into the current summary. Keep every \
    legal question, cited authority, and conclusion; drop pleasantries. Reply with \
    the updated summary only.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Human,
    Assistant,
}

impl Role {
    fn speaker(&self) -> &'static str {
        match self {
            Role::Human => "Human",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryTurn {
    pub role: Role,
    pub content: String,
}

/// Bounded dialogue state for one session: a rolling window of the most
/// recent `window_k` turn pairs kept verbatim, plus a running summary of
/// everything older. Exactly one orchestration cycle mutates an instance
/// at a time (the session lock enforces this).
pub struct ConversationMemory {
    summarizer: Arc<dyn ChatModel>,
    window_k: usize,
    summary: String,
    window: VecDeque<MemoryTurn>,
}

impl ConversationMemory {
    pub fn new(summarizer: Arc<dyn ChatModel>, window_k: usize) -> Self {
        Self {
            summarizer,
            window_k: window_k.max(1),
            summary: String::new(),
            window: VecDeque::new(),
        }
    }

    /// Insert the fixed greeting as the first assistant message. Never
    /// triggers summarization, so session creation stays infallible.
    pub fn seed(&mut self, welcome: &str) {
        self.window.push_back(MemoryTurn {
            role: Role::Assistant,
            content: welcome.to_string(),
        });
    }

    /// Append one message in chronological order, folding the oldest
    /// excess messages into the summary once the raw window overflows.
    pub async fn append(&mut self, role: Role, content: String) -> Result<()> {
        self.window.push_back(MemoryTurn { role, content });
        self.condense_overflow().await
    }

    async fn condense_overflow(&mut self) -> Result<()> {
        let capacity = self.window_k * 2;
        if self.window.len() <= capacity {
            return Ok(());
        }

        let excess = self.window.len() - capacity;
        let folded: Vec<MemoryTurn> = self.window.drain(..excess).collect();
        debug!("Folding {} messages into conversation summary", folded.len());

        let dialogue = folded
            .iter()
            .map(|t| format!("{}: {}", t.role.speaker(), t.content))
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            ChatMessage::system(SUMMARY_PROMPT),
            ChatMessage::user(format!(
                "Current summary:\n{}\n\nNew dialogue:\n{}",
                self.summary, dialogue
            )),
        ];

        self.summary = self
            .summarizer
            .generate(&messages)
            .await
            .context("Memory summarization failed")?;

        Ok(())
    }

    /// Summary plus recent turns rendered as plain text, for classifier
    /// and retrieval prompts.
    pub fn as_context(&self) -> String {
        let mut context = String::new();

        if !self.summary.is_empty() {
            context.push_str("Conversation summary:\n");
            context.push_str(&self.summary);
            context.push_str("\n\n");
        }

        for turn in &self.window {
            context.push_str(turn.role.speaker());
            context.push_str(": ");
            context.push_str(&turn.content);
            context.push('\n');
        }

        context
    }

    /// Recent turns as role-tagged chat messages, for the generator.
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        self.window
            .iter()
            .map(|turn| match turn.role {
                Role::Human => ChatMessage::user(turn.content.clone()),
                Role::Assistant => ChatMessage::assistant(turn.content.clone()),
            })
            .collect()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn turns(&self) -> impl Iterator<Item = &MemoryTurn> {
        self.window.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Summarizer that fails the test if the model is ever invoked.
    struct NeverCalled;

    #[async_trait::async_trait]
    impl ChatModel for NeverCalled {
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
            anyhow::bail!("summarizer must not be called")
        }
    }

    /// Summarizer that always returns a fixed summary.
    struct FixedSummary(&'static str);

    #[async_trait::async_trait]
    impl ChatModel for FixedSummary {
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn append_below_capacity_never_summarizes() {
        let mut memory = ConversationMemory::new(Arc::new(NeverCalled), 3);
        memory.seed("welcome");
        memory
            .append(Role::Human, "question".to_string())
            .await
            .unwrap();
        memory
            .append(Role::Assistant, "answer".to_string())
            .await
            .unwrap();

        assert_eq!(memory.window_len(), 3);
        assert!(memory.summary().is_empty());
    }

    #[tokio::test]
    async fn overflow_folds_oldest_into_summary() {
        let mut memory = ConversationMemory::new(Arc::new(FixedSummary("condensed")), 1);
        memory.seed("welcome");
        memory.append(Role::Human, "q1".to_string()).await.unwrap();
        // Third message overflows the 2-message window; "welcome" is folded.
        memory.append(Role::Assistant, "a1".to_string()).await.unwrap();

        assert_eq!(memory.window_len(), 2);
        assert_eq!(memory.summary(), "condensed");

        let contents: Vec<&str> = memory.turns().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1"]);
    }

    #[tokio::test]
    async fn context_renders_summary_then_turns() {
        let mut memory = ConversationMemory::new(Arc::new(FixedSummary("old facts")), 1);
        memory.seed("hi");
        memory.append(Role::Human, "q1".to_string()).await.unwrap();
        memory.append(Role::Assistant, "a1".to_string()).await.unwrap();

        let context = memory.as_context();
        let summary_pos = context.find("old facts").unwrap();
        let turn_pos = context.find("Human: q1").unwrap();
        assert!(summary_pos < turn_pos);
        assert!(context.contains("Assistant: a1"));
    }

    #[tokio::test]
    async fn chat_messages_map_roles() {
        let mut memory = ConversationMemory::new(Arc::new(NeverCalled), 3);
        memory.seed("hello");
        memory.append(Role::Human, "question".to_string()).await.unwrap();

        let messages = memory.to_chat_messages();
        assert_eq!(messages[0].role, "assistant");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "question");
    }

    #[tokio::test]
    async fn summarizer_failure_propagates() {
        let mut memory = ConversationMemory::new(Arc::new(NeverCalled), 1);
        memory.seed("w");
        memory.append(Role::Human, "q".to_string()).await.unwrap();
        let result = memory.append(Role::Assistant, "a".to_string()).await;
        assert!(result.is_err());
    }
}
