use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::chat::{ChatMessage, QueryStrategy};
use crate::services::memory::ConversationMemory;
use crate::services::provider::ChatModel;

const CLASSIFIER_PROMPT: &str = "You route queries for a legal research assistant. \
    Reply with exactly one label:\n\
    simple_conversation - greetings, small talk, or anything outside legal research\n\
    complex - a substantive legal question answerable with one round of document retrieval\n\
    multi_hop - a question that requires chaining evidence across several retrieval steps\n\
    Reply with the label only.";

/// Maps (query, memory) to one of the three strategy labels with a
/// single model inference. Shared across sessions; no per-call state.
pub struct ComplexityClassifier {
    model: Arc<dyn ChatModel>,
}

impl ComplexityClassifier {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// No retries here: a model failure fails the turn.
    pub async fn classify(
        &self,
        query: &str,
        memory: &ConversationMemory,
    ) -> Result<QueryStrategy> {
        let messages = vec![
            ChatMessage::system(CLASSIFIER_PROMPT),
            ChatMessage::user(format!(
                "Conversation so far:\n{}\nQuery: {}",
                memory.as_context(),
                query
            )),
        ];

        let reply = self
            .model
            .generate(&messages)
            .await
            .context("Complexity classification failed")?;

        let strategy = parse_label(&reply);
        debug!("Classified query as {} ({:?})", strategy.as_str(), reply);
        Ok(strategy)
    }
}

/// Tolerant label scan. Anything unrecognized falls back to `complex`,
/// the retrieval-backed path.
fn parse_label(reply: &str) -> QueryStrategy {
    let normalized = reply.trim().to_lowercase();

    if normalized.contains("simple_conversation") || normalized.contains("simple conversation") {
        QueryStrategy::SimpleConversation
    } else if normalized.contains("multi_hop")
        || normalized.contains("multi-hop")
        || normalized.contains("multi hop")
    {
        QueryStrategy::MultiHop
    } else {
        QueryStrategy::Complex
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::MockChatModel;

    #[test]
    fn parses_exact_labels() {
        assert_eq!(
            parse_label("simple_conversation"),
            QueryStrategy::SimpleConversation
        );
        assert_eq!(parse_label("complex"), QueryStrategy::Complex);
        assert_eq!(parse_label("multi_hop"), QueryStrategy::MultiHop);
    }

    #[test]
    fn parses_noisy_replies() {
        assert_eq!(
            parse_label("Label: multi-hop, because the question chains."),
            QueryStrategy::MultiHop
        );
        assert_eq!(
            parse_label("  SIMPLE_CONVERSATION\n"),
            QueryStrategy::SimpleConversation
        );
    }

    #[test]
    fn unknown_reply_defaults_to_complex() {
        assert_eq!(parse_label("no idea"), QueryStrategy::Complex);
        assert_eq!(parse_label(""), QueryStrategy::Complex);
    }

    #[tokio::test]
    async fn classify_feeds_query_and_memory_to_model() {
        let mut model = MockChatModel::new();
        model
            .expect_generate()
            .withf(|messages| {
                messages.len() == 2 && messages[1].content.contains("Query: hello")
            })
            .returning(|_| Ok("simple_conversation".to_string()));

        let classifier = ComplexityClassifier::new(Arc::new(model));
        let memory = ConversationMemory::new(
            Arc::new(MockChatModel::new()),
            3,
        );

        let strategy = classifier.classify("hello", &memory).await.unwrap();
        assert_eq!(strategy, QueryStrategy::SimpleConversation);
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let mut model = MockChatModel::new();
        model
            .expect_generate()
            .returning(|_| anyhow::bail!("model unavailable"));

        let classifier = ComplexityClassifier::new(Arc::new(model));
        let memory = ConversationMemory::new(Arc::new(MockChatModel::new()), 3);

        assert!(classifier.classify("anything", &memory).await.is_err());
    }
}
