use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::chat::ChatMessage;
use crate::retrieval::RetrievedDocument;
use crate::services::memory::ConversationMemory;
use crate::services::provider::ChatModel;

/// Evidence block cap, in characters of rendered context.
const MAX_EVIDENCE_CHARS: usize = 12_000;

/// Produces the final answer from memory, retrieved evidence, and the
/// optional multi-hop narrative. Must run after the human turn was
/// appended so the model sees it as the latest message.
pub struct ResponseGenerator {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
}

impl ResponseGenerator {
    pub fn new(model: Arc<dyn ChatModel>, system_prompt: String) -> Self {
        Self {
            model,
            system_prompt,
        }
    }

    /// Single synchronous call, no retries; a failure is fatal to the turn.
    pub async fn generate(
        &self,
        memory: &ConversationMemory,
        documents: &[RetrievedDocument],
        hop_context: &str,
    ) -> Result<String> {
        let mut system = self.system_prompt.clone();

        if !documents.is_empty() {
            system.push_str("\n\nEvidence:\n");
            for (i, doc) in documents.iter().enumerate() {
                let source = doc.metadata.source.as_deref().unwrap_or("Legal Document");
                let page = doc
                    .metadata
                    .page
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "—".to_string());
                system.push_str(&format!("[{} | page {}]\n{}\n\n", source, page, doc.content));

                if system.len() > MAX_EVIDENCE_CHARS {
                    debug!("Evidence truncated at {} of {} documents", i + 1, documents.len());
                    break;
                }
            }
        }

        if !hop_context.is_empty() {
            system.push_str("\n\nFindings from earlier research steps:\n");
            system.push_str(hop_context);
        }

        if !memory.summary().is_empty() {
            system.push_str("\n\nConversation summary:\n");
            system.push_str(memory.summary());
        }

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(memory.to_chat_messages());

        self.model
            .generate(&messages)
            .await
            .context("Response generation failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::DocumentMetadata;
    use crate::services::memory::Role;
    use crate::services::provider::MockChatModel;

    fn doc(content: &str, source: &str) -> RetrievedDocument {
        RetrievedDocument {
            content: content.to_string(),
            metadata: DocumentMetadata {
                source: Some(source.to_string()),
                page: Some(2),
            },
        }
    }

    #[tokio::test]
    async fn prompt_carries_evidence_history_and_hop_context() {
        let mut model = MockChatModel::new();
        model
            .expect_generate()
            .withf(|messages| {
                let system = &messages[0].content;
                system.contains("[contracts.md | page 2]")
                    && system.contains("hop narrative")
                    && messages.last().map(|m| m.content.as_str()) == Some("what is consideration?")
            })
            .returning(|_| Ok("An answer.".to_string()));

        let generator = ResponseGenerator::new(Arc::new(model), "Base prompt.".to_string());

        let mut memory = ConversationMemory::new(Arc::new(MockChatModel::new()), 3);
        memory.seed("welcome");
        memory
            .append(Role::Human, "what is consideration?".to_string())
            .await
            .unwrap();

        let answer = generator
            .generate(
                &memory,
                &[doc("Consideration is...", "contracts.md")],
                "hop narrative",
            )
            .await
            .unwrap();
        assert_eq!(answer, "An answer.");
    }

    #[tokio::test]
    async fn failure_is_fatal_not_retried() {
        let mut model = MockChatModel::new();
        model
            .expect_generate()
            .times(1)
            .returning(|_| anyhow::bail!("backend down"));

        let generator = ResponseGenerator::new(Arc::new(model), String::new());
        let memory = ConversationMemory::new(Arc::new(MockChatModel::new()), 3);

        assert!(generator.generate(&memory, &[], "").await.is_err());
    }
}
