use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::chat::ChatMessage;
use crate::services::memory::ConversationMemory;
use crate::services::provider::ChatModel;

use super::{fusion, Bm25Retriever, MultiHopResult, RetrievedDocument, SemanticRetriever};

const STOP_MARKER: &str = "DONE";

const HOP_PROMPT: &str = "You steer an iterative legal retrieval loop. Given the \
    research question and the evidence gathered so far, decide the next step. \
    Reply DONE if the evidence is sufficient to answer the question; otherwise \
    reply with the single best next search query. Reply with only the query or DONE.";

const SYNTHESIS_PROMPT: &str = "Summarize the retrieval hops below into a short \
    narrative of the findings, so a drafting model can answer the research \
    question from it. Mention which hop established which fact.";

/// Iterative multi-hop strategy. Like the multi-query retriever it keeps
/// per-call state (hop queries, per-hop documents), so `run` consumes
/// the instance.
pub struct MultiHopRetriever {
    model: Arc<dyn ChatModel>,
    sparse: Arc<Bm25Retriever>,
    dense: Arc<SemanticRetriever>,
    hop_top_k: usize,
    hop_queries: Vec<String>,
    hop_documents: Vec<Vec<RetrievedDocument>>,
}

impl MultiHopRetriever {
    pub fn new(
        model: Arc<dyn ChatModel>,
        sparse: Arc<Bm25Retriever>,
        dense: Arc<SemanticRetriever>,
        hop_top_k: usize,
    ) -> Self {
        Self {
            model,
            sparse,
            dense,
            hop_top_k,
            hop_queries: Vec::new(),
            hop_documents: Vec::new(),
        }
    }

    /// Hop 1 searches the user query directly; each later hop query is
    /// formulated from the findings so far. Terminates on the model's
    /// stop marker or at `max_hops`, whichever comes first.
    pub async fn run(
        mut self,
        query: &str,
        memory: &ConversationMemory,
        max_hops: usize,
    ) -> Result<MultiHopResult> {
        let mut next_query = query.to_string();

        for hop in 0..max_hops.max(1) {
            let documents = self.retrieve_hop(&next_query).await?;
            debug!("Hop {} retrieved {} documents", hop + 1, documents.len());
            self.hop_queries.push(next_query.clone());
            self.hop_documents.push(documents);

            if hop + 1 == max_hops.max(1) {
                break;
            }

            match self.plan_next_hop(query, memory).await? {
                Some(planned) => next_query = planned,
                None => break,
            }
        }

        let context = self.synthesize_context(query).await?;

        Ok(MultiHopResult {
            hop_documents: self.hop_documents,
            hop_queries: self.hop_queries,
            context,
        })
    }

    async fn retrieve_hop(&self, hop_query: &str) -> Result<Vec<RetrievedDocument>> {
        let sparse = Arc::clone(&self.sparse);
        let owned = hop_query.to_string();
        let top_k = self.hop_top_k;
        let sparse_hits = tokio::task::spawn_blocking(move || sparse.search(&owned, top_k))
            .await
            .context("Sparse search worker failed")?;

        let dense_hits = self.dense.search(hop_query, self.hop_top_k).await?;

        Ok(fusion::reciprocal_rank_fuse(
            vec![sparse_hits, dense_hits],
            self.hop_top_k,
        ))
    }

    /// Returns the next hop query, or None when the model signals that
    /// enough evidence has been gathered.
    async fn plan_next_hop(
        &self,
        question: &str,
        memory: &ConversationMemory,
    ) -> Result<Option<String>> {
        let messages = vec![
            ChatMessage::system(HOP_PROMPT),
            ChatMessage::user(format!(
                "Conversation so far:\n{}\nResearch question: {}\n\nEvidence so far:\n{}",
                memory.as_context(),
                question,
                self.evidence_digest()
            )),
        ];

        let reply = self
            .model
            .generate(&messages)
            .await
            .context("Hop planning failed")?;

        let first_line = reply.trim().lines().next().unwrap_or("").trim().to_string();
        if first_line.is_empty()
            || first_line.to_uppercase().starts_with(STOP_MARKER)
        {
            return Ok(None);
        }

        Ok(Some(first_line))
    }

    async fn synthesize_context(&self, question: &str) -> Result<String> {
        let messages = vec![
            ChatMessage::system(SYNTHESIS_PROMPT),
            ChatMessage::user(format!(
                "Research question: {}\n\n{}",
                question,
                self.evidence_digest()
            )),
        ];

        self.model
            .generate(&messages)
            .await
            .context("Hop synthesis failed")
    }

    fn evidence_digest(&self) -> String {
        let mut digest = String::new();

        for (i, (hop_query, documents)) in self
            .hop_queries
            .iter()
            .zip(&self.hop_documents)
            .enumerate()
        {
            digest.push_str(&format!("Hop {} query: {}\n", i + 1, hop_query));
            if documents.is_empty() {
                digest.push_str("- no documents found\n");
            }
            for doc in documents {
                let source = doc.metadata.source.as_deref().unwrap_or("Legal Document");
                let excerpt: String = doc.content.chars().take(160).collect();
                digest.push_str(&format!("- [{}] {}\n", source, excerpt.trim()));
            }
        }

        digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::EmbeddingProvider;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed reply sequence, one per model call.
    struct ScriptedModel {
        replies: Mutex<VecDeque<&'static str>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&'static str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().copied().collect()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for ScriptedModel {
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .map(str::to_string)
                .context("script exhausted")
        }
    }

    struct FlatEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for FlatEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn corpus() -> Vec<RetrievedDocument> {
        vec![
            RetrievedDocument::new(
                "Fraud claims must be brought within three years.",
                Some("limitations.md".into()),
                Some(1),
            ),
            RetrievedDocument::new(
                "The discovery rule tolls the limitation period.",
                Some("tolling.md".into()),
                Some(7),
            ),
        ]
    }

    async fn retrievers() -> (Arc<Bm25Retriever>, Arc<SemanticRetriever>) {
        let sparse = Arc::new(Bm25Retriever::build(corpus()));
        let dense = Arc::new(
            SemanticRetriever::build(Arc::new(FlatEmbedder), corpus())
                .await
                .unwrap(),
        );
        (sparse, dense)
    }

    fn test_memory() -> ConversationMemory {
        ConversationMemory::new(Arc::new(ScriptedModel::new(&[])), 3)
    }

    #[tokio::test]
    async fn stop_marker_ends_the_loop_early() {
        let (sparse, dense) = retrievers().await;
        // One plan call answering DONE, then the synthesis call.
        let model = Arc::new(ScriptedModel::new(&["DONE", "narrative"]));

        let result = MultiHopRetriever::new(model, sparse, dense, 3)
            .run("fraud limitation period", &test_memory(), 5)
            .await
            .unwrap();

        assert_eq!(result.hop_queries, vec!["fraud limitation period"]);
        assert_eq!(result.hop_documents.len(), 1);
        assert_eq!(result.context, "narrative");
    }

    #[tokio::test]
    async fn hop_ceiling_is_enforced() {
        let (sparse, dense) = retrievers().await;
        // The model never stops: two plan calls, then synthesis.
        let model = Arc::new(ScriptedModel::new(&[
            "tolling of the fraud deadline",
            "discovery rule details",
            "narrative",
        ]));

        let result = MultiHopRetriever::new(model, sparse, dense, 2)
            .run("fraud limitation period", &test_memory(), 3)
            .await
            .unwrap();

        assert_eq!(result.hop_queries.len(), 3);
        assert_eq!(result.hop_documents.len(), 3);
        assert_eq!(result.hop_queries[0], "fraud limitation period");
        assert_eq!(result.hop_queries[1], "tolling of the fraud deadline");
    }

    #[tokio::test]
    async fn per_hop_documents_stay_capped() {
        let (sparse, dense) = retrievers().await;
        let model = Arc::new(ScriptedModel::new(&["DONE", "n"]));

        let result = MultiHopRetriever::new(model, sparse, dense, 1)
            .run("fraud years limitation", &test_memory(), 5)
            .await
            .unwrap();

        assert!(result.hop_documents[0].len() <= 1);
    }
}
