use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::chat::ChatMessage;
use crate::services::memory::ConversationMemory;
use crate::services::provider::ChatModel;

use super::{fusion, Bm25Retriever, FusedResult, RetrievedDocument, SemanticRetriever};

const MAX_PARAPHRASES: usize = 3;

const SUBQUERY_PROMPT: &str = "You expand a legal research query for retrieval. \
    Rewrite the query as up to 3 alternative phrasings that could match relevant \
    statutes or case law. One phrasing per line, no numbering, no commentary.";

/// Fused multi-query strategy. Accumulates per-call state (sub-queries,
/// ranked lists), so `run` consumes the instance: one object serves
/// exactly one turn and cannot be reused.
pub struct MultiQueryRetriever {
    model: Arc<dyn ChatModel>,
    sparse: Arc<Bm25Retriever>,
    dense: Arc<SemanticRetriever>,
    top_k: usize,
    sub_queries: Vec<String>,
    ranked_lists: Vec<Vec<RetrievedDocument>>,
}

impl MultiQueryRetriever {
    pub fn new(
        model: Arc<dyn ChatModel>,
        sparse: Arc<Bm25Retriever>,
        dense: Arc<SemanticRetriever>,
        top_k: usize,
    ) -> Self {
        Self {
            model,
            sparse,
            dense,
            top_k,
            sub_queries: Vec::new(),
            ranked_lists: Vec::new(),
        }
    }

    pub async fn run(
        mut self,
        query: &str,
        memory: &ConversationMemory,
    ) -> Result<FusedResult> {
        self.sub_queries.push(query.to_string());

        let paraphrases = self.generate_paraphrases(query, memory).await?;
        for paraphrase in paraphrases.into_iter().take(MAX_PARAPHRASES) {
            if paraphrase != query {
                self.sub_queries.push(paraphrase);
            }
        }
        debug!("Expanded query into {} sub-queries", self.sub_queries.len());

        for sub_query in &self.sub_queries {
            let sparse = Arc::clone(&self.sparse);
            let owned = sub_query.clone();
            let top_k = self.top_k;
            let sparse_hits =
                tokio::task::spawn_blocking(move || sparse.search(&owned, top_k))
                    .await
                    .context("Sparse search worker failed")?;

            let dense_hits = self.dense.search(sub_query, self.top_k).await?;

            self.ranked_lists.push(sparse_hits);
            self.ranked_lists.push(dense_hits);
        }

        let documents = fusion::reciprocal_rank_fuse(self.ranked_lists, self.top_k);

        Ok(FusedResult {
            documents,
            sub_queries: self.sub_queries,
        })
    }

    async fn generate_paraphrases(
        &self,
        query: &str,
        memory: &ConversationMemory,
    ) -> Result<Vec<String>> {
        let messages = vec![
            ChatMessage::system(SUBQUERY_PROMPT),
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
            .context("Sub-query generation failed")?;

        Ok(reply.lines().filter_map(clean_line).collect())
    }
}

/// Strips list markers the model tends to prepend ("1.", "-", "2)").
fn clean_line(line: &str) -> Option<String> {
    let cleaned = line
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*'))
        .trim();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
