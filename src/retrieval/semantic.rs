use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::services::provider::EmbeddingProvider;
use crate::utils::cosine_similarity;

use super::RetrievedDocument;

/// Dense retriever: the corpus is embedded once at startup, queries are
/// embedded per call and matched by cosine similarity. The scoring pass
/// runs on a blocking worker thread.
pub struct SemanticRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<Vec<(Vec<f32>, RetrievedDocument)>>,
}

impl SemanticRetriever {
    pub async fn build(
        embedder: Arc<dyn EmbeddingProvider>,
        docs: Vec<RetrievedDocument>,
    ) -> Result<Self> {
        let mut index = Vec::with_capacity(docs.len());

        for doc in docs {
            let vector = embedder
                .embed(&doc.content)
                .await
                .context("Failed to embed corpus chunk")?;
            index.push((vector, doc));
        }

        info!("Semantic index built over {} chunks", index.len());
        Ok(Self {
            embedder,
            index: Arc::new(index),
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>> {
        if self.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let index = Arc::clone(&self.index);
        tokio::task::spawn_blocking(move || {
            let mut scored: Vec<(f32, usize)> = Vec::with_capacity(index.len());
            for (i, (vector, _)) in index.iter().enumerate() {
                scored.push((cosine_similarity(&query_vector, vector)?, i));
            }

            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

            Ok(scored
                .into_iter()
                .take(top_k)
                .map(|(_, i)| index[i].1.clone())
                .collect())
        })
        .await
        .context("Dense search worker failed")?
    }
}
