use std::sync::Arc;
use std::time::Duration;

use futures::stream::Stream;
use tracing::{info, warn};

use crate::config::{RetrievalConfig, StreamingConfig};
use crate::models::chat::{PageRef, QueryStrategy, SourceInfo, StreamEvent};
use crate::retrieval::{
    Bm25Retriever, MultiHopRetriever, MultiQueryRetriever, RetrievedDocument,
    SemanticRetriever, StrategyResult,
};
use crate::services::classifier::ComplexityClassifier;
use crate::services::generator::ResponseGenerator;
use crate::services::memory::Role;
use crate::services::provider::ChatModel;
use crate::services::session_registry::SessionRegistry;

pub const REDIRECT_RESPONSE: &str = "I'm here to assist you with legal research \
    questions. Please ask me anything about statutes, case law, or legal procedures.";

/// Sources shown for a multi-hop turn, earliest hops first.
const MULTI_HOP_SOURCE_CAP: usize = 5;
const SNIPPET_CHARS: usize = 180;
const FALLBACK_SOURCE_TITLE: &str = "Legal Document";

/// Per-turn orchestrator: classify, dispatch to a retrieval strategy,
/// commit memory, generate, and stream the typed event sequence
/// `Strategy → Reasoning? → Token* → Sources → Done | Error`.
///
/// Shared and read-only across sessions; all per-turn state lives in the
/// stream it returns and in the session being served.
pub struct RagService {
    registry: Arc<SessionRegistry>,
    model: Arc<dyn ChatModel>,
    classifier: ComplexityClassifier,
    generator: ResponseGenerator,
    sparse: Arc<Bm25Retriever>,
    dense: Arc<SemanticRetriever>,
    retrieval: RetrievalConfig,
    streaming: StreamingConfig,
}

impl RagService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        model: Arc<dyn ChatModel>,
        sparse: Arc<Bm25Retriever>,
        dense: Arc<SemanticRetriever>,
        system_prompt: String,
        retrieval: RetrievalConfig,
        streaming: StreamingConfig,
    ) -> Self {
        Self {
            registry,
            classifier: ComplexityClassifier::new(model.clone()),
            generator: ResponseGenerator::new(model.clone(), system_prompt),
            model,
            sparse,
            dense,
            retrieval,
            streaming,
        }
    }

    /// One turn of the state machine. Strictly linear: one early exit
    /// (validation), one fork (strategy dispatch), no retries and no
    /// backtracking. Memory mutations that happened before a mid-stream
    /// failure are deliberately not rolled back.
    pub fn stream_response(
        self: Arc<Self>,
        session_id: String,
        query: String,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        async_stream::stream! {
            // ===== 1. Validate =====
            if query.trim().is_empty() {
                yield StreamEvent::Error { message: "Query cannot be empty".to_string() };
                return;
            }

            let Some(session) = self.registry.get(&session_id) else {
                yield StreamEvent::Error { message: "Session not found".to_string() };
                return;
            };

            // Holding the memory lock for the whole turn serializes
            // concurrent turns on the same session.
            let mut memory = session.memory.lock().await;

            // ===== 2. Classify =====
            let strategy = match self.classifier.classify(&query, &memory).await {
                Ok(strategy) => strategy,
                Err(e) => {
                    warn!("Classification failed for session {}: {:#}", session_id, e);
                    yield StreamEvent::Error { message: format!("{e:#}") };
                    return;
                }
            };
            info!("Session {} turn classified as {}", session_id, strategy.as_str());
            yield StreamEvent::Strategy { strategy };

            // ===== 3. Dispatch =====
            let outcome = match strategy {
                QueryStrategy::SimpleConversation => StrategyResult::NoRetrieval {
                    message: REDIRECT_RESPONSE.to_string(),
                },
                QueryStrategy::Complex => {
                    // Fresh instance per turn: the strategy accumulates
                    // per-call state and is consumed by run().
                    let retriever = MultiQueryRetriever::new(
                        self.model.clone(),
                        self.sparse.clone(),
                        self.dense.clone(),
                        self.retrieval.multi_query_top_k,
                    );
                    match retriever.run(&query, &memory).await {
                        Ok(fused) => StrategyResult::Fused(fused),
                        Err(e) => {
                            warn!("Multi-query retrieval failed: {:#}", e);
                            yield StreamEvent::Error { message: format!("{e:#}") };
                            return;
                        }
                    }
                }
                QueryStrategy::MultiHop => {
                    let retriever = MultiHopRetriever::new(
                        self.model.clone(),
                        self.sparse.clone(),
                        self.dense.clone(),
                        self.retrieval.hop_top_k,
                    );
                    match retriever
                        .run(&query, &memory, self.retrieval.multi_hop_max_hops)
                        .await
                    {
                        Ok(hops) => StrategyResult::MultiHop(hops),
                        Err(e) => {
                            warn!("Multi-hop retrieval failed: {:#}", e);
                            yield StreamEvent::Error { message: format!("{e:#}") };
                            return;
                        }
                    }
                }
            };

            let (documents, hop_context, sources, subqueries) = match outcome {
                // Fixed path: no retrieval, no generator call.
                StrategyResult::NoRetrieval { message } => {
                    if let Err(e) = memory.append(Role::Human, query.clone()).await {
                        yield StreamEvent::Error { message: format!("{e:#}") };
                        return;
                    }
                    if let Err(e) = memory.append(Role::Assistant, message.clone()).await {
                        yield StreamEvent::Error { message: format!("{e:#}") };
                        return;
                    }
                    session.complete_turn(&query);

                    for word in message.split_whitespace() {
                        yield StreamEvent::Token { content: format!("{word} ") };
                        self.pace().await;
                    }
                    yield StreamEvent::Sources { sources: Vec::new() };
                    yield StreamEvent::Done;
                    return;
                }
                StrategyResult::Fused(fused) => {
                    let sources = fused.documents.iter().map(source_info).collect();
                    (fused.documents, String::new(), sources, fused.sub_queries)
                }
                StrategyResult::MultiHop(hops) => {
                    let flattened: Vec<RetrievedDocument> =
                        hops.hop_documents.into_iter().flatten().collect();
                    let sources = flattened
                        .iter()
                        .take(MULTI_HOP_SOURCE_CAP)
                        .map(source_info)
                        .collect();
                    (Vec::new(), hops.context, sources, hops.hop_queries)
                }
            };

            if !subqueries.is_empty() {
                yield StreamEvent::Reasoning { subqueries };
            }

            // A session deleted while retrieval ran fails here, before
            // any memory is committed.
            if !self.registry.contains(&session_id) {
                yield StreamEvent::Error {
                    message: "Session was deleted mid-turn".to_string(),
                };
                return;
            }

            // ===== 4. Commit human turn =====
            if let Err(e) = memory.append(Role::Human, query.clone()).await {
                yield StreamEvent::Error { message: format!("{e:#}") };
                return;
            }

            // ===== 5. Generate =====
            let answer = match self
                .generator
                .generate(&memory, &documents, &hop_context)
                .await
            {
                Ok(answer) => answer,
                Err(e) => {
                    // The human turn stays committed: at-most-partial-commit.
                    warn!("Generation failed for session {}: {:#}", session_id, e);
                    yield StreamEvent::Error { message: format!("{e:#}") };
                    return;
                }
            };

            // ===== 6. Commit AI turn =====
            if let Err(e) = memory.append(Role::Assistant, answer.clone()).await {
                yield StreamEvent::Error { message: format!("{e:#}") };
                return;
            }
            session.complete_turn(&query);

            // ===== 7. Stream tokens =====
            for word in answer.split_whitespace() {
                yield StreamEvent::Token { content: format!("{word} ") };
                self.pace().await;
            }

            // ===== 8 & 9. Sources, then done =====
            yield StreamEvent::Sources { sources };
            yield StreamEvent::Done;
        }
    }

    /// Artificial per-token pacing; 0 disables the sleep so tests never
    /// depend on wall-clock time.
    async fn pace(&self) {
        if self.streaming.token_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.streaming.token_delay_ms)).await;
        }
    }
}

fn source_info(doc: &RetrievedDocument) -> SourceInfo {
    SourceInfo {
        title: doc
            .metadata
            .source
            .clone()
            .unwrap_or_else(|| FALLBACK_SOURCE_TITLE.to_string()),
        page: doc
            .metadata
            .page
            .map(PageRef::Number)
            .unwrap_or_else(PageRef::placeholder),
        snippet: doc
            .content
            .chars()
            .take(SNIPPET_CHARS)
            .collect::<String>()
            .trim()
            .to_string(),
    }
}
