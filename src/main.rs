use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use lexrag_server::config::Settings;
use lexrag_server::document;
use lexrag_server::handlers::build_router;
use lexrag_server::retrieval::{Bm25Retriever, SemanticRetriever};
use lexrag_server::services::{
    ChatModel, EmbeddingProvider, EmbeddingService, LlmService, RagService, SessionRegistry,
};
use lexrag_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,lexrag_server=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting LexRAG server...");

    let settings = Settings::load()?;
    info!("Configuration loaded");

    // Shared model collaborators (read-only across sessions)
    let model: Arc<dyn ChatModel> = Arc::new(LlmService::new(settings.llm.clone()));
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(EmbeddingService::new(settings.embedding.clone()));

    info!("Loading and chunking documents...");
    let corpus = document::load_corpus(&settings.documents)?;

    info!("Building BM25 index...");
    let sparse = Arc::new(Bm25Retriever::build(corpus.clone()));

    info!("Building semantic index...");
    let dense = Arc::new(SemanticRetriever::build(embedder, corpus).await?);

    let registry = Arc::new(SessionRegistry::new(
        model.clone(),
        settings.memory.window_k,
    ));

    let rag_service = Arc::new(RagService::new(
        registry.clone(),
        model,
        sparse,
        dense,
        settings.prompts.system_prompt.clone(),
        settings.retrieval.clone(),
        settings.streaming.clone(),
    ));

    let app = build_router(
        AppState {
            registry,
            rag_service,
        },
        &settings.server,
    )?;

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
