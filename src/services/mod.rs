pub mod classifier;
pub mod embedding_service;
pub mod generator;
pub mod llm_service;
pub mod memory;
pub mod provider;
pub mod rag_service;
pub mod session_registry;

pub use classifier::ComplexityClassifier;
pub use embedding_service::EmbeddingService;
pub use generator::ResponseGenerator;
pub use llm_service::LlmService;
pub use memory::{ConversationMemory, MemoryTurn, Role};
pub use provider::{ChatModel, EmbeddingProvider};
pub use rag_service::RagService;
pub use session_registry::{Session, SessionRegistry};
