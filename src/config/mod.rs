pub mod settings;

pub use settings::{
    DocumentsConfig, EmbeddingConfig, LlmConfig, MemoryConfig, PromptsConfig,
    RetrievalConfig, ServerConfig, Settings, StreamingConfig,
};
