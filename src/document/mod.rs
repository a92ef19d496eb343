pub mod chunker;
pub mod loader;

pub use chunker::TextChunker;
pub use loader::load_corpus;
