pub mod bm25;
pub mod fusion;
pub mod multi_hop;
pub mod multi_query;
pub mod semantic;

pub use bm25::Bm25Retriever;
pub use multi_hop::MultiHopRetriever;
pub use multi_query::MultiQueryRetriever;
pub use semantic::SemanticRetriever;

/// Metadata carried by one evidence chunk. Both fields are optional;
/// display code substitutes placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentMetadata {
    pub source: Option<String>,
    pub page: Option<u32>,
}

/// One unit of retrieved evidence. Cloned fresh out of an index per
/// turn; never kept beyond the turn that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>, source: Option<String>, page: Option<u32>) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata { source, page },
        }
    }
}

/// Outcome of one strategy invocation.
#[derive(Debug)]
pub enum StrategyResult {
    /// No lookup performed; carries the fixed redirect message.
    NoRetrieval { message: String },
    Fused(FusedResult),
    MultiHop(MultiHopResult),
}

/// Fused multi-query outcome: one flat ranked list plus the sub-queries
/// that produced it.
#[derive(Debug)]
pub struct FusedResult {
    pub documents: Vec<RetrievedDocument>,
    pub sub_queries: Vec<String>,
}

/// Multi-hop outcome: per-hop document lists (hop order preserved), the
/// generated hop queries, and the synthesized narrative for the generator.
#[derive(Debug)]
pub struct MultiHopResult {
    pub hop_documents: Vec<Vec<RetrievedDocument>>,
    pub hop_queries: Vec<String>,
    pub context: String,
}
