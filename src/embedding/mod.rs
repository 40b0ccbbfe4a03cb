mod batch;
mod client;
/// Embedding & indexing
///
/// Architecture:
/// - EmbeddingProvider trait for one provider request (HTTP implementation)
/// - EmbeddingClient for retries, batch splitting, query cache and hedging
/// - Search-document builder for weighted passage text
/// - VectorStore trait with a local HNSW store and a Qdrant client
/// - BatchProcessor for concurrent index runs
mod document;
mod provider;
mod qdrant;
mod vector_index;

pub use batch::{prepare_documents, BatchProcessor, IndexReport, PreparedDocument};
pub use client::{ClientSettings, EmbeddingClient, RetryPolicy};
pub use document::{build_search_text, TAG_REPETITIONS};
pub use provider::{
    EmbeddingError, EmbeddingMode, EmbeddingProvider, HttpEmbeddingProvider, HttpProviderSettings,
};
pub use qdrant::{QdrantSettings, QdrantVectorStore};
pub use vector_index::{
    HnswSettings, HnswVectorStore, VectorIndexError, VectorMatch, VectorPoint, VectorStore,
};
