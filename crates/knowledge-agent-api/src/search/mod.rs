pub mod client;
pub mod models;
pub mod schema;

pub use client::AzureSearchClient;
pub use models::{DocumentChunk, IndexStats, ScoredChunk, SearchOptions, UpsertReport};

use anyhow::Result;
use async_trait::async_trait;

/// The externally managed vector index, safe for concurrent upsert and
/// query from one indexer and many chat requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent describe-or-create of the index schema.
    async fn ensure_index(&self) -> Result<()>;

    async fn upsert_chunks(&self, chunks: &[DocumentChunk]) -> Result<UpsertReport>;

    /// Delete every chunk belonging to a document. Returns the number of
    /// chunks removed; no-op when none exist.
    async fn delete_by_document_id(&self, document_id: &str) -> Result<usize>;

    async fn search_similar(
        &self,
        embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>>;

    async fn search_hybrid(
        &self,
        query: &str,
        embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>>;

    async fn get_stats(&self) -> Result<IndexStats>;
}
