use crate::domain::{errors::DomainError, DocumentChunk, Embedding, SearchResult};
use async_trait::async_trait;

/// Per-collection vector index. Collections never share points.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn get_or_create(&self, collection: &str) -> Result<(), DomainError>;

    async fn upsert_batch(
        &self,
        collection: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError>;

    /// Swaps the collection's contents for `points` in one step. Readers see
    /// either the old or the new contents; on error the old ones stay.
    async fn replace(
        &self,
        collection: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError>;

    /// Nearest chunks ascending by distance. A missing collection yields an
    /// empty result.
    async fn query(
        &self,
        collection: &str,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError>;

    async fn delete_collection(&self, collection: &str) -> Result<(), DomainError>;

    async fn health_check(&self) -> Result<(), DomainError>;

    fn dimension(&self) -> usize;
}
