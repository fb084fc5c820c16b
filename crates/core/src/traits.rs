use crate::{ChunkRecord, CollectionState, GenerationError, RetrievedChunk, SearchError};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex {
    async fn collection_state(&self) -> Result<CollectionState, SearchError>;

    /// Drops any existing collection and rebuilds it from `records`.
    async fn replace_collection(
        &self,
        records: &[ChunkRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError>;

    /// Appends one record to an existing collection.
    async fn add_record(
        &self,
        record: &ChunkRecord,
        embedding: &[f32],
    ) -> Result<(), SearchError>;

    /// Nearest records first. An absent collection yields no hits.
    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError>;
}

#[async_trait]
pub trait Generator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
