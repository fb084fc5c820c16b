use crate::traits::VectorIndex;
use crate::{ChunkRecord, CollectionState, RetrievedChunk, SearchError};
use async_trait::async_trait;
use tokio::sync::RwLock;

struct StoredRecord {
    record: ChunkRecord,
    vector: Vec<f32>,
}

/// Brute-force cosine index kept in process memory. `None` means the
/// collection has not been created yet.
#[derive(Default)]
pub struct InMemoryIndex {
    records: RwLock<Option<Vec<StoredRecord>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn collection_state(&self) -> Result<CollectionState, SearchError> {
        Ok(match self.records.read().await.as_ref() {
            None => CollectionState::Absent,
            Some(records) if records.is_empty() => CollectionState::Empty,
            Some(records) => CollectionState::Populated(records.len() as u64),
        })
    }

    async fn replace_collection(
        &self,
        records: &[ChunkRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        if records.len() != embeddings.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match record count {}",
                embeddings.len(),
                records.len()
            )));
        }

        let stored = records
            .iter()
            .zip(embeddings.iter())
            .map(|(record, vector)| StoredRecord {
                record: record.clone(),
                vector: vector.clone(),
            })
            .collect();

        *self.records.write().await = Some(stored);
        Ok(())
    }

    async fn add_record(
        &self,
        record: &ChunkRecord,
        embedding: &[f32],
    ) -> Result<(), SearchError> {
        let mut guard = self.records.write().await;
        let records = guard
            .as_mut()
            .ok_or_else(|| SearchError::NotReady("in-memory collection".to_string()))?;
        records.push(StoredRecord {
            record: record.clone(),
            vector: embedding.to_vec(),
        });
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let guard = self.records.read().await;
        let Some(records) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let mut hits = records
            .iter()
            .map(|stored| RetrievedChunk {
                text: stored.record.text.clone(),
                metadata: stored.record.metadata(),
                distance: 1.0 - f64::from(cosine_similarity(query_vector, &stored.vector)),
            })
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentType;

    fn record(text: &str, chunk_id: u64) -> ChunkRecord {
        ChunkRecord {
            text: text.to_string(),
            source: "LKAS_2.pdf".to_string(),
            chunk_id,
            document_type: DocumentType::AccountingStandard,
        }
    }

    #[tokio::test]
    async fn state_moves_from_absent_to_populated() -> Result<(), SearchError> {
        let index = InMemoryIndex::new();
        assert_eq!(index.collection_state().await?, CollectionState::Absent);

        index.replace_collection(&[], &[]).await?;
        assert_eq!(index.collection_state().await?, CollectionState::Empty);

        index
            .replace_collection(&[record("a", 0)], &[vec![1.0, 0.0]])
            .await?;
        assert_eq!(index.collection_state().await?, CollectionState::Populated(1));
        Ok(())
    }

    #[tokio::test]
    async fn search_orders_by_distance() -> Result<(), SearchError> {
        let index = InMemoryIndex::new();
        assert!(index.search(&[1.0, 0.0], 3).await?.is_empty());

        index
            .replace_collection(
                &[record("far", 0), record("near", 1)],
                &[vec![0.0, 1.0], vec![1.0, 0.1]],
            )
            .await?;

        let hits = index.search(&[1.0, 0.0], 1).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "near");
        assert_eq!(hits[0].metadata.chunk_id, 1);
        Ok(())
    }

    #[tokio::test]
    async fn add_record_requires_collection() -> Result<(), SearchError> {
        let index = InMemoryIndex::new();
        let result = index.add_record(&record("x", 0), &[1.0]).await;
        assert!(matches!(result, Err(SearchError::NotReady(_))));

        index.replace_collection(&[], &[]).await?;
        index.add_record(&record("x", 0), &[1.0]).await?;
        assert_eq!(index.collection_state().await?, CollectionState::Populated(1));
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_embeddings_are_rejected() {
        let index = InMemoryIndex::new();
        let result = index.replace_collection(&[record("x", 0)], &[]).await;
        assert!(result.is_err());
    }
}
