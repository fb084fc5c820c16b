use crate::traits::VectorIndex;
use crate::{ChunkMetadata, ChunkRecord, CollectionState, RetrievedChunk, SearchError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};

const BACKEND: &str = "qdrant";
const UPSERT_BATCH_SIZE: usize = 100;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), SearchError> {
        if vector.len() != self.vector_size {
            return Err(SearchError::Request(format!(
                "embedding dimension {} != {}",
                vector.len(),
                self.vector_size
            )));
        }
        Ok(())
    }

    async fn point_count(&self) -> Result<u64, SearchError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        let parsed: Value = expect_success(response).await?.json().await?;

        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "count response had no result.count".to_string(),
            })
    }

    async fn upsert_points(&self, points: Vec<Value>) -> Result<(), SearchError> {
        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    fn point(&self, id: u64, record: &ChunkRecord, embedding: &[f32]) -> Result<Value, SearchError> {
        self.check_dimension(embedding)?;
        Ok(json!({
            "id": id,
            "vector": embedding,
            "payload": {
                "text": record.text,
                "source": record.source,
                "chunk_id": record.chunk_id,
                "document_type": record.document_type.label(),
            },
        }))
    }
}

async fn expect_success(response: Response) -> Result<Response, SearchError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{status}: {body}"),
    })
}

fn parse_hits(parsed: &Value) -> Vec<RetrievedChunk> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.iter()
        .map(|hit| {
            let text = hit
                .pointer("/payload/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let source = hit
                .pointer("/payload/source")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let chunk_id = hit
                .pointer("/payload/chunk_id")
                .and_then(Value::as_u64)
                .unwrap_or_default();
            let document_type = hit
                .pointer("/payload/document_type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);

            RetrievedChunk {
                text,
                metadata: ChunkMetadata {
                    source,
                    chunk_id,
                    document_type,
                },
                distance: 1.0 - score,
            }
        })
        .collect()
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn collection_state(&self) -> Result<CollectionState, SearchError> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(CollectionState::Absent);
        }
        expect_success(response).await?;

        Ok(match self.point_count().await? {
            0 => CollectionState::Empty,
            count => CollectionState::Populated(count),
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

        let response = self.client.delete(self.collection_url()).send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            expect_success(response).await?;
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" },
            }))
            .send()
            .await?;
        expect_success(response).await?;
        info!(collection = %self.collection, "created collection");

        let points = records
            .iter()
            .zip(embeddings.iter())
            .enumerate()
            .map(|(id, (record, embedding))| self.point(id as u64, record, embedding))
            .collect::<Result<Vec<_>, SearchError>>()?;

        let total_batches = points.len().div_ceil(UPSERT_BATCH_SIZE);
        for (batch_no, batch) in points.chunks(UPSERT_BATCH_SIZE).enumerate() {
            self.upsert_points(batch.to_vec()).await?;
            info!(batch = batch_no + 1, total_batches, "added batch");
        }

        info!(
            collection = %self.collection,
            records = records.len(),
            "collection rebuilt"
        );
        Ok(())
    }

    async fn add_record(
        &self,
        record: &ChunkRecord,
        embedding: &[f32],
    ) -> Result<(), SearchError> {
        let id = match self.collection_state().await? {
            CollectionState::Absent => return Err(SearchError::NotReady(self.collection.clone())),
            state => state.count(),
        };

        self.upsert_points(vec![self.point(id, record, embedding)?])
            .await?;
        info!(id, source = %record.source, "added record");
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        self.check_dimension(query_vector)?;

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(collection = %self.collection, "collection not initialized");
            return Ok(Vec::new());
        }

        let parsed: Value = expect_success(response).await?.json().await?;
        Ok(parse_hits(&parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentType;

    #[test]
    fn hits_convert_scores_to_distances() {
        let parsed = json!({
            "result": [
                {
                    "id": 4,
                    "score": 0.75,
                    "payload": {
                        "text": "තොග වටිනාකම",
                        "source": "LKAS_2.pdf",
                        "chunk_id": 9,
                        "document_type": "ගිණුම්කරණ ප්‍රමිතිය",
                    },
                },
                { "id": 5, "score": 0.5 },
            ],
        });

        let hits = parse_hits(&parsed);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.chunk_id, 9);
        assert_eq!(hits[0].metadata.source, "LKAS_2.pdf");
        assert!((hits[0].distance - 0.25).abs() < f64::EPSILON);
        assert_eq!(hits[1].metadata.source, "unknown");
        assert!(hits[1].text.is_empty());
    }

    #[test]
    fn point_payload_uses_native_label() -> Result<(), SearchError> {
        let store = QdrantStore::new("http://localhost:6333/", "docs", 2);
        assert_eq!(store.collection_url(), "http://localhost:6333/collections/docs");

        let record = ChunkRecord {
            text: "body".to_string(),
            source: "SLFRS_9.pdf".to_string(),
            chunk_id: 2,
            document_type: DocumentType::FinancialReportingStandard,
        };

        let point = store.point(7, &record, &[0.5, 0.5])?;
        assert_eq!(point["id"], 7);
        assert_eq!(point["payload"]["chunk_id"], 2);
        assert_eq!(point["payload"]["document_type"], "මූල්‍ය වාර්තාකරණ ප්‍රමිතිය");

        assert!(store.point(7, &record, &[0.5]).is_err());
        Ok(())
    }
}
