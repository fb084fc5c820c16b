//! Text embedding behind the async [`Embedder`] seam.
//!
//! [`GeminiEmbedder`] calls the Gemini `batchEmbedContents` API and is what a
//! deployment indexes with. [`LexicalEmbedder`] needs no network and serves
//! offline runs and tests.
//!
//! source: https://ai.google.dev/gemini-api/docs/embeddings

use crate::generation::{API_KEY_ENV, GEMINI_API_BASE};
use crate::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";

pub const DEFAULT_GEMINI_DIMENSIONS: usize = 768;

pub const DEFAULT_LOCAL_DIMENSIONS: usize = 256;

/// Upper bound on requests per `batchEmbedContents` call.
const MAX_BATCH_REQUESTS: usize = 100;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// One vector per text, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Offline embedder over hashed lexical features.
///
/// Every whitespace word contributes itself plus its `^`/`$` padded
/// character trigrams. Features land in a bucket picked by a stable hash and
/// carry that hash's sign, which keeps colliding features from piling up.
/// Works on code points, so Sinhala and Latin text embed alike.
#[derive(Debug, Clone, Copy)]
pub struct LexicalEmbedder {
    dimensions: usize,
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_DIMENSIONS)
    }
}

impl LexicalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];

        for raw in text.split_whitespace() {
            let word = raw
                .trim_matches(|c: char| c.is_ascii_punctuation())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }

            self.accumulate(&mut vector, &word, WORD_WEIGHT);

            let padded = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect::<Vec<_>>();
            for window in padded.windows(3) {
                let gram = window.iter().collect::<String>();
                self.accumulate(&mut vector, &gram, TRIGRAM_WEIGHT);
            }
        }

        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = feature_hash(feature);
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// Stable across builds and platforms; vectors outlive the process in the index.
fn feature_hash(feature: &str) -> u64 {
    feature.chars().fold(0xcbf2_9ce4_8422_2325, |hash, c| {
        (hash ^ u64::from(u32::from(c))).wrapping_mul(0x0100_0000_01b3)
    })
}

fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

#[async_trait]
impl Embedder for LexicalEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vectorize(text))
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    task_type: TaskType,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

/// Multilingual embeddings from the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    api_key: String,
    model: String,
    dimensions: usize,
    base_url: String,
    client: Client,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        let model = model.into();
        Self {
            api_key: api_key.into(),
            model: format!("models/{}", model.trim_start_matches("models/")),
            dimensions,
            base_url: GEMINI_API_BASE.to_string(),
            client: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:batchEmbedContents", self.base_url, self.model)
    }

    fn request_body<'a>(&'a self, texts: &'a [String], task_type: TaskType) -> BatchEmbedRequest<'a> {
        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &self.model,
                    content: EmbedContent {
                        parts: vec![EmbedPart { text }],
                    },
                    task_type,
                    output_dimensionality: self.dimensions,
                })
                .collect(),
        }
    }

    async fn embed_all(
        &self,
        texts: &[String],
        task_type: TaskType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if self.api_key.is_empty() {
            return Err(EmbeddingError::MissingApiKey(API_KEY_ENV));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_REQUESTS) {
            let response = self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .json(&self.request_body(batch, task_type))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let details = response.text().await.unwrap_or_default();
                return Err(EmbeddingError::BackendResponse {
                    status: status.as_u16(),
                    details,
                });
            }

            let parsed: BatchEmbedResponse = response.json().await?;
            vectors.extend(checked_vectors(parsed, batch.len(), self.dimensions)?);
        }

        Ok(vectors)
    }
}

fn checked_vectors(
    response: BatchEmbedResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.embeddings.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: response.embeddings.len(),
        });
    }

    response
        .embeddings
        .into_iter()
        .map(|embedding| {
            if embedding.values.len() == dimensions {
                Ok(embedding.values)
            } else {
                Err(EmbeddingError::DimensionMismatch {
                    expected: dimensions,
                    actual: embedding.values.len(),
                })
            }
        })
        .collect()
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_all(texts, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_all(&[text.to_string()], TaskType::RetrievalQuery)
            .await?
            .pop()
            .ok_or(EmbeddingError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }
}
