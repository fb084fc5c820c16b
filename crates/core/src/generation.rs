//! Answer generation through the Gemini `generateContent` API.
//!
//! source: https://ai.google.dev/api/generate-content

use crate::traits::Generator;
use crate::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub(crate) const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-pro";

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            client: Client::new(),
        }
    }

    /// Points the client at a different API root, e.g. a local proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

fn response_text(response: GenerateResponse) -> Result<String, GenerationError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(GenerationError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if self.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey(API_KEY_ENV));
        }

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(GenerationError::BackendResponse {
                status: status.as_u16(),
                details,
            });
        }

        response_text(response.json().await?)
    }
}
